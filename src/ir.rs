// The IR produced by the lowerer and consumed by the VM: a flat,
// structured-control-flow instruction stream per function plus a module-
// level list of global variables.
//
// `IrType` only distinguishes the two VM-native numeric representations;
// `bool`/`char` collapse to `I` here (spec.md 4.7), the byte-oriented
// opcode family (`PRINTB`/`PEEKB`/`POKEB`) is selected at lowering time
// from the *source* `Type` rather than from a third IR type.

use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IrType {
    I,
    F,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    // Integer family
    ConstI(i64),
    AddI,
    SubI,
    MulI,
    DivI,
    AndI,
    OrI,
    LtI,
    LeI,
    GtI,
    GeI,
    EqI,
    NeI,
    NotI,
    PrintI,
    PeekI,
    PokeI,
    ItoF,

    // Float family
    ConstF(u64), // bits of an f64; avoids deriving Eq over a raw f64
    AddF,
    SubF,
    MulF,
    DivF,
    LtF,
    LeF,
    GtF,
    GeF,
    EqF,
    NeF,
    PrintF,
    PeekF,
    PokeF,
    FtoI,

    // Byte family
    PrintB,
    PeekB,
    PokeB,

    // Variables
    LocalGet(String),
    LocalSet(String),
    GlobalGet(String),
    GlobalSet(String),

    // Functions
    Call(String),
    Ret,

    // Structured control flow
    If,
    Else,
    EndIf,
    Loop,
    CBreak,
    Continue,
    EndLoop,

    // Memory
    Grow,
}

impl Instr {
    pub fn const_f(x: f64) -> Instr {
        Instr::ConstF(x.to_bits())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub param_names: Vec<String>,
    pub param_types: Vec<IrType>,
    pub return_type: Option<IrType>,
    pub locals: Vec<(String, IrType)>,
    pub code: Vec<Instr>,
    /// `true` for `import func` declarations: signature only, no body.
    pub imported: bool,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Module {
    pub globals: Vec<(String, IrType)>,
    pub functions: Vec<IrFunction>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn find_function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, ty) in &self.globals {
            writeln!(f, "GLOBAL::: {}: {:?}", name, ty)?;
        }
        for func in &self.functions {
            writeln!(
                f,
                "FUNCTION::: {}, {:?}, {:?} {:?}",
                func.name, func.param_names, func.param_types, func.return_type
            )?;
            for (name, ty) in &func.locals {
                writeln!(f, "  local {}: {:?}", name, ty)?;
            }
            if func.imported {
                writeln!(f, "  <imported, no body>")?;
            } else {
                for instr in &func.code {
                    writeln!(f, "  {:?}", instr)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_globals_and_functions() {
        let module = Module {
            globals: vec![("x".into(), IrType::I)],
            functions: vec![IrFunction {
                name: "main".into(),
                param_names: vec![],
                param_types: vec![],
                return_type: Some(IrType::I),
                locals: vec![],
                code: vec![Instr::ConstI(0), Instr::Ret],
                imported: false,
            }],
        };
        let text = module.to_string();
        assert!(text.contains("GLOBAL::: x: I"));
        assert!(text.contains("FUNCTION::: main"));
        assert!(text.contains("ConstI(0)"));
    }
}
