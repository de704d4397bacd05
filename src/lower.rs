// Lowers a checked AST into an `ir::Module`. Assumes the AST already
// passed the checker cleanly: every `Expr` carries a resolved `ty`, and
// every `TypeCast` the checker spliced in is present. A non-empty
// `Diagnostics` after checking must suppress this stage entirely (spec.md
// 4.6/7); `lower` itself has no way to recover from an unannotated node
// and treats one as a lowering error instead of panicking.
//
// Top-level statements become the body of a synthesized `main` function
// in source order (spec.md 9 item 5: initializer order is never
// reordered). Each source function lowers to its own `IrFunction`; each
// function keeps one flat, name-keyed locals list covering its
// parameters and every `VarDecl` anywhere in its body, including nested
// `if`/`while` blocks -- the same flat per-function namespace the
// original `ircode.py` builds its locals dict from, so a name must be
// unique within a whole function even across nested blocks.

use std::collections::HashSet;
use std::fmt;

use crate::ast::*;
use crate::ir::{Instr, IrFunction, IrType, Module};
use crate::types::{BinOp, Type, UnOp};

#[derive(Clone, Debug, PartialEq)]
pub struct LowerError {
    pub message: String,
    pub line: Option<u32>,
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: lowering error: {}", line, self.message),
            None => write!(f, "lowering error: {}", self.message),
        }
    }
}

impl std::error::Error for LowerError {}

fn err(message: impl Into<String>, line: u32) -> LowerError {
    LowerError { message: message.into(), line: Some(line) }
}

fn gox_to_ir(ty: Type) -> IrType {
    match ty {
        Type::Float => IrType::F,
        Type::Int | Type::Char | Type::Bool => IrType::I,
    }
}

fn resolved_decl_type(decl: &VarDecl) -> Type {
    decl.declared_type
        .or_else(|| decl.initializer.as_ref().and_then(|e| e.ty))
        .unwrap_or(Type::Int)
}

fn collect_global_names(program: &Program) -> Vec<(String, IrType)> {
    program
        .stmts
        .iter()
        .filter_map(|s| match s {
            Stmt::VarDecl(d) => Some((d.name.clone(), gox_to_ir(resolved_decl_type(d)))),
            _ => None,
        })
        .collect()
}

fn collect_locals(body: &[Stmt]) -> Vec<(String, IrType)> {
    let mut locals = Vec::new();
    walk_locals(body, &mut locals);
    locals
}

fn walk_locals(stmts: &[Stmt], locals: &mut Vec<(String, IrType)>) {
    for stmt in stmts {
        match stmt {
            Stmt::VarDecl(d) => locals.push((d.name.clone(), gox_to_ir(resolved_decl_type(d)))),
            Stmt::If { then_body, else_body, .. } => {
                walk_locals(then_body, locals);
                if let Some(b) = else_body {
                    walk_locals(b, locals);
                }
            }
            Stmt::While { body, .. } => walk_locals(body, locals),
            _ => {}
        }
    }
}

struct Ctx {
    globals: HashSet<String>,
    locals: HashSet<String>,
}

pub fn lower(program: &Program) -> Result<Module, LowerError> {
    let globals: HashSet<String> = collect_global_names(program).into_iter().map(|(n, _)| n).collect();

    let mut module = Module::new();
    module.globals = collect_global_names(program);

    for stmt in &program.stmts {
        match stmt {
            Stmt::FuncDef(f) => module.functions.push(lower_func_def(f, &globals)?),
            Stmt::FuncImport(f) => module.functions.push(lower_func_import(f)),
            _ => {}
        }
    }

    let entry_ctx = Ctx { globals: globals.clone(), locals: HashSet::new() };
    let mut code = Vec::new();
    for stmt in &program.stmts {
        match stmt {
            Stmt::FuncDef(_) | Stmt::FuncImport(_) => {}
            other => lower_stmt(other, &mut code, &entry_ctx)?,
        }
    }
    code.push(Instr::ConstI(0));
    code.push(Instr::Ret);

    module.functions.push(IrFunction {
        name: "main".to_string(),
        param_names: Vec::new(),
        param_types: Vec::new(),
        return_type: Some(IrType::I),
        locals: Vec::new(),
        code,
        imported: false,
    });

    Ok(module)
}

fn lower_func_def(f: &FuncDef, globals: &HashSet<String>) -> Result<IrFunction, LowerError> {
    let mut locals: Vec<(String, IrType)> =
        f.params.iter().map(|p| (p.name.clone(), gox_to_ir(p.ty))).collect();
    locals.extend(collect_locals(&f.body));

    let local_names: HashSet<String> = locals.iter().map(|(n, _)| n.clone()).collect();
    let ctx = Ctx { globals: globals.clone(), locals: local_names };

    let mut code = Vec::new();
    for stmt in &f.body {
        lower_stmt(stmt, &mut code, &ctx)?;
    }
    if code.last() != Some(&Instr::Ret) {
        // A non-void function whose body falls through without an explicit
        // `return` on every path is legal (checker.rs's `contains_return`
        // only requires one `Return` somewhere in the body, not on every
        // path). The caller still pops a value, so push one before the
        // sentinel `RET` -- mirrors `ircode.py`'s trailing `CONSTI 0`.
        if let Some(ty) = f.return_type {
            code.push(default_const(ty));
        }
        code.push(Instr::Ret);
    }

    Ok(IrFunction {
        name: f.name.clone(),
        param_names: f.params.iter().map(|p| p.name.clone()).collect(),
        param_types: f.params.iter().map(|p| gox_to_ir(p.ty)).collect(),
        return_type: f.return_type.map(gox_to_ir),
        locals,
        code,
        imported: false,
    })
}

fn lower_func_import(f: &FuncImport) -> IrFunction {
    IrFunction {
        name: f.name.clone(),
        param_names: f.params.iter().map(|p| p.name.clone()).collect(),
        param_types: f.params.iter().map(|p| gox_to_ir(p.ty)).collect(),
        return_type: f.return_type.map(gox_to_ir),
        locals: Vec::new(),
        code: Vec::new(),
        imported: true,
    }
}

fn lower_stmt(stmt: &Stmt, code: &mut Vec<Instr>, ctx: &Ctx) -> Result<(), LowerError> {
    match stmt {
        Stmt::VarDecl(d) => {
            match &d.initializer {
                Some(init) => lower_expr(init, code, ctx)?,
                None => code.push(default_const(resolved_decl_type(d))),
            }
            store_named(&d.name, code, ctx);
        }
        Stmt::FuncDef(_) | Stmt::FuncImport(_) => {}
        Stmt::Assign { location, expr, line } => match location {
            Location::Named { name } => {
                lower_expr(expr, code, ctx)?;
                store_named(name, code, ctx);
            }
            Location::Mem { addr } => {
                lower_expr(addr, code, ctx)?;
                lower_expr(expr, code, ctx)?;
                code.push(poke_for(expr.ty.ok_or_else(|| err("untyped memory write", *line))?));
            }
        },
        Stmt::Print { expr, line } => {
            lower_expr(expr, code, ctx)?;
            code.push(print_for(expr.ty.ok_or_else(|| err("untyped print expression", *line))?));
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            lower_expr(cond, code, ctx)?;
            code.push(Instr::If);
            for s in then_body {
                lower_stmt(s, code, ctx)?;
            }
            if let Some(else_body) = else_body {
                code.push(Instr::Else);
                for s in else_body {
                    lower_stmt(s, code, ctx)?;
                }
            }
            code.push(Instr::EndIf);
        }
        Stmt::While { cond, body, .. } => {
            code.push(Instr::Loop);
            lower_expr(cond, code, ctx)?;
            code.push(Instr::CBreak);
            for s in body {
                lower_stmt(s, code, ctx)?;
            }
            code.push(Instr::EndLoop);
        }
        Stmt::Break { .. } => {
            // Force the loop's CBREAK-equivalent condition false: an
            // unconditional break out of the innermost loop.
            code.push(Instr::ConstI(0));
            code.push(Instr::CBreak);
        }
        Stmt::Continue { .. } => code.push(Instr::Continue),
        Stmt::Return { expr, .. } => {
            if let Some(e) = expr {
                lower_expr(e, code, ctx)?;
            }
            code.push(Instr::Ret);
        }
        Stmt::ExprStmt { call, .. } => lower_expr(call, code, ctx)?,
    }
    Ok(())
}

fn store_named(name: &str, code: &mut Vec<Instr>, ctx: &Ctx) {
    if ctx.locals.contains(name) {
        code.push(Instr::LocalSet(name.to_string()));
    } else {
        code.push(Instr::GlobalSet(name.to_string()));
    }
}

fn default_const(ty: Type) -> Instr {
    match ty {
        Type::Float => Instr::const_f(0.0),
        _ => Instr::ConstI(0),
    }
}

fn peek_for(ty: Type) -> Instr {
    match ty {
        Type::Float => Instr::PeekF,
        Type::Int => Instr::PeekI,
        Type::Char | Type::Bool => Instr::PeekB,
    }
}

fn poke_for(ty: Type) -> Instr {
    match ty {
        Type::Float => Instr::PokeF,
        Type::Int => Instr::PokeI,
        Type::Char | Type::Bool => Instr::PokeB,
    }
}

fn print_for(ty: Type) -> Instr {
    match ty {
        Type::Float => Instr::PrintF,
        Type::Int => Instr::PrintI,
        Type::Char | Type::Bool => Instr::PrintB,
    }
}

fn lower_expr(expr: &Expr, code: &mut Vec<Instr>, ctx: &Ctx) -> Result<(), LowerError> {
    match &expr.kind {
        ExprKind::Literal(lit) => code.push(match lit {
            LiteralValue::Int(n) => Instr::ConstI(*n),
            LiteralValue::Float(x) => Instr::const_f(*x),
            LiteralValue::Char(c) => Instr::ConstI(*c as i64),
            LiteralValue::Bool(b) => Instr::ConstI(if *b { 1 } else { 0 }),
        }),
        ExprKind::NamedRead { name } => {
            if ctx.locals.contains(name) {
                code.push(Instr::LocalGet(name.clone()));
            } else if ctx.globals.contains(name) {
                code.push(Instr::GlobalGet(name.clone()));
            } else {
                return Err(err(format!("undefined name '{}' at lowering time", name), expr.line));
            }
        }
        ExprKind::MemRead { addr } => {
            lower_expr(addr, code, ctx)?;
            code.push(peek_for(expr.ty.ok_or_else(|| err("untyped memory read", expr.line))?));
        }
        ExprKind::BinaryOp { op: BinOp::And, left, right } => {
            lower_expr(left, code, ctx)?;
            code.push(Instr::If);
            lower_expr(right, code, ctx)?;
            code.push(Instr::Else);
            code.push(Instr::ConstI(0));
            code.push(Instr::EndIf);
        }
        ExprKind::BinaryOp { op: BinOp::Or, left, right } => {
            lower_expr(left, code, ctx)?;
            code.push(Instr::If);
            code.push(Instr::ConstI(1));
            code.push(Instr::Else);
            lower_expr(right, code, ctx)?;
            code.push(Instr::EndIf);
        }
        ExprKind::BinaryOp { op, left, right } => {
            lower_expr(left, code, ctx)?;
            lower_expr(right, code, ctx)?;
            let operand_ty = left.ty.ok_or_else(|| err("untyped operand", expr.line))?;
            code.push(binop_instr(*op, operand_ty));
        }
        ExprKind::UnaryOp { op: UnOp::Pos, operand } => lower_expr(operand, code, ctx)?,
        ExprKind::UnaryOp { op: UnOp::Neg, operand } => {
            lower_expr(operand, code, ctx)?;
            let ty = operand.ty.ok_or_else(|| err("untyped operand", expr.line))?;
            if ty == Type::Float {
                code.push(Instr::const_f(-1.0));
                code.push(Instr::MulF);
            } else {
                code.push(Instr::ConstI(-1));
                code.push(Instr::MulI);
            }
        }
        ExprKind::UnaryOp { op: UnOp::Not, operand } => {
            lower_expr(operand, code, ctx)?;
            code.push(Instr::NotI);
        }
        ExprKind::UnaryOp { op: UnOp::Grow, operand } => {
            lower_expr(operand, code, ctx)?;
            code.push(Instr::Grow);
        }
        ExprKind::TypeCast { target, expr: inner } => {
            lower_expr(inner, code, ctx)?;
            let inner_ty = inner.ty.unwrap_or(*target);
            match (inner_ty, target) {
                (Type::Int, Type::Float) => code.push(Instr::ItoF),
                (Type::Float, Type::Int) => code.push(Instr::FtoI),
                _ => {}
            }
        }
        ExprKind::FuncCall { name, args } => {
            for arg in args.iter().rev() {
                lower_expr(arg, code, ctx)?;
            }
            code.push(Instr::Call(name.clone()));
        }
    }
    Ok(())
}

fn binop_instr(op: BinOp, operand_ty: Type) -> Instr {
    let is_float = operand_ty == Type::Float;
    match (op, is_float) {
        (BinOp::Add, false) => Instr::AddI,
        (BinOp::Add, true) => Instr::AddF,
        (BinOp::Sub, false) => Instr::SubI,
        (BinOp::Sub, true) => Instr::SubF,
        (BinOp::Mul, false) => Instr::MulI,
        (BinOp::Mul, true) => Instr::MulF,
        (BinOp::Div, false) => Instr::DivI,
        (BinOp::Div, true) => Instr::DivF,
        (BinOp::Lt, false) => Instr::LtI,
        (BinOp::Lt, true) => Instr::LtF,
        (BinOp::Le, false) => Instr::LeI,
        (BinOp::Le, true) => Instr::LeF,
        (BinOp::Gt, false) => Instr::GtI,
        (BinOp::Gt, true) => Instr::GtF,
        (BinOp::Ge, false) => Instr::GeI,
        (BinOp::Ge, true) => Instr::GeF,
        (BinOp::Eq, false) => Instr::EqI,
        (BinOp::Eq, true) => Instr::EqF,
        (BinOp::Ne, false) => Instr::NeI,
        (BinOp::Ne, true) => Instr::NeF,
        (BinOp::And, _) | (BinOp::Or, _) => unreachable!("short-circuit ops lower separately"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker;
    use crate::diagnostics::Diagnostics;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn lower_src(src: &str) -> Module {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(src).tokenize(&mut diags);
        let mut program = Parser::new(tokens, &mut diags).parse();
        checker::check(&mut program, &mut diags);
        assert_eq!(diags.count(), 0, "{}", diags);
        lower(&program).expect("lowering should succeed")
    }

    #[test]
    fn arithmetic_precedence_lowers_left_to_right() {
        let module = lower_src("print 2 + 3 * 4;");
        let main = module.find_function("main").unwrap();
        assert_eq!(
            main.code,
            vec![
                Instr::ConstI(2),
                Instr::ConstI(3),
                Instr::ConstI(4),
                Instr::MulI,
                Instr::AddI,
                Instr::PrintI,
                Instr::ConstI(0),
                Instr::Ret,
            ]
        );
    }

    #[test]
    fn while_loop_uses_cbreak_and_endloop() {
        let module = lower_src("var i int = 0; while i < 3 { print i; i = i + 1; }");
        let main = module.find_function("main").unwrap();
        assert!(main.code.contains(&Instr::Loop));
        assert!(main.code.contains(&Instr::CBreak));
        assert!(main.code.contains(&Instr::EndLoop));
    }

    #[test]
    fn function_call_lowers_args_in_reverse() {
        let module = lower_src("func f(a int, b int) int { return a; } print f(1, 2);");
        let main = module.find_function("main").unwrap();
        let idx = main.code.iter().position(|i| i == &Instr::Call("f".into())).unwrap();
        assert_eq!(main.code[idx - 1], Instr::ConstI(1));
        assert_eq!(main.code[idx - 2], Instr::ConstI(2));
    }

    #[test]
    fn global_initializer_order_is_preserved() {
        let module = lower_src("func one() int { return 1; } var a int = one(); var b int = a + 1;");
        let main = module.find_function("main").unwrap();
        let a_set = main.code.iter().position(|i| i == &Instr::GlobalSet("a".into())).unwrap();
        let b_set = main.code.iter().position(|i| i == &Instr::GlobalSet("b".into())).unwrap();
        assert!(a_set < b_set);
    }

    #[test]
    fn unary_not_lowers_to_dedicated_opcode() {
        let module = lower_src("print !true;");
        let main = module.find_function("main").unwrap();
        assert!(main.code.contains(&Instr::NotI));
        assert!(!main.code.iter().any(|i| *i == Instr::MulI));
    }

    #[test]
    fn memory_grow_and_roundtrip() {
        let module = lower_src("var p int = ^16; `p = 65; print `p;");
        let main = module.find_function("main").unwrap();
        assert!(main.code.contains(&Instr::Grow));
        assert!(main.code.contains(&Instr::PokeI));
        assert!(main.code.contains(&Instr::PeekI));
    }

    #[test]
    fn fallthrough_in_non_void_function_pushes_default_return_value() {
        // `f` only returns on one path; the implicit trailing RET on the
        // fallthrough path must still push a value for the caller to pop.
        let module = lower_src("func f(n int) int { if n > 0 { return 1; } } print f(0);");
        let f = module.find_function("f").unwrap();
        assert_eq!(f.code.last(), Some(&Instr::Ret));
        assert_eq!(f.code[f.code.len() - 2], Instr::ConstI(0));
    }

    #[test]
    fn short_circuit_and_or_use_structured_if() {
        let module = lower_src("print true && false; print true || false;");
        let main = module.find_function("main").unwrap();
        let if_count = main.code.iter().filter(|i| **i == Instr::If).count();
        assert_eq!(if_count, 2);
    }
}
