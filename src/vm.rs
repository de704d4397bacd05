// A linear-memory stack machine for running lowered `ir::Module`s.
//
// Shape follows the teacher's VM closely: a `Value`/`TypeTag`/`TypeSet`
// trio built on `enumflags2::BitFlags` for describing allowed operand
// sets in runtime type errors, a `ControlFlow` enum returned by every
// opcode handler and interpreted once by the dispatch loop, and an
// `Output` trait for the print sink so tests can capture stdout into a
// `Vec<u8>` instead of the real terminal.
//
// Only three runtime tags exist (`Int`, `Float`, `Bool`) rather than the
// four named in the language's type system: `char` has no distinct
// runtime representation here, since `char` literals lower to `CONSTI`
// (an integer push) and `PEEKB` yields a plain int (see `ir.rs`). `bool`
// literals lower the same way, so `IF`/`CBREAK` coerce a popped `Int` to
// a boolean (nonzero is true) in addition to accepting a real `Bool`
// cell produced by a comparison -- only comparisons ever construct one.

use std::collections::HashMap;
use std::fmt;

use enumflags2::BitFlags;

use crate::ir::{Instr, Module};
use crate::util::trace;

pub const DEFAULT_MEMORY_SIZE: usize = 1024;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn get_type(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Bool(_) => TypeTag::Bool,
        }
    }
}

#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum TypeTag {
    Int = 0b001,
    Float = 0b010,
    Bool = 0b100,
}

pub type TypeSet = BitFlags<TypeTag>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Underflow,
    TypeError { expect: TypeSet, got: TypeTag },
    DivisionByZero,
    InvalidAddress(i64),
    ByteOutOfRange(i64),
    UndefinedGlobal(String),
    UndefinedLocal(String),
    UndefinedFunction(String),
    /// Not a failure: sentinel for "the program counter ran off the end
    /// of the entry function's code", used the way the teacher's VM
    /// uses `Error::Halt` to mean clean termination.
    Halt,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Underflow => write!(f, "operand stack underflow"),
            Error::TypeError { expect, got } => {
                write!(f, "type error: expected one of {:?}, got {:?}", expect, got)
            }
            Error::DivisionByZero => write!(f, "division by zero"),
            Error::InvalidAddress(a) => write!(f, "invalid memory address {}", a),
            Error::ByteOutOfRange(v) => write!(f, "byte value {} out of range [0,255]", v),
            Error::UndefinedGlobal(n) => write!(f, "read of undefined global '{}'", n),
            Error::UndefinedLocal(n) => write!(f, "read of undefined local '{}'", n),
            Error::UndefinedFunction(n) => write!(f, "call to undefined function '{}'", n),
            Error::Halt => write!(f, "halt"),
        }
    }
}

impl std::error::Error for Error {}

fn expected(expect: TypeSet, got: &Value) -> Error {
    Error::TypeError { expect, got: got.get_type() }
}

fn pop_int_unchecked(stack: &mut Vec<Value>) -> Result<i64> {
    match stack.pop() {
        Some(Value::Int(n)) => Ok(n),
        Some(v) => Err(expected(BitFlags::from_flag(TypeTag::Int), &v)),
        None => Err(Error::Underflow),
    }
}

fn pop_float_unchecked(stack: &mut Vec<Value>) -> Result<f64> {
    match stack.pop() {
        Some(Value::Float(x)) => Ok(x),
        Some(v) => Err(expected(BitFlags::from_flag(TypeTag::Float), &v)),
        None => Err(Error::Underflow),
    }
}

/// `IF`/`CBREAK` both accept a real `Bool` cell or an `Int` cell
/// coerced by nonzero-ness -- see module doc comment.
fn pop_bool_coerced(stack: &mut Vec<Value>) -> Result<bool> {
    match stack.pop() {
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::Int(n)) => Ok(n != 0),
        Some(v) => Err(expected(TypeTag::Bool | TypeTag::Int, &v)),
        None => Err(Error::Underflow),
    }
}

/// Output sink for `PRINTI`/`PRINTF`/`PRINTB`, generalized from the
/// teacher's "emit one canvas draw call" trait into "emit one formatted
/// primitive".
pub trait Output {
    fn output(&mut self, text: &str) -> Result<()>;
}

pub struct Stdout;

impl Output for Stdout {
    fn output(&mut self, text: &str) -> Result<()> {
        print!("{}", text);
        Ok(())
    }
}

impl Output for Vec<u8> {
    fn output(&mut self, text: &str) -> Result<()> {
        self.extend_from_slice(text.as_bytes());
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct CompiledFunction {
    param_count: usize,
    locals_count: usize,
    locals_index: HashMap<String, usize>,
    entry_pc: Option<usize>,
}

#[derive(Clone, Debug, Default)]
struct ControlIndex {
    /// `IF` pc -> pc to branch to when the condition is false.
    if_false_target: HashMap<usize, usize>,
    /// `ELSE` pc -> pc to branch to unconditionally (skip the else body).
    else_target: HashMap<usize, usize>,
    /// `CBREAK` pc -> pc to branch to when the condition is false.
    cbreak_target: HashMap<usize, usize>,
    /// `CONTINUE` pc -> pc of the loop's condition re-check.
    continue_target: HashMap<usize, usize>,
    /// `ENDLOOP` pc -> pc of the loop's condition re-check.
    endloop_target: HashMap<usize, usize>,
}

fn index_control_flow(code: &[Instr]) -> ControlIndex {
    let mut idx = ControlIndex::default();

    let mut if_stack: Vec<(usize, Option<usize>)> = Vec::new();
    for (pc, instr) in code.iter().enumerate() {
        match instr {
            Instr::If => if_stack.push((pc, None)),
            Instr::Else => {
                if let Some((_, else_pc)) = if_stack.last_mut() {
                    *else_pc = Some(pc);
                }
            }
            Instr::EndIf => {
                if let Some((if_pc, else_pc)) = if_stack.pop() {
                    let false_target = else_pc.map(|e| e + 1).unwrap_or(pc + 1);
                    idx.if_false_target.insert(if_pc, false_target);
                    if let Some(e) = else_pc {
                        idx.else_target.insert(e, pc + 1);
                    }
                }
            }
            _ => {}
        }
    }

    let mut loop_end: HashMap<usize, usize> = HashMap::new();
    let mut loop_stack: Vec<usize> = Vec::new();
    for (pc, instr) in code.iter().enumerate() {
        match instr {
            Instr::Loop => loop_stack.push(pc),
            Instr::EndLoop => {
                if let Some(start) = loop_stack.pop() {
                    loop_end.insert(start, pc);
                }
            }
            _ => {}
        }
    }

    let mut open_loops: Vec<usize> = Vec::new();
    for (pc, instr) in code.iter().enumerate() {
        match instr {
            Instr::Loop => open_loops.push(pc),
            Instr::EndLoop => {
                if let Some(loop_pc) = open_loops.pop() {
                    idx.endloop_target.insert(pc, loop_pc + 1);
                }
            }
            Instr::CBreak => {
                if let Some(loop_pc) = open_loops.last() {
                    if let Some(end) = loop_end.get(loop_pc) {
                        idx.cbreak_target.insert(pc, end + 1);
                    }
                }
            }
            Instr::Continue => {
                if let Some(loop_pc) = open_loops.last() {
                    idx.continue_target.insert(pc, loop_pc + 1);
                }
            }
            _ => {}
        }
    }

    idx
}

/// A module flattened into one linear address space, ready to execute.
#[derive(Clone, Debug)]
pub struct Program {
    code: Vec<Instr>,
    functions: HashMap<String, CompiledFunction>,
    control: ControlIndex,
}

impl Program {
    pub fn compile(module: &Module) -> Program {
        let mut code = Vec::new();
        let mut functions = HashMap::new();

        for func in &module.functions {
            let locals_index: HashMap<String, usize> =
                func.locals.iter().enumerate().map(|(i, (name, _))| (name.clone(), i)).collect();

            let entry_pc = if func.imported {
                None
            } else {
                let start = code.len();
                code.extend(func.code.iter().cloned());
                Some(start)
            };

            functions.insert(
                func.name.clone(),
                CompiledFunction {
                    param_count: func.param_names.len(),
                    locals_count: func.locals.len(),
                    locals_index,
                    entry_pc,
                },
            );
        }

        let control = index_control_flow(&code);
        Program { code, functions, control }
    }
}

struct CallRecord {
    return_pc: usize,
    saved_locals: Vec<Option<Value>>,
    saved_function: String,
    saved_frame_pointer: usize,
}

enum ControlFlow {
    Advance,
    Branch(usize),
    Yield(Value),
}

pub struct Vm {
    program: Program,
    globals: HashMap<String, Value>,
    memory: Vec<u8>,
    stack: Vec<Value>,
    call_stack: Vec<CallRecord>,
    locals: Vec<Option<Value>>,
    cur_function: String,
    frame_pointer: usize,
    pc: usize,
}

impl Vm {
    pub fn new(program: Program, mem_size: usize) -> Vm {
        Vm {
            program,
            globals: HashMap::new(),
            memory: vec![0u8; mem_size],
            stack: Vec::new(),
            call_stack: Vec::new(),
            locals: Vec::new(),
            cur_function: "main".to_string(),
            frame_pointer: 0,
            pc: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    fn cur_fn(&self) -> &CompiledFunction {
        self.program.functions.get(&self.cur_function).expect("cur_function always resolves")
    }

    pub fn run(&mut self, out: &mut impl Output) -> Result<()> {
        let entry = self
            .program
            .functions
            .get("main")
            .and_then(|f| f.entry_pc)
            .ok_or_else(|| Error::UndefinedFunction("main".to_string()))?;

        self.pc = entry;
        self.stack.clear();
        self.call_stack.clear();
        self.locals.clear();
        self.cur_function = "main".to_string();
        self.frame_pointer = 0;

        loop {
            match self.step(out) {
                Err(Error::Halt) => return Ok(()),
                Err(e) => return Err(e),
                Ok(()) => continue,
            }
        }
    }

    fn step(&mut self, out: &mut impl Output) -> Result<()> {
        if self.pc >= self.program.code.len() {
            return Err(Error::Halt);
        }
        let instr = self.program.code[self.pc].clone();
        trace!("{}: {:?} {:?}", self.pc, instr, self.stack);

        let result = self.dispatch(&instr, out)?;
        match result {
            ControlFlow::Advance => self.pc += 1,
            ControlFlow::Branch(target) => self.pc = target,
            ControlFlow::Yield(v) => {
                self.stack.push(v);
                self.pc += 1;
            }
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(Error::Underflow)
    }

    fn ensure_capacity(&mut self, addr: usize, width: usize) {
        let needed = addr + width;
        if needed > self.memory.len() {
            self.memory.resize(needed, 0);
        }
    }

    fn pop_address(&mut self) -> Result<usize> {
        let raw = pop_int_unchecked(&mut self.stack)?;
        if raw < 0 {
            return Err(Error::InvalidAddress(raw));
        }
        Ok(raw as usize)
    }

    fn dispatch(&mut self, instr: &Instr, out: &mut impl Output) -> Result<ControlFlow> {
        use Instr::*;
        match instr {
            ConstI(n) => Ok(ControlFlow::Yield(Value::Int(*n))),
            AddI => self.binop_i(|a, b| Ok(a.wrapping_add(b))),
            SubI => self.binop_i(|a, b| Ok(a.wrapping_sub(b))),
            MulI => self.binop_i(|a, b| Ok(a.wrapping_mul(b))),
            DivI => self.binop_i(|a, b| if b == 0 { Err(Error::DivisionByZero) } else { Ok(a / b) }),
            AndI => self.logic_i(|a, b| a && b),
            OrI => self.logic_i(|a, b| a || b),
            LtI => self.cmp_i(|a, b| a < b),
            LeI => self.cmp_i(|a, b| a <= b),
            GtI => self.cmp_i(|a, b| a > b),
            GeI => self.cmp_i(|a, b| a >= b),
            EqI => self.cmp_i(|a, b| a == b),
            NeI => self.cmp_i(|a, b| a != b),
            NotI => {
                let b = pop_bool_coerced(&mut self.stack)?;
                Ok(ControlFlow::Yield(Value::Bool(!b)))
            }
            PrintI => {
                let n = pop_int_unchecked(&mut self.stack)?;
                out.output(&n.to_string())?;
                Ok(ControlFlow::Advance)
            }
            PeekI => {
                let addr = self.pop_address()?;
                self.ensure_capacity(addr, 4);
                let bytes = [
                    self.memory[addr],
                    self.memory[addr + 1],
                    self.memory[addr + 2],
                    self.memory[addr + 3],
                ];
                Ok(ControlFlow::Yield(Value::Int(i32::from_le_bytes(bytes) as i64)))
            }
            PokeI => {
                let value = pop_int_unchecked(&mut self.stack)?;
                let addr = self.pop_address()?;
                self.ensure_capacity(addr, 4);
                let bytes = (value as i32).to_le_bytes();
                self.memory[addr..addr + 4].copy_from_slice(&bytes);
                Ok(ControlFlow::Advance)
            }
            ItoF => {
                let n = pop_int_unchecked(&mut self.stack)?;
                Ok(ControlFlow::Yield(Value::Float(n as f64)))
            }

            ConstF(bits) => Ok(ControlFlow::Yield(Value::Float(f64::from_bits(*bits)))),
            AddF => self.binop_f(|a, b| a + b),
            SubF => self.binop_f(|a, b| a - b),
            MulF => self.binop_f(|a, b| a * b),
            DivF => {
                let b = pop_float_unchecked(&mut self.stack)?;
                let a = pop_float_unchecked(&mut self.stack)?;
                if b.abs() < 1e-12 {
                    Err(Error::DivisionByZero)
                } else {
                    Ok(ControlFlow::Yield(Value::Float(a / b)))
                }
            }
            LtF => self.cmp_f(|a, b| a < b),
            LeF => self.cmp_f(|a, b| a <= b),
            GtF => self.cmp_f(|a, b| a > b),
            GeF => self.cmp_f(|a, b| a >= b),
            EqF => self.cmp_f(|a, b| a == b),
            NeF => self.cmp_f(|a, b| a != b),
            PrintF => {
                let x = pop_float_unchecked(&mut self.stack)?;
                out.output(&x.to_string())?;
                Ok(ControlFlow::Advance)
            }
            PeekF => {
                let addr = self.pop_address()?;
                self.ensure_capacity(addr, 4);
                let bytes = [
                    self.memory[addr],
                    self.memory[addr + 1],
                    self.memory[addr + 2],
                    self.memory[addr + 3],
                ];
                Ok(ControlFlow::Yield(Value::Float(f32::from_le_bytes(bytes) as f64)))
            }
            PokeF => {
                let value = pop_float_unchecked(&mut self.stack)?;
                let addr = self.pop_address()?;
                self.ensure_capacity(addr, 4);
                let bytes = (value as f32).to_le_bytes();
                self.memory[addr..addr + 4].copy_from_slice(&bytes);
                Ok(ControlFlow::Advance)
            }
            FtoI => {
                let x = pop_float_unchecked(&mut self.stack)?;
                Ok(ControlFlow::Yield(Value::Int(x as i64)))
            }

            PrintB => {
                match self.pop()? {
                    Value::Bool(b) => out.output(if b { "true" } else { "false" })?,
                    Value::Int(n) => {
                        let c = char::from_u32(n as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                        let mut buf = [0u8; 4];
                        out.output(c.encode_utf8(&mut buf))?;
                    }
                    v => return Err(expected(TypeTag::Int | TypeTag::Bool, &v)),
                }
                Ok(ControlFlow::Advance)
            }
            PeekB => {
                let addr = self.pop_address()?;
                self.ensure_capacity(addr, 1);
                Ok(ControlFlow::Yield(Value::Int(self.memory[addr] as i64)))
            }
            PokeB => {
                let value = pop_int_unchecked(&mut self.stack)?;
                if !(0..=255).contains(&value) {
                    return Err(Error::ByteOutOfRange(value));
                }
                let addr = self.pop_address()?;
                self.ensure_capacity(addr, 1);
                self.memory[addr] = value as u8;
                Ok(ControlFlow::Advance)
            }

            LocalGet(name) => {
                let slot = *self
                    .cur_fn()
                    .locals_index
                    .get(name)
                    .unwrap_or_else(|| panic!("lowering produced unknown local '{}'", name));
                match self.locals.get(slot).and_then(|o| *o) {
                    Some(v) => Ok(ControlFlow::Yield(v)),
                    None => Err(Error::UndefinedLocal(name.clone())),
                }
            }
            LocalSet(name) => {
                let slot = *self
                    .cur_fn()
                    .locals_index
                    .get(name)
                    .unwrap_or_else(|| panic!("lowering produced unknown local '{}'", name));
                let v = self.pop()?;
                self.locals[slot] = Some(v);
                Ok(ControlFlow::Advance)
            }
            GlobalGet(name) => match self.globals.get(name) {
                Some(v) => Ok(ControlFlow::Yield(*v)),
                None => Err(Error::UndefinedGlobal(name.clone())),
            },
            GlobalSet(name) => {
                let v = self.pop()?;
                self.globals.insert(name.clone(), v);
                Ok(ControlFlow::Advance)
            }

            Call(name) => self.call(name),
            Ret => self.ret(),

            If => {
                let cond = pop_bool_coerced(&mut self.stack)?;
                if cond {
                    Ok(ControlFlow::Advance)
                } else {
                    let target =
                        *self.program.control.if_false_target.get(&self.pc).expect("unindexed IF");
                    Ok(ControlFlow::Branch(target))
                }
            }
            Else => {
                let target = *self.program.control.else_target.get(&self.pc).expect("unindexed ELSE");
                Ok(ControlFlow::Branch(target))
            }
            EndIf => Ok(ControlFlow::Advance),
            Loop => Ok(ControlFlow::Advance),
            CBreak => {
                let cond = pop_bool_coerced(&mut self.stack)?;
                if cond {
                    Ok(ControlFlow::Advance)
                } else {
                    let target =
                        *self.program.control.cbreak_target.get(&self.pc).expect("unindexed CBREAK");
                    Ok(ControlFlow::Branch(target))
                }
            }
            Continue => {
                let target =
                    *self.program.control.continue_target.get(&self.pc).expect("unindexed CONTINUE");
                Ok(ControlFlow::Branch(target))
            }
            EndLoop => {
                let target =
                    *self.program.control.endloop_target.get(&self.pc).expect("unindexed ENDLOOP");
                Ok(ControlFlow::Branch(target))
            }

            Grow => {
                let n = pop_int_unchecked(&mut self.stack)?;
                if n < 0 {
                    return Err(Error::InvalidAddress(n));
                }
                self.memory.extend(std::iter::repeat(0u8).take(n as usize));
                Ok(ControlFlow::Yield(Value::Int(self.memory.len() as i64)))
            }
        }
    }

    fn binop_i(&mut self, f: impl Fn(i64, i64) -> Result<i64>) -> Result<ControlFlow> {
        let b = pop_int_unchecked(&mut self.stack)?;
        let a = pop_int_unchecked(&mut self.stack)?;
        Ok(ControlFlow::Yield(Value::Int(f(a, b)?)))
    }

    fn cmp_i(&mut self, f: impl Fn(i64, i64) -> bool) -> Result<ControlFlow> {
        let b = pop_int_unchecked(&mut self.stack)?;
        let a = pop_int_unchecked(&mut self.stack)?;
        Ok(ControlFlow::Yield(Value::Bool(f(a, b))))
    }

    fn logic_i(&mut self, f: impl Fn(bool, bool) -> bool) -> Result<ControlFlow> {
        let b = pop_bool_coerced(&mut self.stack)?;
        let a = pop_bool_coerced(&mut self.stack)?;
        Ok(ControlFlow::Yield(Value::Bool(f(a, b))))
    }

    fn binop_f(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<ControlFlow> {
        let b = pop_float_unchecked(&mut self.stack)?;
        let a = pop_float_unchecked(&mut self.stack)?;
        Ok(ControlFlow::Yield(Value::Float(f(a, b))))
    }

    fn cmp_f(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<ControlFlow> {
        let b = pop_float_unchecked(&mut self.stack)?;
        let a = pop_float_unchecked(&mut self.stack)?;
        Ok(ControlFlow::Yield(Value::Bool(f(a, b))))
    }

    fn call(&mut self, name: &str) -> Result<ControlFlow> {
        let func = self
            .program
            .functions
            .get(name)
            .ok_or_else(|| Error::UndefinedFunction(name.to_string()))?;
        let entry = func.entry_pc.ok_or_else(|| Error::UndefinedFunction(name.to_string()))?;
        let param_count = func.param_count;
        let locals_count = func.locals_count;

        // Arguments were lowered in reverse order, so the first `pop`
        // here is already the first declared parameter -- no extra
        // reversal needed to land it in slot 0.
        let mut args = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            args.push(self.pop()?);
        }

        self.call_stack.push(CallRecord {
            return_pc: self.pc + 1,
            saved_locals: std::mem::take(&mut self.locals),
            saved_function: self.cur_function.clone(),
            saved_frame_pointer: self.frame_pointer,
        });

        let mut new_locals = vec![None; locals_count];
        for (slot, value) in args.into_iter().enumerate() {
            new_locals[slot] = Some(value);
        }
        self.locals = new_locals;
        self.cur_function = name.to_string();
        self.frame_pointer = self.stack.len();

        Ok(ControlFlow::Branch(entry))
    }

    fn ret(&mut self) -> Result<ControlFlow> {
        match self.call_stack.pop() {
            Some(record) => {
                self.locals = record.saved_locals;
                self.cur_function = record.saved_function;
                self.frame_pointer = record.saved_frame_pointer;
                Ok(ControlFlow::Branch(record.return_pc))
            }
            None => Err(Error::Halt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrFunction, IrType};

    fn run_program(program: Program) -> (Result<()>, Vec<u8>) {
        let mut vm = Vm::new(program, DEFAULT_MEMORY_SIZE);
        let mut out = Vec::new();
        let status = vm.run(&mut out);
        (status, out)
    }

    fn main_fn(code: Vec<Instr>) -> Module {
        Module {
            globals: vec![],
            functions: vec![IrFunction {
                name: "main".to_string(),
                param_names: vec![],
                param_types: vec![],
                return_type: Some(IrType::I),
                locals: vec![],
                code,
                imported: false,
            }],
        }
    }

    #[test]
    fn arithmetic_and_print() {
        let module = main_fn(vec![
            Instr::ConstI(2),
            Instr::ConstI(3),
            Instr::ConstI(4),
            Instr::MulI,
            Instr::AddI,
            Instr::PrintI,
            Instr::Ret,
        ]);
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"14");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let module = main_fn(vec![Instr::ConstI(1), Instr::ConstI(0), Instr::DivI, Instr::Ret]);
        let (status, _) = run_program(Program::compile(&module));
        assert_eq!(status, Err(Error::DivisionByZero));
    }

    #[test]
    fn if_else_selects_branch() {
        let module = main_fn(vec![
            Instr::ConstI(5),
            Instr::ConstI(3),
            Instr::GtI,
            Instr::If,
            Instr::ConstI(1),
            Instr::PrintI,
            Instr::Else,
            Instr::ConstI(0),
            Instr::PrintI,
            Instr::EndIf,
            Instr::Ret,
        ]);
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"1");
    }

    #[test]
    fn while_loop_counts_up() {
        // var i = 0; while i < 3 { print i; i = i + 1; }
        let module = Module {
            globals: vec![("i".to_string(), IrType::I)],
            functions: vec![IrFunction {
                name: "main".to_string(),
                param_names: vec![],
                param_types: vec![],
                return_type: Some(IrType::I),
                locals: vec![],
                code: vec![
                    Instr::ConstI(0),
                    Instr::GlobalSet("i".to_string()),
                    Instr::Loop,
                    Instr::GlobalGet("i".to_string()),
                    Instr::ConstI(3),
                    Instr::LtI,
                    Instr::CBreak,
                    Instr::GlobalGet("i".to_string()),
                    Instr::PrintI,
                    Instr::GlobalGet("i".to_string()),
                    Instr::ConstI(1),
                    Instr::AddI,
                    Instr::GlobalSet("i".to_string()),
                    Instr::EndLoop,
                    Instr::Ret,
                ],
                imported: false,
            }],
        };
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"012");
    }

    #[test]
    fn explicit_break_exits_loop_early() {
        let module = Module {
            globals: vec![("i".to_string(), IrType::I)],
            functions: vec![IrFunction {
                name: "main".to_string(),
                param_names: vec![],
                param_types: vec![],
                return_type: Some(IrType::I),
                locals: vec![],
                code: vec![
                    Instr::ConstI(0),
                    Instr::GlobalSet("i".to_string()),
                    Instr::Loop,
                    Instr::ConstI(1), // unconditional true: loop body always entered
                    Instr::CBreak,
                    Instr::GlobalGet("i".to_string()),
                    Instr::ConstI(1),
                    Instr::EqI,
                    Instr::If,
                    Instr::ConstI(0),
                    Instr::CBreak, // explicit break: forced false -> exit
                    Instr::Else,
                    Instr::EndIf,
                    Instr::GlobalGet("i".to_string()),
                    Instr::PrintI,
                    Instr::GlobalGet("i".to_string()),
                    Instr::ConstI(1),
                    Instr::AddI,
                    Instr::GlobalSet("i".to_string()),
                    Instr::EndLoop,
                    Instr::Ret,
                ],
                imported: false,
            }],
        };
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"0");
    }

    #[test]
    fn function_call_and_return() {
        let module = Module {
            globals: vec![],
            functions: vec![
                IrFunction {
                    name: "sq".to_string(),
                    param_names: vec!["n".to_string()],
                    param_types: vec![IrType::I],
                    return_type: Some(IrType::I),
                    locals: vec![("n".to_string(), IrType::I)],
                    code: vec![
                        Instr::LocalGet("n".to_string()),
                        Instr::LocalGet("n".to_string()),
                        Instr::MulI,
                        Instr::Ret,
                    ],
                    imported: false,
                },
                IrFunction {
                    name: "main".to_string(),
                    param_names: vec![],
                    param_types: vec![],
                    return_type: Some(IrType::I),
                    locals: vec![],
                    code: vec![
                        Instr::ConstI(7),
                        Instr::Call("sq".to_string()),
                        Instr::PrintI,
                        Instr::Ret,
                    ],
                    imported: false,
                },
            ],
        };
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"49");
    }

    #[test]
    fn recursive_factorial() {
        let module = Module {
            globals: vec![],
            functions: vec![
                IrFunction {
                    name: "fact".to_string(),
                    param_names: vec!["n".to_string()],
                    param_types: vec![IrType::I],
                    return_type: Some(IrType::I),
                    locals: vec![("n".to_string(), IrType::I)],
                    code: vec![
                        Instr::LocalGet("n".to_string()),
                        Instr::ConstI(2),
                        Instr::LeI,
                        Instr::If,
                        Instr::LocalGet("n".to_string()),
                        Instr::Ret,
                        Instr::Else,
                        Instr::LocalGet("n".to_string()),
                        Instr::LocalGet("n".to_string()),
                        Instr::ConstI(1),
                        Instr::SubI,
                        Instr::Call("fact".to_string()),
                        Instr::MulI,
                        Instr::Ret,
                        Instr::EndIf,
                        Instr::ConstI(0),
                        Instr::Ret,
                    ],
                    imported: false,
                },
                IrFunction {
                    name: "main".to_string(),
                    param_names: vec![],
                    param_types: vec![],
                    return_type: Some(IrType::I),
                    locals: vec![],
                    code: vec![
                        Instr::ConstI(5),
                        Instr::Call("fact".to_string()),
                        Instr::PrintI,
                        Instr::Ret,
                    ],
                    imported: false,
                },
            ],
        };
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"120");
    }

    #[test]
    fn memory_grow_poke_peek_roundtrip() {
        let module = main_fn(vec![
            Instr::ConstI(16),
            Instr::Grow,
            Instr::ConstI(0), // address
            Instr::ConstI(65),
            Instr::PokeI,
            Instr::ConstI(0),
            Instr::PeekI,
            Instr::PrintI,
            Instr::Ret,
        ]);
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"65");
    }

    #[test]
    fn memory_auto_grows_on_out_of_range_access() {
        let module = main_fn(vec![
            Instr::ConstI(2000),
            Instr::ConstI(9),
            Instr::PokeI,
            Instr::Ret,
        ]);
        let mut vm = Vm::new(Program::compile(&module), DEFAULT_MEMORY_SIZE);
        let mut out = Vec::new();
        assert_eq!(vm.run(&mut out), Ok(()));
        assert!(vm.memory_len() >= 2004);
    }

    #[test]
    fn poke_byte_out_of_range_is_an_error() {
        let module = main_fn(vec![Instr::ConstI(0), Instr::ConstI(256), Instr::PokeB, Instr::Ret]);
        let (status, _) = run_program(Program::compile(&module));
        assert_eq!(status, Err(Error::ByteOutOfRange(256)));
    }

    #[test]
    fn call_to_undefined_function_is_an_error() {
        let module = main_fn(vec![Instr::Call("missing".to_string()), Instr::Ret]);
        let (status, _) = run_program(Program::compile(&module));
        assert_eq!(status, Err(Error::UndefinedFunction("missing".to_string())));
    }

    #[test]
    fn imported_function_has_no_body_and_errors_on_call() {
        let module = Module {
            globals: vec![],
            functions: vec![
                IrFunction {
                    name: "host_log".to_string(),
                    param_names: vec!["n".to_string()],
                    param_types: vec![IrType::I],
                    return_type: None,
                    locals: vec![],
                    code: vec![],
                    imported: true,
                },
                IrFunction {
                    name: "main".to_string(),
                    param_names: vec![],
                    param_types: vec![],
                    return_type: Some(IrType::I),
                    locals: vec![],
                    code: vec![Instr::ConstI(1), Instr::Call("host_log".to_string()), Instr::Ret],
                    imported: false,
                },
            ],
        };
        let (status, _) = run_program(Program::compile(&module));
        assert_eq!(status, Err(Error::UndefinedFunction("host_log".to_string())));
    }

    #[test]
    fn reading_undefined_global_is_an_error() {
        let module = main_fn(vec![Instr::GlobalGet("g".to_string()), Instr::Ret]);
        let (status, _) = run_program(Program::compile(&module));
        assert_eq!(status, Err(Error::UndefinedGlobal("g".to_string())));
    }

    #[test]
    fn not_coerces_int_operand_to_bool() {
        // `!true` where the bool literal lowered to CONSTI 1.
        let module = main_fn(vec![
            Instr::ConstI(1),
            Instr::NotI,
            Instr::If,
            Instr::ConstI(9),
            Instr::PrintI,
            Instr::Else,
            Instr::ConstI(0),
            Instr::PrintI,
            Instr::EndIf,
            Instr::Ret,
        ]);
        let (status, out) = run_program(Program::compile(&module));
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"0");
    }
}
