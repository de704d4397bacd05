// goxlang: compiler and stack-machine execution environment for the
// GoxLang language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

#[macro_use]
extern crate lazy_static;

pub mod ast;
pub mod checker;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod symtab;
pub mod token;
pub mod types;
#[macro_use]
pub mod util;
pub mod vm;

use diagnostics::Diagnostics;
use vm::Output;

/// What stopped a run before it printed anything at all: failures that
/// never reach the VM. A runtime `vm::Error` is reported separately by
/// `compile_and_run`'s return value, since by that point any output the
/// program already produced is real and should not be discarded.
#[derive(Clone, Debug, PartialEq)]
pub enum Failure {
    /// Lexing, parsing, or checking reported one or more diagnostics.
    Diagnostics(Diagnostics),
    Lowering(lower::LowerError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Diagnostics(d) => write!(f, "{}", d),
            Failure::Lowering(e) => write!(f, "{}", e),
        }
    }
}

/// Runs the full pipeline -- lex, parse, check, lower, execute -- on
/// `source`, writing `print` output through `out`.
///
/// Returns `Ok(())` on a clean run, `Err(Failure::Diagnostics(_))` if any
/// stage before lowering reported a problem (lowering never runs against
/// an unclean AST), `Err(Failure::Lowering(_))` if lowering itself failed,
/// and the VM's own `Result` is returned unwrapped inside `Ok` so a
/// runtime error (e.g. division by zero) is visible to the caller
/// alongside whatever the program already printed.
pub fn compile_and_run(source: &str, out: &mut impl Output) -> Result<vm::Result<()>, Failure> {
    let mut diags = Diagnostics::new();

    let tokens = lexer::Lexer::new(source).tokenize(&mut diags);
    let mut program = parser::Parser::new(tokens, &mut diags).parse();

    checker::check(&mut program, &mut diags);

    if !diags.is_empty() {
        return Err(Failure::Diagnostics(diags));
    }

    let module = lower::lower(&program).map_err(Failure::Lowering)?;
    let compiled = vm::Program::compile(&module);
    let mut machine = vm::Vm::new(compiled, vm::DEFAULT_MEMORY_SIZE);

    Ok(machine.run(out))
}
