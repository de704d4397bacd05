// goxc: a thin command-line front end for the goxlang pipeline.
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

use std::env::args;
use std::fs;
use std::process::exit;

use goxlang::vm::Stdout;
use goxlang::{compile_and_run, Failure};

fn main() {
    let path = match args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("Error: no source file given");
            exit(1);
        }
    };

    let source = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: couldn't read '{}': {}", path, e);
            exit(1);
        }
    };

    let mut out = Stdout;
    match compile_and_run(&source, &mut out) {
        Ok(Ok(())) => {}
        Ok(Err(runtime_error)) => {
            eprintln!("Error: {}", runtime_error);
            exit(1);
        }
        Err(Failure::Diagnostics(diags)) => {
            eprint!("{}", diags);
            exit(1);
        }
        Err(Failure::Lowering(e)) => {
            eprintln!("{}", e);
            exit(1);
        }
    }
}
