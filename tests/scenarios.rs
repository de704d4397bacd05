// End-to-end pipeline tests: source text in, stdout or diagnostics out,
// through the public `goxlang::compile_and_run` entry point.

use goxlang::{compile_and_run, Failure};

fn run(source: &str) -> (goxlang::vm::Result<()>, String) {
    let mut out = Vec::new();
    let result = compile_and_run(source, &mut out).expect("program should compile cleanly");
    (result, String::from_utf8(out).unwrap())
}

fn run_ok(source: &str) -> String {
    let (status, out) = run(source);
    assert_eq!(status, Ok(()));
    out
}

fn expect_diagnostics(source: &str) {
    let mut out = Vec::new();
    let result = compile_and_run(source, &mut out);
    assert!(matches!(result, Err(Failure::Diagnostics(_))), "expected diagnostics for: {}", source);
}

#[test]
fn scenario_1_arithmetic_precedence() {
    assert_eq!(run_ok("print 2 + 3 * 4;"), "14");
}

#[test]
fn scenario_2_variable_sum() {
    assert_eq!(run_ok("var x int = 10; var y int = 20; print x + y;"), "30");
}

#[test]
fn scenario_3_function_call() {
    assert_eq!(run_ok("func sq(n int) int { return n*n; } print sq(7);"), "49");
}

#[test]
fn scenario_4_while_loop() {
    assert_eq!(run_ok("var i int = 0; while i < 3 { print i; i = i + 1; }"), "012");
}

#[test]
fn scenario_5_if_else() {
    assert_eq!(run_ok("if 5 > 3 { print 1; } else { print 0; }"), "1");
}

#[test]
fn scenario_6_memory_grow_poke_peek() {
    assert_eq!(run_ok("var p int = ^16; `0 = 65; print `0;"), "65");
}

#[test]
fn scenario_6b_memory_auto_grows_on_out_of_range_access() {
    // No explicit `^` grow here -- the poke address itself is out of the
    // VM's default 1024-byte memory, so the auto-growth path is the only
    // thing making this valid (spec.md 4.8 "any access beyond current
    // memory size triggers auto-growth").
    assert_eq!(run_ok("`2000 = 9; print `2000;"), "9");
}

#[test]
fn negative_type_mismatch_on_initializer() {
    expect_diagnostics("var x int = 1.5;");
}

#[test]
fn negative_missing_return_in_non_void_function() {
    expect_diagnostics("func f() int { }");
}

#[test]
fn negative_break_outside_loop() {
    expect_diagnostics("break;");
}

#[test]
fn negative_arity_mismatch() {
    expect_diagnostics("func f(n int) int { return n; } f(1, 2);");
}

#[test]
fn division_by_zero_is_a_vm_runtime_error() {
    let (status, _) = run("print 1 / 0;");
    assert_eq!(status, Err(goxlang::vm::Error::DivisionByZero));
}

#[test]
fn recursive_function_call() {
    let source = "\
        func fact(n int) int {\n\
            if n <= 1 { return 1; } else { return n * fact(n - 1); }\n\
        }\n\
        print fact(5);\n\
    ";
    assert_eq!(run_ok(source), "120");
}

#[test]
fn logical_short_circuit_and_or() {
    assert_eq!(
        run_ok("var a bool = true; var b bool = false; if a && !b { print 1; } else { print 0; }"),
        "1"
    );
}
