//! End-to-end scenarios: compile a script, run it against the bundled
//! reference VM, and check the result.
use calcc::prelude::*;

/// Compiles `source` as a single interactive unit and returns whatever it
/// printed. Source must not contain `define` — `compile_one` skips the
/// top-level directive dispatch that handles function definitions.
fn print_output(source: &str) -> String {
    let mut compiler = Compiler::new(source, CompilerConfig::default());
    let function = compiler.compile_one();
    assert!(!compiler.had_error(), "{:?}", compiler.diagnostics().errors());
    let program = compiler.registries();
    let mut vm = Vm::new();
    vm.execute(&function, &program, &[]).expect("execution succeeds");
    vm.take_output()
}

/// Compiles `source` through the full top-level loop (so `define` works),
/// then calls the named user function directly and returns its result.
fn call(source: &str, name: &str, args: &[Value]) -> Value {
    let mut compiler = Compiler::new(source, CompilerConfig::default());
    let mut host = NullHost;
    let mut vm = Vm::new();
    compiler.run(&mut host, &mut vm);
    assert!(!compiler.had_error());
    let program = compiler.registries();
    let idx = program.user_funcs.find(name).unwrap_or_else(|| panic!("no such function: {name}"));
    let function = program.user_funcs.get(idx);
    vm.execute(function, &program, args).expect("execution succeeds")
}

#[test]
fn default_parameter_values() {
    assert_eq!(call("define f(x, y=3) = x+y;", "f", &[Value::Num(2)]), Value::Num(5));
    assert_eq!(
        call("define f(x, y=3) = x+y;", "f", &[Value::Num(2), Value::Num(7)]),
        Value::Num(12)
    );
}

#[test]
fn for_loop_accumulation() {
    let out = call(
        "define g(n) {local i, s=0; for (i=1; i<=n; i++) s+=i; return s;}",
        "g",
        &[Value::Num(10)],
    );
    assert_eq!(out, Value::Num(55));
}

#[test]
fn switch_case_default() {
    let source = r#"define h(n) {switch (n) { case 1: return "a"; case 2: return "b"; default: return "z"; }}"#;
    assert_eq!(call(source, "h", &[Value::Num(2)]), Value::Str("b".into()));
    assert_eq!(call(source, "h", &[Value::Num(5)]), Value::Str("z".into()));
}

#[test]
fn object_field_access() {
    let out = print_output(
        "local obj point {x, y}; local obj point p = {3, 4}; print p.x + p.y;",
    );
    assert_eq!(out, "7");
}

#[test]
fn matrix_size_and_index() {
    let out = print_output("local mat a[] = {10, 20, 30}; print size(a), a[1];");
    assert_eq!(out, "3 20");
}

#[test]
fn recursive_definition() {
    let out = call("define r(n) = n<=0 ? 0 : n + r(n-1);", "r", &[Value::Num(5)]);
    assert_eq!(out, Value::Num(15));
}

#[test]
fn short_circuit_and_does_not_evaluate_rhs() {
    let out = print_output("global hit = 0; local x = 0 && (hit = 1); print hit;");
    assert_eq!(out, "0");
}

#[test]
fn short_circuit_or_does_not_evaluate_rhs() {
    let out = print_output("global hit = 0; local x = 1 || (hit = 1); print hit;");
    assert_eq!(out, "0");
}

#[test]
fn compound_assignment_chain() {
    let out = print_output("local a = 1, b = 2, c = 3; a += b += c; print a, b, c;");
    assert_eq!(out, "6 5 3");
}

#[test]
fn function_redefinition_replaces_body() {
    let out = call("define f() = 1; define f() = 2;", "f", &[]);
    assert_eq!(out, Value::Num(2));
}

#[test]
fn static_initializer_runs_exactly_once_across_calls() {
    let mut compiler = Compiler::new(
        "define bump() {static n = 0; n = n + 1; return n;}",
        CompilerConfig::default(),
    );
    let mut host = NullHost;
    let mut vm = Vm::new();
    compiler.run(&mut host, &mut vm);
    assert!(!compiler.had_error());
    let program = compiler.registries();
    let idx = program.user_funcs.find("bump").unwrap();
    let function = program.user_funcs.get(idx);
    assert_eq!(vm.execute(function, &program, &[]).unwrap(), Value::Num(1));
    assert_eq!(vm.execute(function, &program, &[]).unwrap(), Value::Num(2));
    assert_eq!(vm.execute(function, &program, &[]).unwrap(), Value::Num(3));
}

#[test]
fn undefined_symbol_without_autodef_is_an_error() {
    let mut compiler = Compiler::new("define f() { return nosuch; }", CompilerConfig::default());
    let mut host = NullHost;
    let mut vm = Vm::new();
    compiler.run(&mut host, &mut vm);
    assert!(compiler.had_error());
}

#[test]
fn break_outside_loop_is_an_error() {
    let mut compiler = Compiler::new("break;", CompilerConfig::default());
    let function = compiler.compile_one();
    let _ = function;
    assert!(compiler.had_error());
}
