use std::io::Read;

use calcc::prelude::*;

/// Smoke-test CLI: compiles and runs a script file given as the first
/// argument, or reads the whole of stdin as one session otherwise.
fn main() {
    env_logger::init();

    let source = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).unwrap_or_else(|e| {
            eprintln!("calcc: cannot read '{path}': {e}");
            std::process::exit(1);
        }),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .expect("failed to read stdin");
            buf
        }
    };

    let mut compiler = Compiler::new(&source, CompilerConfig::default());
    let mut host = StdHost;
    let mut machine = Vm::new();
    compiler.run(&mut host, &mut machine);
}
