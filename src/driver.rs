//! Top-level driver: the read-command loop that dispatches `define`,
//! `undefine`, I/O directives, and interactive expression evaluation,
//! plus the `show` selector table.
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::label::Label;
use crate::opcode::{Function, Opcode};
use crate::symtab::SymbolTable;
use crate::token::{TokenKind, TokenMode};
use crate::vm::Machine;

/// The directive-execution contract left to an external collaborator
/// (file I/O, `cd`, `help`). A host that denies everything is a valid
/// implementation — see [`crate::compiler::CompilerConfig::allow_read`]/
/// `allow_write`, which gate whether these are even attempted.
pub trait Host {
    fn read_file(&mut self, path: &str) -> std::io::Result<String>;
    fn write_file(&mut self, path: &str, contents: &str) -> std::io::Result<()>;
    fn change_dir(&mut self, path: &str) -> std::io::Result<()>;
    fn help(&mut self, topic: Option<&str>);
}

/// A [`Host`] that performs no I/O; every operation fails. Useful for
/// tests that only care about the compiler's dispatch logic, not actual
/// file access.
#[derive(Debug, Default)]
pub struct NullHost;

impl Host for NullHost {
    fn read_file(&mut self, path: &str) -> std::io::Result<String> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("NullHost cannot read '{path}'"),
        ))
    }

    fn write_file(&mut self, _path: &str, _contents: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "NullHost cannot write"))
    }

    fn change_dir(&mut self, _path: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "NullHost cannot cd"))
    }

    fn help(&mut self, _topic: Option<&str>) {}
}

/// A [`Host`] backed by the real filesystem and working directory, used by
/// the CLI binary.
#[derive(Debug, Default)]
pub struct StdHost;

impl Host for StdHost {
    fn read_file(&mut self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&mut self, path: &str, contents: &str) -> std::io::Result<()> {
        std::fs::write(path, contents)
    }

    fn change_dir(&mut self, path: &str) -> std::io::Result<()> {
        std::env::set_current_dir(path)
    }

    fn help(&mut self, topic: Option<&str>) {
        match topic {
            Some(name) => println!("no help available for '{name}'"),
            None => println!("calc: a calculator/scripting language"),
        }
    }
}

/// Fixed, ordered `show` selector table; order and four-character
/// truncation both matter for matching. The list does *not* include
/// `opcodes`, which is special-cased below as "disassemble a named
/// user function" rather than a fixed display.
pub const SHOW_SELECTORS: &[&str] = &[
    "builtin",
    "realglobals",
    "functions",
    "objfunctions",
    "config",
    "objtypes",
    "files",
    "sizes",
    "errors",
    "custom",
    "blocks",
    "constants",
    "globaltypes",
    "statics",
    "numbers",
    "redcdata",
    "strings",
    "literals",
];

const OPCODES_SELECTOR: &str = "opcodes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowSelector {
    /// One of [`SHOW_SELECTORS`], by index.
    Fixed(usize),
    /// `show opcodes NAME` — disassemble a user function's own bytecode.
    UserFunction,
}

fn truncate4(s: &str) -> &str {
    match s.char_indices().nth(4) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Resolves a `show` selector word against [`SHOW_SELECTORS`] by matching
/// its first four characters. `None` is a soft failure: the caller prints
/// a usage banner and continues without raising the error counter.
pub fn resolve_show_selector(word: &str) -> Option<ShowSelector> {
    let prefix = truncate4(word);
    if prefix == truncate4(OPCODES_SELECTOR) {
        return Some(ShowSelector::UserFunction);
    }
    SHOW_SELECTORS
        .iter()
        .position(|name| truncate4(name) == prefix)
        .map(ShowSelector::Fixed)
}

/// One unit of top-level work.
enum Unit {
    Handled,
    Interactive(Function),
    Eof,
}

impl<'a> Compiler<'a> {
    /// Runs the full top-level loop until EOF, handling `define`,
    /// `undefine`, and I/O directives in-process and executing each
    /// interactive unit immediately against a bundled reference VM.
    /// Globals and the "old value" persist in `machine` across units,
    /// the way a REPL session would.
    pub fn run(&mut self, host: &mut impl Host, machine: &mut crate::vm::Vm) {
        loop {
            match self.next_unit(host) {
                Unit::Eof => break,
                Unit::Handled => continue,
                Unit::Interactive(function) => {
                    if self.had_error() {
                        for err in self.diagnostics.take() {
                            eprintln!("{err}");
                        }
                        continue;
                    }
                    let program = self.registries();
                    match machine.execute(&function, &program, &[]) {
                        Ok(_) => print!("{}", machine.take_output()),
                        Err(e) => eprintln!("runtime error: {e}"),
                    }
                }
            }
        }
    }

    /// Reads and dispatches exactly one top-level unit.
    fn next_unit(&mut self, host: &mut impl Host) -> Unit {
        let previous_mode = self.token_mode(TokenMode::Newlines);
        while self.matches(TokenKind::Newline) || self.matches(TokenKind::Semicolon) {}
        if self.check(TokenKind::Eof) {
            self.token_mode(previous_mode);
            return Unit::Eof;
        }

        match self.current.kind {
            TokenKind::Define => {
                self.token_mode(previous_mode);
                self.define_function();
                Unit::Handled
            }
            TokenKind::Undefine => {
                self.token_mode(previous_mode);
                self.undefine_directive();
                Unit::Handled
            }
            TokenKind::Help => {
                self.advance();
                let topic = if self.check(TokenKind::Symbol) {
                    let t = self.current.text.to_string();
                    self.advance();
                    Some(t)
                } else {
                    None
                };
                host.help(topic.as_deref());
                self.consume_statement_terminator();
                self.token_mode(previous_mode);
                Unit::Handled
            }
            TokenKind::Read => {
                self.advance();
                self.read_directive(host);
                self.token_mode(previous_mode);
                Unit::Handled
            }
            TokenKind::Write => {
                self.advance();
                self.write_directive(host);
                self.token_mode(previous_mode);
                Unit::Handled
            }
            TokenKind::Cd => {
                self.advance();
                self.cd_directive(host);
                self.token_mode(previous_mode);
                Unit::Handled
            }
            _ => {
                self.token_mode(previous_mode);
                Unit::Interactive(self.compile_interactive_unit())
            }
        }
    }

    /// `undefine name[, name]… | undefine *` — removes one or more user
    /// functions by name, or all of them with `*`; refuses to touch
    /// builtins.
    fn undefine_directive(&mut self) {
        self.advance();
        if self.matches(TokenKind::Star) {
            self.user_funcs.undefine_all();
            self.consume_statement_terminator();
            return;
        }
        loop {
            if self.check(TokenKind::Symbol) {
                let name = self.current.text.to_string();
                self.advance();
                if self.builtins.is_builtin(&name) {
                    self.error(CompileError::BuiltinNameCollision {
                        line: self.line(),
                        name,
                    });
                } else {
                    self.user_funcs.undefine(&name);
                }
            } else {
                self.error_at_current("expected a function name or '*'".to_string());
                break;
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume_statement_terminator();
    }

    fn read_directive(&mut self, host: &mut impl Host) {
        if !self.config.allow_read {
            self.error(CompileError::PermissionDenied { directive: "read" });
            self.consume_statement_terminator();
            return;
        }
        let once = if self.matches(TokenKind::Minus) {
            let _ = self.expect_symbol_text("expected 'once' after '-'");
            true
        } else {
            false
        };
        let previous_mode = self.token_mode(TokenMode::AllSyms);
        let Ok(path) = self.expect_symbol_text("expected a filename after 'read'") else {
            self.token_mode(previous_mode);
            return;
        };
        self.token_mode(previous_mode);

        if once && !self.read_once_files.insert(path.clone()) {
            self.consume_statement_terminator();
            return;
        }
        if self.lexer.include_depth() >= self.config.max_include_depth {
            self.error(CompileError::IncludeDepthExceeded);
            self.consume_statement_terminator();
            return;
        }
        match host.read_file(&path) {
            Ok(contents) => {
                // The include's text is leaked for the duration of this
                // compilation so the lexer's borrowed `&'a str` contract
                // holds without the driver owning an arena.
                let leaked: &'a str = Box::leak(contents.into_boxed_str());
                if self.lexer.push_include(leaked).is_err() {
                    self.error(CompileError::IncludeDepthExceeded);
                } else {
                    self.symtab.enter_file_scope();
                    self.advance();
                    loop {
                        match self.next_unit(host) {
                            Unit::Eof => break,
                            _ => continue,
                        }
                    }
                    self.symtab.exit_file_scope();
                    self.lexer.pop_include();
                    self.advance();
                }
            }
            Err(_) => self.error(CompileError::UnexpectedToken {
                line: self.line(),
                found: path,
                expected: "a readable file".to_string(),
            }),
        }
        self.consume_statement_terminator();
    }

    fn write_directive(&mut self, host: &mut impl Host) {
        if !self.config.allow_write {
            self.error(CompileError::PermissionDenied { directive: "write" });
            self.consume_statement_terminator();
            return;
        }
        let previous_mode = self.token_mode(TokenMode::AllSyms);
        let Ok(path) = self.expect_symbol_text("expected a filename after 'write'") else {
            self.token_mode(previous_mode);
            return;
        };
        self.token_mode(previous_mode);
        let _ = host.write_file(&path, "");
        self.consume_statement_terminator();
    }

    fn cd_directive(&mut self, host: &mut impl Host) {
        let previous_mode = self.token_mode(TokenMode::AllSyms);
        let dir = if self.check(TokenKind::Symbol) {
            let d = self.current.text.to_string();
            self.advance();
            Some(d)
        } else {
            None
        };
        self.token_mode(previous_mode);
        if let Some(dir) = dir {
            let _ = host.change_dir(&dir);
        }
        self.consume_statement_terminator();
    }

    /// Parses `name(p1[, p2 = default]…) { … }` or `name(...) = expr` and
    /// registers the result in [`crate::pool::UserFuncs`], replacing any
    /// prior definition of the same name.
    fn define_function(&mut self) {
        self.advance(); // 'define'
        let Ok(name) = self.expect_symbol_text("expected a function name after 'define'") else {
            return;
        };
        if self.builtins.is_builtin(&name) {
            self.error(CompileError::BuiltinNameCollision { line: self.line(), name });
            self.resync(crate::error::ResyncTo::Semicolon);
            return;
        }

        let saved = std::mem::replace(&mut self.function, Function::new(&name));
        self.symtab.enter_func_scope();
        self.labels.reset_named();

        self.consume(TokenKind::LeftParen, "expected '(' after function name");
        let mut param_count = 0usize;
        if !self.check(TokenKind::RightParen) {
            loop {
                let Ok(pname) = self.expect_symbol_text("expected parameter name") else {
                    break;
                };
                let slot = self.symtab.add_param(&pname);
                param_count += 1;
                if self.matches(TokenKind::Assign) {
                    self.emit1(Opcode::ParamAddr, slot as i64);
                    let mut have = Label::new();
                    self.emit_jump(Opcode::JumpNn, &mut have);
                    if let Ok(kind) = self.opassignment() {
                        self.ensure_rvalue(kind);
                    }
                    self.emit(Opcode::AssignPop);
                    self.define_label(&mut have);
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameter list");
        self.function.param_count = param_count;

        if self.matches(TokenKind::Assign) {
            if let Ok(kind) = self.opassignment() {
                self.ensure_rvalue(kind);
            }
            self.emit(Opcode::Return);
            self.consume_statement_terminator();
        } else if self.check(TokenKind::LeftBrace) {
            let _ = self.statement();
            self.emit(Opcode::Undef);
            self.emit(Opcode::Return);
        } else {
            self.error_at_current("expected '=' or '{' in function definition".to_string());
        }

        self.function.local_count = self.symtab.exit_func_scope();
        for label in self.labels.undefined_named_labels().map(str::to_string).collect::<Vec<_>>() {
            self.error(CompileError::UndefinedLabel { line: self.line(), label });
        }

        let completed = std::mem::replace(&mut self.function, saved);
        if !self.had_error() {
            self.user_funcs.define(completed);
        }
    }

    /// Compiles the whole source as a single interactive unit, skipping
    /// directive dispatch. Exposed for tests that just want "compile this
    /// snippet and run it" without a [`Host`].
    #[doc(hidden)]
    pub fn compile_one(&mut self) -> Function {
        self.compile_interactive_unit()
    }

    /// Compiles one interactive line (or `{ … }` block) into the
    /// anonymous pseudo-function `*`: only this path auto-defines
    /// globals, emits `PRINTRESULT`, and saves the last value.
    fn compile_interactive_unit(&mut self) -> Function {
        let saved = std::mem::replace(&mut self.function, Function::new("*"));
        self.symtab.enter_func_scope();
        self.labels.reset_named();

        if self.check(TokenKind::LeftBrace) {
            let _ = self.statement();
        } else {
            let _ = self.declaration();
        }
        self.emit(Opcode::Undef);
        self.emit(Opcode::Return);

        self.function.local_count = self.symtab.exit_func_scope();
        std::mem::replace(&mut self.function, saved)
    }
}
