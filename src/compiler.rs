//! The compiler context tying together the lexer, symbol resolver, label
//! manager, constant/object/function registries, and the function
//! currently under construction as explicit, passed-around state rather
//! than globals.
//!
//! The grammar itself (expressions, statements, declarators, the
//! top-level driver) lives in sibling modules as further `impl<'a>
//! Compiler<'a>` blocks — every parsing rule is a method on one
//! `Compiler` rather than split into a separate type per nonterminal.
use crate::error::{CompileError, Diagnostics, ResyncTo};
use crate::exprkind::ExprKind;
use crate::label::{Label, LabelManager};
use crate::lexer::Lexer;
use crate::opcode::{Function, Opcode};
use crate::pool::{Builtins, ConstantPool, ElementNames, ObjectTypes, UserFuncs};
use crate::symtab::{SymbolTable, Symtab};
use crate::token::{Token, TokenKind, TokenMode};

/// Tunables threaded through the driver as a plain, explicitly passed
/// struct rather than installed-once global state.
#[derive(Debug, Clone, Copy)]
pub struct CompilerConfig {
    pub allow_read: bool,
    pub allow_write: bool,
    pub max_include_depth: usize,
    pub max_call_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            allow_read: true,
            allow_write: true,
            max_include_depth: 10,
            max_call_depth: 64,
        }
    }
}

/// The labels live for the lifetime of one function body; `loop_labels`
/// tracks the enclosing `(continue, break)` pair and `switch_labels` the
/// enclosing `(next_case, default)` pair.
#[derive(Debug, Clone, Copy)]
pub struct LoopContext {
    pub cont: Option<Label>,
    pub brk: Option<Label>,
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchContext {
    pub next_case: Label,
    pub default: Option<Label>,
}

pub struct Compiler<'a> {
    pub(crate) lexer: Lexer<'a>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) symtab: Symtab,
    pub(crate) labels: LabelManager,
    pub(crate) constants: ConstantPool,
    pub(crate) element_names: ElementNames,
    pub(crate) object_types: ObjectTypes,
    pub(crate) user_funcs: UserFuncs,
    pub(crate) builtins: Builtins,
    pub(crate) config: CompilerConfig,

    pub(crate) current: Token<'a>,
    pub(crate) previous: Token<'a>,

    pub(crate) function: Function,
    pub(crate) last_write_slot: Option<usize>,
    pub(crate) call_depth: usize,
    pub(crate) loop_stack: Vec<LoopContext>,
    pub(crate) switch_stack: Vec<SwitchContext>,
    /// Filenames already pulled in by a `read -once`, so repeats are
    /// silently skipped.
    pub(crate) read_once_files: std::collections::HashSet<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a str, config: CompilerConfig) -> Self {
        let max_depth = config.max_include_depth;
        let mut compiler = Compiler {
            lexer: Lexer::new(source, max_depth),
            diagnostics: Diagnostics::new(),
            symtab: Symtab::new(),
            labels: LabelManager::new(),
            constants: ConstantPool::new(),
            element_names: ElementNames::new(),
            object_types: ObjectTypes::new(),
            user_funcs: UserFuncs::new(),
            builtins: Builtins::new(),
            config,
            current: Token::new(TokenKind::Eof, "", 0),
            previous: Token::new(TokenKind::Eof, "", 0),
            function: Function::new("*"),
            last_write_slot: None,
            call_depth: 0,
            loop_stack: Vec::new(),
            switch_stack: Vec::new(),
            read_once_files: std::collections::HashSet::new(),
        };
        compiler.advance();
        compiler
    }

    pub fn had_error(&self) -> bool {
        self.diagnostics.had_error()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_function(self) -> Function {
        self.function
    }

    // --- token stream helpers -------------------------------------------------

    pub(crate) fn line(&self) -> u32 {
        self.previous.line
    }

    pub(crate) fn token_mode(&mut self, mode: TokenMode) -> TokenMode {
        self.lexer.token_mode(mode)
    }

    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.text.to_string());
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    /// Accepts any of `;`, a newline-mode-only statement terminator, or a
    /// closing brace, without consuming the brace.
    pub(crate) fn consume_statement_terminator(&mut self) {
        if self.matches(TokenKind::Semicolon) || self.matches(TokenKind::Newline) {
            return;
        }
        if self.check(TokenKind::RightBrace) || self.check(TokenKind::Eof) {
            return;
        }
        self.error_at_current("expected ';' or newline".to_string());
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: impl Into<String>) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message.into());
    }

    pub(crate) fn error_at_current(&mut self, detail: String) {
        self.diagnostics.emit(CompileError::UnexpectedToken {
            line: self.current.line,
            found: self.current.text.to_string(),
            expected: detail,
        });
    }

    pub(crate) fn error(&mut self, err: CompileError) {
        self.diagnostics.emit(err);
    }

    /// Resyncs the token stream to the requested delimiter after an error,
    /// so the rest of the function can still be parsed and later errors
    /// reported.
    pub(crate) fn resync(&mut self, to: ResyncTo) {
        let target = match to {
            ResyncTo::Nothing => return,
            ResyncTo::Comma => TokenKind::Comma,
            ResyncTo::Semicolon => TokenKind::Semicolon,
        };
        while !self.check(target) && !self.check(TokenKind::Eof) {
            self.advance();
        }
    }

    // --- emission --------------------------------------------------------------

    pub(crate) fn emit(&mut self, op: Opcode) {
        crate::emitter::Emitter::new(&mut self.function, self.line()).emit(op);
    }

    pub(crate) fn emit1(&mut self, op: Opcode, imm: i64) -> usize {
        crate::emitter::Emitter::new(&mut self.function, self.line()).emit1(op, imm)
    }

    pub(crate) fn emit2(&mut self, op: Opcode, imm1: i64, imm2: i64) -> (usize, usize) {
        crate::emitter::Emitter::new(&mut self.function, self.line()).emit2(op, imm1, imm2)
    }

    pub(crate) fn emit_jump(&mut self, op: Opcode, label: &mut Label) -> usize {
        crate::emitter::Emitter::new(&mut self.function, self.line())
            .emit_jump(&self.labels, op, label)
    }

    pub(crate) fn define_label(&mut self, label: &mut Label) {
        crate::emitter::Emitter::new(&mut self.function, self.line())
            .define_label(&self.labels, label);
    }

    pub(crate) fn current_offset(&self) -> usize {
        self.function.current_offset()
    }

    /// `IndexAddr` carries a write flag initially `0`, flipped to `1` by a
    /// later lvalue context via [`Compiler::mark_last_addressing_for_write`].
    pub(crate) fn emit_index_addr(&mut self, dim: usize) {
        let (_dim_slot, write_slot) = self.emit2(Opcode::IndexAddr, dim as i64, 0);
        self.last_write_slot = Some(write_slot);
    }

    pub(crate) fn emit_elem_addr(&mut self, field: usize) {
        let slot = self.emit1(Opcode::ElemAddr, field as i64);
        self.last_write_slot = Some(slot);
    }

    /// Flips the most recently emitted `IndexAddr`/`ElemAddr` write-flag,
    /// implementing the retroactive lvalue patch.
    pub(crate) fn mark_last_addressing_for_write(&mut self) {
        if let Some(slot) = self.last_write_slot.take() {
            crate::emitter::Emitter::new(&mut self.function, self.line()).patch_word(slot, 1);
        }
    }

    pub(crate) fn clear_addressing_mark(&mut self) {
        self.last_write_slot = None;
    }

    // --- symbol helpers ----------------------------------------------------

    /// Resolves `name` to an address opcode, applying the autodef rule for
    /// the interactive pseudo-function.
    pub(crate) fn use_symbol(&mut self, name: &str, autodef: bool) -> Result<ExprKind, ()> {
        use crate::symtab::SymbolKind::*;
        match self.symtab.classify(name) {
            Local => {
                let slot = self.symtab.find_local(name).unwrap();
                self.emit1(Opcode::LocalAddr, slot as i64);
                Ok(ExprKind::empty())
            }
            Param => {
                let slot = self.symtab.find_param(name).unwrap();
                self.emit1(Opcode::ParamAddr, slot as i64);
                Ok(ExprKind::empty())
            }
            Global | Static => {
                let handle = self.symtab.find_global(name).unwrap();
                self.emit1(Opcode::GlobalAddr, handle as i64);
                Ok(ExprKind::empty())
            }
            Undefined => {
                if self.function.is_interactive() && autodef {
                    let handle = self.symtab.add_global(name, false);
                    self.emit1(Opcode::GlobalAddr, handle as i64);
                    Ok(ExprKind::empty())
                } else {
                    self.error(CompileError::UndefinedSymbol {
                        line: self.line(),
                        name: name.to_string(),
                    });
                    Err(())
                }
            }
        }
    }
}
