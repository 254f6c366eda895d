//! Statement parser: control flow, declarations, I/O statements, and the
//! loop/switch label plumbing.
use crate::compiler::{Compiler, LoopContext, SwitchContext};
use crate::decl::DeclKind;
use crate::error::CompileError;
use crate::label::Label;
use crate::opcode::Opcode;
use crate::symtab::SymbolTable;
use crate::token::{TokenKind, TokenMode};

impl<'a> Compiler<'a> {
    /// Parses one declaration-or-statement, consuming its terminator.
    pub(crate) fn declaration(&mut self) -> Result<(), ()> {
        let result = match self.current.kind {
            TokenKind::Local => {
                self.advance();
                self.parse_var_decl(DeclKind::Local)
            }
            TokenKind::Global => {
                self.advance();
                self.parse_var_decl(DeclKind::Global)
            }
            TokenKind::Static => {
                self.advance();
                self.parse_var_decl(DeclKind::Static)
            }
            _ => self.statement(),
        };
        if result.is_err() {
            self.resync(crate::error::ResyncTo::Semicolon);
        }
        result
    }

    fn parse_var_decl(&mut self, kind: DeclKind) -> Result<(), ()> {
        let result = if self.check(TokenKind::Mat) {
            self.advance();
            self.parse_mat_declaration(kind)
        } else if self.check(TokenKind::Obj) {
            self.advance();
            self.parse_obj_declaration(kind)
        } else {
            loop {
                let name = self.expect_symbol_text("expected variable name")?;
                if kind == DeclKind::Static {
                    self.parse_static_scalar(&name)?;
                } else {
                    self.declare_and_address(&name, kind);
                    if self.matches(TokenKind::Assign) {
                        let rhs = self.opassignment()?;
                        self.ensure_rvalue(rhs);
                        self.emit(Opcode::Assign);
                    }
                    self.emit(Opcode::Pop);
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            Ok(())
        };
        self.consume_statement_terminator();
        result
    }

    /// `static x = expr;` only runs its initializer the first time the
    /// enclosing function executes; every later call must skip straight
    /// past it. Guarded with an `InitStatic`+`JumpZ` idiom rather than
    /// running the initializer unconditionally on every call.
    fn parse_static_scalar(&mut self, name: &str) -> Result<(), ()> {
        let handle = self.symtab.add_global(name, true);
        if self.matches(TokenKind::Assign) {
            self.emit1(Opcode::InitStatic, handle as i64);
            let mut already_initialized = Label::new();
            self.emit_jump(Opcode::JumpZ, &mut already_initialized);
            self.emit1(Opcode::GlobalAddr, handle as i64);
            let rhs = self.opassignment()?;
            self.ensure_rvalue(rhs);
            self.emit(Opcode::AssignPop);
            self.define_label(&mut already_initialized);
        } else {
            self.emit1(Opcode::InitStatic, handle as i64);
            self.emit(Opcode::Pop);
        }
        Ok(())
    }

    pub(crate) fn statement(&mut self) -> Result<(), ()> {
        // One-character lookahead for `name:` label definitions: only
        // tried at a bare symbol in statement position.
        if self.check(TokenKind::Symbol) && self.lexer.peek_char_is_colon() {
            let name = self.current.text.to_string();
            self.advance(); // symbol
            self.advance(); // colon
            let mut label = std::mem::take(self.labels.named_label(&name));
            self.define_label(&mut label);
            *self.labels.named_label(&name) = label;
            return self.statement();
        }

        match self.current.kind {
            TokenKind::LeftBrace => self.block_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Do => self.do_while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Switch => self.switch_statement(),
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            TokenKind::Goto => self.goto_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Print => self.print_statement(),
            TokenKind::Quit => self.quit_or_abort_statement(Opcode::Quit),
            TokenKind::Abort => self.quit_or_abort_statement(Opcode::Abort),
            TokenKind::Show => self.show_statement(),
            TokenKind::Case => self.case_label(),
            TokenKind::Default => self.default_label(),
            TokenKind::Semicolon | TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            _ => self.expression_statement(),
        }
    }

    fn block_statement(&mut self) -> Result<(), ()> {
        self.advance(); // '{'
        self.symtab.begin_scope();
        let mut result = Ok(());
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if self.declaration().is_err() {
                result = Err(());
            }
        }
        self.consume(TokenKind::RightBrace, "expected '}'");
        let popped = self.symtab.end_scope();
        for _ in 0..popped {
            self.emit(Opcode::Pop);
        }
        result
    }

    fn if_statement(&mut self) -> Result<(), ()> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'if'");
        let cond = self.expr_list()?;
        self.ensure_rvalue(cond);
        self.consume(TokenKind::RightParen, "expected ')' after condition");

        let mut to_else = Label::new();
        self.emit_jump(Opcode::JumpZ, &mut to_else);
        self.statement()?;
        if self.matches(TokenKind::Else) {
            let mut to_end = Label::new();
            self.emit_jump(Opcode::Jump, &mut to_end);
            self.define_label(&mut to_else);
            self.statement()?;
            self.define_label(&mut to_end);
        } else {
            self.define_label(&mut to_else);
        }
        Ok(())
    }

    fn while_statement(&mut self) -> Result<(), ()> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'");
        let mut cond_label = Label::new();
        self.define_label(&mut cond_label);
        let cond = self.expr_list()?;
        self.ensure_rvalue(cond);
        self.consume(TokenKind::RightParen, "expected ')' after condition");

        let mut brk = Label::new();
        self.emit_jump(Opcode::JumpZ, &mut brk);
        self.loop_stack.push(LoopContext {
            cont: Some(cond_label),
            brk: Some(brk),
        });
        let body_result = self.statement();
        let ctx = self.loop_stack.pop().unwrap();
        let mut cond_label = ctx.cont.unwrap();
        let mut brk = ctx.brk.unwrap();
        self.emit_jump(Opcode::Jump, &mut cond_label);
        self.define_label(&mut brk);
        body_result
    }

    fn do_while_statement(&mut self) -> Result<(), ()> {
        self.advance();
        let mut top = Label::new();
        self.define_label(&mut top);
        let mut cont = Label::new();
        let mut brk = Label::new();
        self.loop_stack.push(LoopContext {
            cont: Some(cont),
            brk: Some(brk),
        });
        let body_result = self.statement();
        let ctx = self.loop_stack.pop().unwrap();
        cont = ctx.cont.unwrap();
        brk = ctx.brk.unwrap();
        self.define_label(&mut cont);

        if !self.matches(TokenKind::While) {
            self.error(CompileError::MissingWhileAfterDo { line: self.line() });
            return Err(());
        }
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'");
        let cond = self.expr_list()?;
        self.ensure_rvalue(cond);
        self.consume(TokenKind::RightParen, "expected ')' after condition");
        self.emit_jump(Opcode::JumpNz, &mut top);
        self.define_label(&mut brk);
        body_result
    }

    fn for_statement(&mut self) -> Result<(), ()> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'for'");
        self.symtab.begin_scope();

        if !self.check(TokenKind::Semicolon) {
            let init = self.expr_list()?;
            self.ensure_rvalue(init);
            self.emit(Opcode::Pop);
        }
        self.consume(TokenKind::Semicolon, "expected ';' after for-init");

        let mut cond_label = Label::new();
        self.define_label(&mut cond_label);
        let mut brk = Label::new();
        if !self.check(TokenKind::Semicolon) {
            let cond = self.expr_list()?;
            self.ensure_rvalue(cond);
            self.emit_jump(Opcode::JumpZ, &mut brk);
        }
        self.consume(TokenKind::Semicolon, "expected ';' after for-condition");

        let mut body_label = Label::new();
        self.emit_jump(Opcode::Jump, &mut body_label);

        let mut step_label = Label::new();
        self.define_label(&mut step_label);
        if !self.check(TokenKind::RightParen) {
            let step = self.expr_list()?;
            self.ensure_rvalue(step);
            self.emit(Opcode::Pop);
        }
        self.emit_jump(Opcode::Jump, &mut cond_label);
        self.consume(TokenKind::RightParen, "expected ')' after for-clauses");

        self.define_label(&mut body_label);
        self.loop_stack.push(LoopContext {
            cont: Some(step_label),
            brk: Some(brk),
        });
        let body_result = self.statement();
        let ctx = self.loop_stack.pop().unwrap();
        let mut step_label = ctx.cont.unwrap();
        let mut brk = ctx.brk.unwrap();
        self.emit_jump(Opcode::Jump, &mut step_label);
        self.define_label(&mut brk);

        let popped = self.symtab.end_scope();
        for _ in 0..popped {
            self.emit(Opcode::Pop);
        }
        body_result
    }

    fn switch_statement(&mut self) -> Result<(), ()> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'switch'");
        let cond = self.expr_list()?;
        self.ensure_rvalue(cond);
        self.consume(TokenKind::RightParen, "expected ')' after switch value");

        let mut first_case = Label::new();
        self.emit_jump(Opcode::Jump, &mut first_case);

        self.switch_stack.push(SwitchContext {
            next_case: first_case,
            default: None,
        });
        // `switch` overrides `break`/`next_case`/`default` but leaves
        // `continue` targeting the enclosing loop, if any.
        let enclosing_cont = self.loop_stack.last().and_then(|c| c.cont);
        self.loop_stack.push(LoopContext {
            cont: enclosing_cont,
            brk: None,
        });
        let mut brk = Label::new();
        self.loop_stack.last_mut().unwrap().brk = Some(brk);

        let body_result = self.statement();

        let loop_ctx = self.loop_stack.pop().unwrap();
        brk = loop_ctx.brk.unwrap();
        // `loop_ctx.cont` is the enclosing loop's label threaded through a
        // copy; any `continue` inside the switch chained onto that copy, so
        // write it back before the enclosing loop defines the real one.
        if let Some(cont) = loop_ctx.cont {
            if let Some(parent) = self.loop_stack.last_mut() {
                parent.cont = Some(cont);
            }
        }
        let switch_ctx = self.switch_stack.pop().unwrap();
        let mut next_case = switch_ctx.next_case;

        self.emit_jump(Opcode::Jump, &mut brk);
        self.define_label(&mut next_case);
        if let Some(mut default) = switch_ctx.default {
            self.emit_jump(Opcode::Jump, &mut default);
        } else {
            self.emit(Opcode::Pop);
        }
        self.define_label(&mut brk);
        body_result
    }

    /// `case expr:` chains through the enclosing switch's `next_case`
    /// label.
    fn case_label(&mut self) -> Result<(), ()> {
        if self.switch_stack.is_empty() {
            self.error(CompileError::MisplacedKeyword {
                line: self.line(),
                keyword: "case",
                context: "switch",
            });
            return Err(());
        }
        self.advance();
        let mut past_case = Label::new();
        self.emit_jump(Opcode::Jump, &mut past_case);

        let mut ctx = self.switch_stack.pop().unwrap();
        self.define_label(&mut ctx.next_case);
        ctx.next_case = Label::new();

        let value = self.opassignment()?;
        self.ensure_rvalue(value);
        self.emit_jump(Opcode::CaseJump, &mut ctx.next_case);
        self.define_label(&mut past_case);
        self.switch_stack.push(ctx);

        self.consume(TokenKind::Colon, "expected ':' after case value");
        Ok(())
    }

    fn default_label(&mut self) -> Result<(), ()> {
        let Some(ctx) = self.switch_stack.last_mut() else {
            self.error(CompileError::MisplacedKeyword {
                line: self.line(),
                keyword: "default",
                context: "switch",
            });
            return Err(());
        };
        if ctx.default.is_some() {
            self.error(CompileError::DuplicateDefault { line: self.line() });
        }
        self.advance();
        let mut past = Label::new();
        self.emit_jump(Opcode::Jump, &mut past);
        let mut default = Label::new();
        self.define_label(&mut default);
        self.emit(Opcode::Pop);
        self.define_label(&mut past);
        self.switch_stack.last_mut().unwrap().default = Some(default);
        self.consume(TokenKind::Colon, "expected ':' after 'default'");
        Ok(())
    }

    fn break_statement(&mut self) -> Result<(), ()> {
        self.advance();
        let Some(mut brk) = self.loop_stack.last().and_then(|c| c.brk) else {
            self.error(CompileError::MisplacedKeyword {
                line: self.line(),
                keyword: "break",
                context: "loop or switch",
            });
            self.consume_statement_terminator();
            return Err(());
        };
        self.emit_jump(Opcode::Jump, &mut brk);
        self.loop_stack.last_mut().unwrap().brk = Some(brk);
        self.consume_statement_terminator();
        Ok(())
    }

    fn continue_statement(&mut self) -> Result<(), ()> {
        self.advance();
        let Some(mut cont) = self.loop_stack.last().and_then(|c| c.cont) else {
            self.error(CompileError::MisplacedKeyword {
                line: self.line(),
                keyword: "continue",
                context: "loop",
            });
            self.consume_statement_terminator();
            return Err(());
        };
        self.emit_jump(Opcode::Jump, &mut cont);
        self.loop_stack.last_mut().unwrap().cont = Some(cont);
        self.consume_statement_terminator();
        Ok(())
    }

    fn goto_statement(&mut self) -> Result<(), ()> {
        self.advance();
        let name = self.expect_symbol_text("expected label name after 'goto'")?;
        let mut label = std::mem::take(self.labels.named_label(&name));
        self.emit_jump(Opcode::Jump, &mut label);
        *self.labels.named_label(&name) = label;
        self.consume_statement_terminator();
        Ok(())
    }

    fn return_statement(&mut self) -> Result<(), ()> {
        self.advance();
        if self.check(TokenKind::Semicolon) || self.check(TokenKind::Newline) {
            self.emit(Opcode::Undef);
        } else {
            let kind = self.expr_list()?;
            self.ensure_rvalue(kind);
        }
        if self.function.is_interactive() {
            self.emit(Opcode::Save);
        }
        self.emit(Opcode::Return);
        self.consume_statement_terminator();
        Ok(())
    }

    fn print_statement(&mut self) -> Result<(), ()> {
        self.advance();
        if self.check(TokenKind::Semicolon) || self.check(TokenKind::Newline) {
            self.emit(Opcode::PrintEol);
            self.consume_statement_terminator();
            return Ok(());
        }
        loop {
            if self.check(TokenKind::String) {
                let text = self.current.text.trim_matches('"').to_string();
                self.advance();
                let idx = self.constants.intern_string(&text);
                self.emit1(Opcode::PrintString, idx as i64);
            } else {
                let kind = self.opassignment()?;
                self.ensure_rvalue(kind);
                self.emit1(Opcode::Print, 0);
            }
            if self.matches(TokenKind::Comma) {
                self.emit(Opcode::PrintSpace);
                continue;
            }
            break;
        }
        self.consume_statement_terminator();
        Ok(())
    }

    fn quit_or_abort_statement(&mut self, op: Opcode) -> Result<(), ()> {
        self.advance();
        let idx = if self.check(TokenKind::String) {
            let text = self.current.text.trim_matches('"').to_string();
            self.advance();
            self.constants.intern_string(&text) as i64
        } else {
            -1
        };
        self.emit1(op, idx);
        self.consume_statement_terminator();
        Ok(())
    }

    fn show_statement(&mut self) -> Result<(), ()> {
        self.advance();
        let previous_mode = self.token_mode(TokenMode::AllSyms);
        let word = self.expect_symbol_text("expected a 'show' selector")?;
        self.token_mode(previous_mode);

        match crate::driver::resolve_show_selector(&word) {
            Some(crate::driver::ShowSelector::UserFunction) => {
                let name = self.expect_symbol_text("expected a function name")?;
                let idx = self.user_funcs.find(&name).unwrap_or_else(|| self.user_funcs.define(crate::opcode::Function::new(&name)));
                self.emit1(Opcode::Show, (crate::driver::SHOW_SELECTORS.len() + idx) as i64);
            }
            Some(crate::driver::ShowSelector::Fixed(n)) => {
                self.emit1(Opcode::Show, n as i64);
            }
            None => {
                log::debug!("unrecognized show selector '{word}', ignoring");
            }
        }
        self.consume_statement_terminator();
        Ok(())
    }

    fn expression_statement(&mut self) -> Result<(), ()> {
        let kind = self.expr_list()?;
        let kind = self.ensure_rvalue(kind);
        let interactive_top_level = self.function.is_interactive() && self.loop_stack.is_empty();

        if !interactive_top_level {
            self.emit(Opcode::Pop);
        } else {
            self.emit(Opcode::Save);
            if kind.contains(crate::exprkind::ExprKind::ASSIGN) {
                self.emit(Opcode::Pop);
            } else {
                self.emit(Opcode::PrintResult);
            }
        }
        self.consume_statement_terminator();
        Ok(())
    }
}
