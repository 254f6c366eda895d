//! Expression parser: the full precedence ladder, from `exprlist` down to
//! `term`. The uniform binary levels (`sum`, `product`, `orexpr`,
//! `andexpr`, `shiftexpr`) dispatch through a small per-level operator
//! table; the non-uniform levels (short-circuit `&&`/`||`, the ternary,
//! the assignment chain, postfix chains) get dedicated methods instead —
//! a Pratt table buys nothing extra for levels that aren't simple
//! left-associative binary operators.
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::exprkind::ExprKind;
use crate::opcode::Opcode;
use crate::token::TokenKind;

impl<'a> Compiler<'a> {
    /// Ensures the top of stack is a value rather than an address,
    /// inserting `GETVALUE` exactly once.
    pub(crate) fn ensure_rvalue(&mut self, kind: ExprKind) -> ExprKind {
        if kind.contains(ExprKind::RVALUE) {
            kind
        } else {
            self.emit(Opcode::GetValue);
            kind | ExprKind::RVALUE
        }
    }

    /// `exprlist`: `e1, e2, …` — used inside `for(;;)` clauses and
    /// argument lists. Yields the kind of the last expression.
    pub(crate) fn expr_list(&mut self) -> Result<ExprKind, ()> {
        let mut kind = self.opassignment()?;
        while self.matches(TokenKind::Comma) {
            kind = self.ensure_rvalue(kind);
            self.emit(Opcode::Pop);
            kind = self.opassignment()?;
        }
        Ok(kind)
    }

    /// `opassign` / `assign`: parses one `altcond`-level operand, then
    /// handles a (possibly chained, right-associative) trailing `=` or
    /// compound-assignment operator.
    pub(crate) fn opassignment(&mut self) -> Result<ExprKind, ()> {
        let lhs_line = self.line();
        let lhs_kind = self.altcond()?;

        let arith_op = match self.current.kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(Opcode::Add),
            TokenKind::MinusAssign => Some(Opcode::Sub),
            TokenKind::StarAssign => Some(Opcode::Mul),
            TokenKind::SlashAssign => Some(Opcode::Div),
            TokenKind::SlashSlashAssign => Some(Opcode::Quo),
            TokenKind::PercentAssign => Some(Opcode::Mod),
            TokenKind::AmpersandAssign => Some(Opcode::And),
            TokenKind::PipeAssign => Some(Opcode::Or),
            TokenKind::LeftShiftAssign => Some(Opcode::LeftShift),
            TokenKind::RightShiftAssign => Some(Opcode::RightShift),
            TokenKind::CaretAssign => Some(Opcode::Power),
            TokenKind::HashAssign => Some(Opcode::HashOp),
            TokenKind::TildeAssign => Some(Opcode::Xor),
            TokenKind::BackslashAssign => Some(Opcode::SetMinus),
            _ => return Ok(lhs_kind),
        };
        let is_plain_assign = arith_op.is_none();

        if lhs_kind.is_lvalue() {
            self.mark_last_addressing_for_write();
        } else {
            self.error(CompileError::LvalueRequired { line: lhs_line });
        }
        self.advance(); // consume the '=' / op-assign token

        if is_plain_assign && self.check(TokenKind::LeftBrace) {
            self.parse_init_list_value()?;
            self.emit(Opcode::Assign);
            return Ok(ExprKind::ASSIGN | ExprKind::RVALUE);
        }

        if let Some(op) = arith_op {
            self.emit(Opcode::Duplicate);
            self.emit(Opcode::GetValue);
            let rhs_kind = self.opassignment()?;
            let rhs_kind = self.ensure_rvalue(rhs_kind);
            let _ = rhs_kind;
            self.emit(op);
        } else {
            let rhs_kind = self.opassignment()?;
            self.ensure_rvalue(rhs_kind);
        }
        self.emit(Opcode::Assign);
        Ok(ExprKind::ASSIGN | ExprKind::RVALUE)
    }

    /// Parses a `{ … }` initializer list as the right-hand side of an
    /// assignment into an already-addressed lvalue; delegates the actual
    /// brace structure to [`crate::decl`].
    fn parse_init_list_value(&mut self) -> Result<(), ()> {
        self.parse_initializer_list()
    }

    /// `altcond`: `cond ? a : b`, right-associative, short-circuit.
    pub(crate) fn altcond(&mut self) -> Result<ExprKind, ()> {
        let kind = self.orcond()?;
        if !self.matches(TokenKind::Question) {
            return Ok(kind);
        }
        let kind = self.ensure_rvalue(kind);
        let mut to_false = crate::label::Label::new();
        self.emit_jump(Opcode::JumpZ, &mut to_false);
        let true_kind = self.altcond()?;
        let true_kind = self.ensure_rvalue(true_kind);
        self.consume(TokenKind::Colon, "expected ':' in conditional expression");
        let mut to_done = crate::label::Label::new();
        self.emit_jump(Opcode::Jump, &mut to_done);
        self.define_label(&mut to_false);
        let false_kind = self.altcond()?;
        let false_kind = self.ensure_rvalue(false_kind);
        self.define_label(&mut to_done);
        Ok(kind | true_kind | false_kind)
    }

    /// `orcond`: left-assoc `||`, short-circuiting via `CondOrJump`.
    pub(crate) fn orcond(&mut self) -> Result<ExprKind, ()> {
        let mut kind = self.andcond()?;
        while self.matches(TokenKind::OrOr) {
            kind = self.ensure_rvalue(kind);
            let mut done = crate::label::Label::new();
            self.emit_jump(Opcode::CondOrJump, &mut done);
            let rhs = self.andcond()?;
            let rhs = self.ensure_rvalue(rhs);
            self.define_label(&mut done);
            kind = kind | rhs | ExprKind::RVALUE;
        }
        Ok(kind)
    }

    /// `andcond`: left-assoc `&&`, short-circuiting via `CondAndJump`.
    pub(crate) fn andcond(&mut self) -> Result<ExprKind, ()> {
        let mut kind = self.relation()?;
        while self.matches(TokenKind::AndAnd) {
            kind = self.ensure_rvalue(kind);
            let mut done = crate::label::Label::new();
            self.emit_jump(Opcode::CondAndJump, &mut done);
            let rhs = self.relation()?;
            let rhs = self.ensure_rvalue(rhs);
            self.define_label(&mut done);
            kind = kind | rhs | ExprKind::RVALUE;
        }
        Ok(kind)
    }

    /// `relation`: exactly one (non-chaining) comparison.
    pub(crate) fn relation(&mut self) -> Result<ExprKind, ()> {
        let lhs = self.sum()?;
        let op = match self.current.kind {
            TokenKind::EqEq => Opcode::Eq,
            TokenKind::NotEq => Opcode::Ne,
            TokenKind::Less => Opcode::Lt,
            TokenKind::Greater => Opcode::Gt,
            TokenKind::LessEq => Opcode::Le,
            TokenKind::GreaterEq => Opcode::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let lhs = self.ensure_rvalue(lhs);
        let rhs = self.sum()?;
        let rhs = self.ensure_rvalue(rhs);
        self.emit(op);
        Ok(lhs | rhs | ExprKind::RVALUE)
    }

    /// `sum`: left-assoc `+`/`-`, plus the unary prefix forms.
    pub(crate) fn sum(&mut self) -> Result<ExprKind, ()> {
        let mut kind = if self.matches(TokenKind::Plus) {
            let operand = self.sum()?;
            let operand = self.ensure_rvalue(operand);
            self.emit(Opcode::Plus);
            operand
        } else if self.matches(TokenKind::Minus) {
            let operand = self.sum()?;
            let operand = self.ensure_rvalue(operand);
            self.emit(Opcode::Negate);
            operand
        } else {
            self.product()?
        };
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => Opcode::Add,
                TokenKind::Minus => Opcode::Sub,
                _ => break,
            };
            self.advance();
            kind = self.ensure_rvalue(kind);
            let rhs = self.product()?;
            let rhs = self.ensure_rvalue(rhs);
            self.emit(op);
            kind = kind | rhs | ExprKind::RVALUE;
        }
        Ok(kind)
    }

    /// `product`: left-assoc `* / % //`.
    pub(crate) fn product(&mut self) -> Result<ExprKind, ()> {
        let mut kind = self.orexpr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => Opcode::Mul,
                TokenKind::Slash => Opcode::Div,
                TokenKind::Percent => Opcode::Mod,
                TokenKind::SlashSlash => Opcode::Quo,
                _ => break,
            };
            self.advance();
            kind = self.ensure_rvalue(kind);
            let rhs = self.orexpr()?;
            let rhs = self.ensure_rvalue(rhs);
            self.emit(op);
            kind = kind | rhs | ExprKind::RVALUE;
        }
        Ok(kind)
    }

    /// `orexpr`: left-assoc bitwise/set `|`.
    pub(crate) fn orexpr(&mut self) -> Result<ExprKind, ()> {
        let mut kind = self.andexpr()?;
        while self.matches(TokenKind::Pipe) {
            kind = self.ensure_rvalue(kind);
            let rhs = self.andexpr()?;
            let rhs = self.ensure_rvalue(rhs);
            self.emit(Opcode::Or);
            kind = kind | rhs | ExprKind::RVALUE;
        }
        Ok(kind)
    }

    /// `andexpr`: left-assoc `& # ~ \`.
    pub(crate) fn andexpr(&mut self) -> Result<ExprKind, ()> {
        let mut kind = self.shiftexpr()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Ampersand => Opcode::And,
                TokenKind::Hash => Opcode::HashOp,
                TokenKind::Tilde => Opcode::Xor,
                TokenKind::Backslash => Opcode::SetMinus,
                _ => break,
            };
            self.advance();
            kind = self.ensure_rvalue(kind);
            let rhs = self.shiftexpr()?;
            let rhs = self.ensure_rvalue(rhs);
            self.emit(op);
            kind = kind | rhs | ExprKind::RVALUE;
        }
        Ok(kind)
    }

    /// `shiftexpr`: unary prefix forms, then right-assoc `^ << >>`.
    pub(crate) fn shiftexpr(&mut self) -> Result<ExprKind, ()> {
        let kind = match self.current.kind {
            TokenKind::Bang => {
                self.advance();
                let operand = self.shiftexpr()?;
                let operand = self.ensure_rvalue(operand);
                self.emit(Opcode::Not);
                operand
            }
            TokenKind::Slash => {
                self.advance();
                let operand = self.shiftexpr()?;
                let operand = self.ensure_rvalue(operand);
                self.emit(Opcode::Invert);
                operand
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.shiftexpr()?;
                let operand = self.ensure_rvalue(operand);
                self.emit(Opcode::Comp);
                operand
            }
            TokenKind::Hash => {
                self.advance();
                let operand = self.shiftexpr()?;
                let operand = self.ensure_rvalue(operand);
                self.emit(Opcode::Content);
                operand
            }
            _ => self.reference()?,
        };
        if self.matches(TokenKind::Caret) {
            let kind = self.ensure_rvalue(kind);
            let rhs = self.shiftexpr()?; // right-assoc
            let rhs = self.ensure_rvalue(rhs);
            self.emit(Opcode::Power);
            return Ok(kind | rhs | ExprKind::RVALUE);
        }
        let op = match self.current.kind {
            TokenKind::LeftShift => Opcode::LeftShift,
            TokenKind::RightShift => Opcode::RightShift,
            _ => return Ok(kind),
        };
        self.advance();
        let kind = self.ensure_rvalue(kind);
        let rhs = self.shiftexpr()?; // right-assoc
        let rhs = self.ensure_rvalue(rhs);
        self.emit(op);
        Ok(kind | rhs | ExprKind::RVALUE)
    }

    /// `reference`: prefix `&` (address-of, requires an lvalue operand),
    /// `*`/`**` (dereference once/twice).
    pub(crate) fn reference(&mut self) -> Result<ExprKind, ()> {
        if self.matches(TokenKind::Ampersand) {
            let line = self.line();
            let operand = self.reference()?;
            if !operand.is_lvalue() {
                self.error(CompileError::LvalueRequired { line });
            }
            self.emit(Opcode::Ptr);
            return Ok(ExprKind::RVALUE);
        }
        if self.matches(TokenKind::Star) {
            let operand = self.reference()?;
            let operand = self.ensure_rvalue(operand);
            let _ = operand;
            self.emit(Opcode::Deref);
            return Ok(ExprKind::empty());
        }
        self.incdec()
    }

    /// `incdec`: prefix/postfix `++`/`--` (require an lvalue), postfix `!`
    /// (factorial, desugared to a builtin call; deliberately lenient about
    /// the operand, see DESIGN.md).
    pub(crate) fn incdec(&mut self) -> Result<ExprKind, ()> {
        if self.matches(TokenKind::PlusPlus) {
            let line = self.line();
            let operand = self.term()?;
            if !operand.is_lvalue() {
                self.error(CompileError::LvalueRequired { line });
            }
            self.mark_last_addressing_for_write();
            self.emit(Opcode::PreInc);
            return Ok(ExprKind::RVALUE);
        }
        if self.matches(TokenKind::MinusMinus) {
            let line = self.line();
            let operand = self.term()?;
            if !operand.is_lvalue() {
                self.error(CompileError::LvalueRequired { line });
            }
            self.mark_last_addressing_for_write();
            self.emit(Opcode::PreDec);
            return Ok(ExprKind::RVALUE);
        }

        let mut kind = self.term()?;
        loop {
            if self.matches(TokenKind::PlusPlus) {
                if kind.is_lvalue() {
                    self.mark_last_addressing_for_write();
                }
                self.emit(Opcode::PostInc);
                kind = ExprKind::RVALUE;
            } else if self.matches(TokenKind::MinusMinus) {
                if kind.is_lvalue() {
                    self.mark_last_addressing_for_write();
                }
                self.emit(Opcode::PostDec);
                kind = ExprKind::RVALUE;
            } else if self.matches(TokenKind::Bang) {
                kind = self.ensure_rvalue(kind);
                let fact_idx = self.builtins.find("fact").expect("fact is a builtin");
                self.emit2(Opcode::Call, fact_idx as i64, 1);
                kind = ExprKind::RVALUE;
            } else {
                break;
            }
        }
        Ok(kind)
    }

    /// `term`: literals, identifiers (+ call/subscript/field postfix
    /// chain), parenthesized expressions, `mat`/`obj` constructors.
    pub(crate) fn term(&mut self) -> Result<ExprKind, ()> {
        let kind = match self.current.kind {
            TokenKind::Number => {
                let text = self.current.text;
                self.advance();
                let value: i64 = text.parse().unwrap_or(0);
                let idx = self.constants.intern_number(value);
                self.emit1(Opcode::Number, idx as i64);
                ExprKind::RVALUE | ExprKind::CONST
            }
            TokenKind::ImaginaryNumber => {
                self.advance();
                self.emit(Opcode::Imaginary);
                ExprKind::RVALUE | ExprKind::CONST
            }
            TokenKind::String => {
                let text = self.current.text;
                self.advance();
                let trimmed = text.trim_matches('"');
                let idx = self.constants.intern_string(trimmed);
                self.emit1(Opcode::String, idx as i64);
                ExprKind::RVALUE | ExprKind::CONST
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expr_list()?;
                self.consume(TokenKind::RightParen, "expected ')'");
                inner
            }
            TokenKind::Mat => return self.parse_matrix_term(),
            TokenKind::Obj => return self.parse_object_term(),
            TokenKind::Symbol => {
                let name = self.current.text.to_string();
                self.advance();
                if self.matches(TokenKind::LeftParen) {
                    self.parse_call(&name)?
                } else {
                    self.use_symbol(&name, true)?
                }
            }
            _ => {
                self.error_at_current("expected expression".to_string());
                return Err(());
            }
        };
        self.postfix_chain(kind)
    }

    /// Chains `[…]`, `[[…]]`, `.field`, and `->field` after a primary.
    fn postfix_chain(&mut self, mut kind: ExprKind) -> Result<ExprKind, ()> {
        loop {
            if self.matches(TokenKind::LeftBracket) {
                if self.matches(TokenKind::LeftBracket) {
                    let index = self.opassignment()?;
                    let index = self.ensure_rvalue(index);
                    let _ = index;
                    self.consume(TokenKind::RightBracket, "expected ']'");
                    self.consume(TokenKind::RightBracket, "expected ']'");
                    self.emit(Opcode::FastIndexAddr);
                    kind = ExprKind::empty();
                    continue;
                }
                let mut dim = 0usize;
                loop {
                    let index = self.opassignment()?;
                    let index = self.ensure_rvalue(index);
                    let _ = index;
                    dim += 1;
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBracket, "expected ']'");
                self.emit_index_addr(dim);
                kind = ExprKind::empty();
            } else if self.matches(TokenKind::Dot) {
                let name = self.expect_symbol_text("expected field name after '.'")?;
                let idx = self.element_names.intern(&name);
                self.emit_elem_addr(idx);
                kind = ExprKind::empty();
            } else if self.matches(TokenKind::Arrow) {
                self.emit(Opcode::Deref);
                let name = self.expect_symbol_text("expected field name after '->'")?;
                let idx = self.element_names.intern(&name);
                self.emit_elem_addr(idx);
                kind = ExprKind::empty();
            } else {
                break;
            }
        }
        Ok(kind)
    }

    pub(crate) fn expect_symbol_text(&mut self, message: &str) -> Result<String, ()> {
        if !self.check(TokenKind::Symbol) {
            self.error_at_current(message.to_string());
            return Err(());
        }
        let text = self.current.text.to_string();
        self.advance();
        Ok(text)
    }

    /// Call arguments: `name(a1, a2, …)`. User functions dispatch via
    /// `UserCall`; unrecognized names fall back to the builtin table.
    fn parse_call(&mut self, name: &str) -> Result<ExprKind, ()> {
        let mut argc = 0usize;
        if !self.check(TokenKind::RightParen) {
            loop {
                let arg = self.opassignment()?;
                self.ensure_rvalue(arg);
                argc += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after call arguments");

        if let Some(idx) = self.user_funcs.find(name) {
            self.emit2(Opcode::UserCall, idx as i64, argc as i64);
        } else if let Some(idx) = self.builtins.find(name) {
            self.emit2(Opcode::Call, idx as i64, argc as i64);
        } else {
            self.error(CompileError::UndefinedSymbol {
                line: self.line(),
                name: name.to_string(),
            });
            return Err(());
        }
        Ok(ExprKind::RVALUE)
    }
}
