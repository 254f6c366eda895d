//! Matrix and object declarator parsing: `mat`/`obj` declarations, inline
//! `mat`/`obj` expression terms, and brace initializer lists.
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::exprkind::ExprKind;
use crate::opcode::Opcode;
use crate::symtab::SymbolTable;
use crate::token::TokenKind;

/// Where a declared name's storage lives; chosen by the statement-level
/// `local`/`global`/`static` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Local,
    Global,
    Static,
}

const MAXDIM: usize = 4;

impl<'a> Compiler<'a> {
    /// Declares `name` per `kind` and emits the address opcode for it,
    /// ready for a construction sequence to be assigned into.
    pub(crate) fn declare_and_address(&mut self, name: &str, kind: DeclKind) {
        match kind {
            DeclKind::Local => match self.symtab.add_local(name) {
                Ok(slot) => {
                    self.emit1(Opcode::LocalAddr, slot as i64);
                }
                Err(e) => self.error(e),
            },
            DeclKind::Global => {
                let handle = self.symtab.add_global(name, false);
                self.emit1(Opcode::GlobalAddr, handle as i64);
            }
            DeclKind::Static => {
                let handle = self.symtab.add_global(name, true);
                self.emit1(Opcode::GlobalAddr, handle as i64);
            }
        }
    }

    /// `mat name[dim1[:dim2], …] [= initlist]…` (statement form).
    pub(crate) fn parse_mat_declaration(&mut self, kind: DeclKind) -> Result<(), ()> {
        loop {
            let name = self.expect_symbol_text("expected matrix name")?;
            self.declare_and_address(&name, kind);
            self.parse_matrix_bounds_and_create()?;
            self.emit(Opcode::AssignPop);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(())
    }

    /// `mat[dim1, …] [= initlist]` used as an expression term.
    pub(crate) fn parse_matrix_term(&mut self) -> Result<ExprKind, ()> {
        self.advance(); // consume 'mat'
        self.parse_matrix_bounds_and_create()?;
        Ok(ExprKind::RVALUE)
    }

    /// Parses the `[…]` bound list (or an omitted, initializer-counted
    /// `[]`) and emits the `MATCREATE`/`INITFILL` sequence.
    fn parse_matrix_bounds_and_create(&mut self) -> Result<(), ()> {
        self.consume(TokenKind::LeftBracket, "expected '[' in matrix declaration");

        if self.check(TokenKind::RightBracket) {
            self.advance();
            // Bounds are implicit: placeholder count, back-patched once the
            // trailing initializer list's length is known.
            let count_slot = self.emit1(Opcode::Number, -1);
            self.emit(Opcode::Zero);
            self.emit1(Opcode::MatCreate, 1);
            self.emit(Opcode::Zero);
            self.emit(Opcode::InitFill);
            if self.check(TokenKind::Assign) {
                self.advance();
                let count = self.parse_initializer_list_counted()?;
                // Bounds are inclusive [0, hi], so hi = count - 1 gives exactly
                // `count` cells. NUMBER's operand is a constant-pool index, not
                // the literal value, so the bound itself must be interned.
                let hi = count.saturating_sub(1) as i64;
                let hi_idx = self.constants.intern_number(hi) as i64;
                crate::emitter::Emitter::new(&mut self.function, self.line())
                    .patch_word(count_slot, hi_idx);
            }
            return Ok(());
        }

        let mut dim = 0usize;
        loop {
            if dim >= MAXDIM {
                self.error(CompileError::TooManyDimensions {
                    line: self.line(),
                    max: MAXDIM,
                });
                return Err(());
            }
            let lo_hi = self.opassignment()?;
            self.ensure_rvalue(lo_hi);
            if self.matches(TokenKind::Colon) {
                let hi = self.opassignment()?;
                self.ensure_rvalue(hi);
            } else {
                self.emit(Opcode::One);
                self.emit(Opcode::Sub);
                self.emit(Opcode::Zero);
            }
            dim += 1;
            if self.check(TokenKind::LeftBracket) {
                self.advance();
                continue;
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBracket, "expected ']' in matrix declaration");
        self.emit1(Opcode::MatCreate, dim as i64);
        self.emit(Opcode::Zero);
        self.emit(Opcode::InitFill);

        while self.matches(TokenKind::Assign) {
            self.parse_initializer_list()?;
        }
        Ok(())
    }

    /// `obj Type { f1, f2, … }` registers the type; `obj Type var[, var]…`
    /// declares variables of a previously-registered type.
    pub(crate) fn parse_obj_declaration(&mut self, kind: DeclKind) -> Result<(), ()> {
        let type_name = self.expect_symbol_text("expected object type name")?;

        if self.matches(TokenKind::LeftBrace) {
            let mut fields = Vec::new();
            let mut seen = std::collections::HashSet::new();
            if !self.check(TokenKind::RightBrace) {
                loop {
                    let field = self.expect_symbol_text("expected field name")?;
                    if !seen.insert(field.clone()) {
                        self.error(CompileError::DuplicateObjectMember {
                            line: self.line(),
                            name: field.clone(),
                        });
                    }
                    fields.push(self.element_names.intern(&field));
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBrace, "expected '}' after object fields");
            if self.object_types.define(&type_name, fields).is_err() {
                self.error(CompileError::AlreadyDefined {
                    line: self.line(),
                    name: type_name,
                });
                return Err(());
            }
            if !self.check(TokenKind::Symbol) {
                return Ok(());
            }
        }

        let Some(type_idx) = self.object_types.find(&type_name) else {
            self.error(CompileError::UndefinedSymbol {
                line: self.line(),
                name: type_name,
            });
            return Err(());
        };

        loop {
            let name = self.expect_symbol_text("expected object variable name")?;
            self.declare_and_address(&name, kind);
            self.emit1(Opcode::ObjCreate, type_idx as i64);
            while self.matches(TokenKind::Assign) {
                self.parse_initializer_list()?;
            }
            self.emit(Opcode::AssignPop);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(())
    }

    /// `obj Type { … }` used as an expression term, creating one instance.
    pub(crate) fn parse_object_term(&mut self) -> Result<ExprKind, ()> {
        self.advance(); // consume 'obj'
        let type_name = self.expect_symbol_text("expected object type name")?;
        let Some(type_idx) = self.object_types.find(&type_name) else {
            self.error(CompileError::UndefinedSymbol {
                line: self.line(),
                name: type_name,
            });
            return Err(());
        };
        self.emit1(Opcode::ObjCreate, type_idx as i64);
        Ok(ExprKind::RVALUE)
    }

    /// `{ e1, e2, … }`, each element possibly itself a nested `{ … }`.
    /// Emits `DUPLICATE; ELEMADDR(i)/ FASTINDEXADDR; <value>; ELEMINIT(i)`
    /// per element.
    pub(crate) fn parse_initializer_list(&mut self) -> Result<(), ()> {
        self.parse_initializer_list_counted().map(|_| ())
    }

    fn parse_initializer_list_counted(&mut self) -> Result<usize, ()> {
        self.consume(TokenKind::LeftBrace, "expected '{' to start initializer list");
        let mut index = 0usize;
        if !self.check(TokenKind::RightBrace) {
            loop {
                self.emit(Opcode::Duplicate);
                self.emit1(Opcode::ElemAddr, index as i64);
                if self.check(TokenKind::LeftBrace) {
                    self.parse_initializer_list()?;
                } else {
                    let kind = self.opassignment()?;
                    self.ensure_rvalue(kind);
                }
                self.emit1(Opcode::ElemInit, index as i64);
                index += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBrace, "expected '}' to close initializer list");
        Ok(index)
    }
}
