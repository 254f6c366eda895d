//! Appends opcodes/operands to the function under construction. A small
//! owned struct rather than free functions, so the parser modules can
//! each hold a transient `&mut Emitter` wrapping the function currently
//! being built, instead of reaching into a god-object compiler.
//!
//! `Emitter` itself is stateless between calls (it borrows the function
//! for the duration of one emission); the write-flag bookkeeping that must
//! persist across emissions lives on [`crate::compiler::Compiler`], which
//! constructs a fresh `Emitter` per call.
use crate::label::{Label, LabelManager};
use crate::opcode::{Function, Opcode};

pub struct Emitter<'f> {
    function: &'f mut Function,
    line: u32,
}

impl<'f> Emitter<'f> {
    pub fn new(function: &'f mut Function, line: u32) -> Self {
        Emitter { function, line }
    }

    pub fn current_offset(&self) -> usize {
        self.function.current_offset()
    }

    pub fn emit(&mut self, op: Opcode) {
        debug_assert_eq!(op.operand_count(), 0);
        self.function.write_opcode(op, self.line);
    }

    pub fn emit1(&mut self, op: Opcode, imm: i64) -> usize {
        self.function.write_opcode(op, self.line);
        let slot = self.function.current_offset();
        self.function.write_word(imm, self.line);
        slot
    }

    pub fn emit2(&mut self, op: Opcode, imm1: i64, imm2: i64) -> (usize, usize) {
        self.function.write_opcode(op, self.line);
        let slot1 = self.function.current_offset();
        self.function.write_word(imm1, self.line);
        let slot2 = self.function.current_offset();
        self.function.write_word(imm2, self.line);
        (slot1, slot2)
    }

    /// Emits a jump opcode with a placeholder operand threaded into
    /// `label`'s patch chain. Returns the operand slot, in case a caller
    /// needs to remember it directly rather than through the label.
    pub fn emit_jump(&mut self, labels: &LabelManager, op: Opcode, label: &mut Label) -> usize {
        self.function.write_opcode(op, self.line);
        let slot = self.function.current_offset();
        self.function.write_word(-1, self.line);
        labels.emit_jump(self.function, label, slot);
        slot
    }

    pub fn define_label(&mut self, labels: &LabelManager, label: &mut Label) {
        labels.define(self.function, label);
    }

    pub fn patch_word(&mut self, slot: usize, value: i64) {
        self.function.patch_word(slot, value);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emit1_returns_operand_slot() {
        let mut f = Function::new("f");
        let mut e = Emitter::new(&mut f, 1);
        let slot = e.emit1(Opcode::Number, 7);
        assert_eq!(f.word_at(slot), 7);
    }
}
