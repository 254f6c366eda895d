//! Label manager: forward jump targets patched through a chain threaded
//! directly in the function's own opcode immediate words, plus the
//! named-label table used by `goto`.
use std::collections::HashMap;

use crate::opcode::Function;

/// Sentinel meaning "no previous link in the chain".
const NO_CHAIN: i64 = -1;

/// A deferred code offset. While `offset` is `None` the label is
/// *undefined*; every `emit_jump` call against it extends the chain by
/// writing the previous chain head into the new jump's operand slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Label {
    offset: Option<usize>,
    chain_head: i64,
}

impl Label {
    pub fn new() -> Self {
        Label {
            offset: None,
            chain_head: NO_CHAIN,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.offset.is_some()
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}

/// Threads forward references through a [`Function`]'s word stream and
/// resolves them once the label is placed.
#[derive(Debug, Default)]
pub struct LabelManager {
    named: HashMap<String, Label>,
}

impl LabelManager {
    pub fn new() -> Self {
        LabelManager::default()
    }

    /// Records that `op_operand_offset` (the index of the jump's target
    /// immediate, not the opcode tag itself) refers to `label`, and writes
    /// the current chain head there so a later `define` can walk it.
    pub fn emit_jump(&self, function: &mut Function, label: &mut Label, op_operand_offset: usize) {
        function.patch_word(op_operand_offset, label.chain_head);
        label.chain_head = op_operand_offset as i64;
    }

    /// Places `label` at the function's current offset and walks its
    /// chain, overwriting every pending jump operand with the resolved
    /// offset.
    pub fn define(&self, function: &mut Function, label: &mut Label) {
        let here = function.current_offset();
        let mut cursor = label.chain_head;
        while cursor != NO_CHAIN {
            let slot = cursor as usize;
            let previous = function.word_at(slot);
            function.patch_word(slot, here as i64);
            cursor = previous;
        }
        label.offset = Some(here);
        label.chain_head = NO_CHAIN;
    }

    pub fn clear(&self, label: &mut Label) {
        *label = Label::new();
    }

    /// Named label used by `goto`/`name:`. Scoped to the current function;
    /// caller clears the table on function entry.
    pub fn named_label(&mut self, name: &str) -> &mut Label {
        self.named.entry(name.to_string()).or_insert_with(Label::new)
    }

    pub fn reset_named(&mut self) {
        self.named.clear();
    }

    /// Every named label referenced must be defined by function end.
    pub fn undefined_named_labels(&self) -> impl Iterator<Item = &str> {
        self.named
            .iter()
            .filter(|(_, label)| !label.is_defined())
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn single_forward_jump_is_patched() {
        let mgr = LabelManager::new();
        let mut f = Function::new("f");
        let mut label = Label::new();

        f.write_opcode(Opcode::Jump, 1);
        let operand_slot = f.current_offset();
        f.write_word(-999, 1); // placeholder, overwritten below
        mgr.emit_jump(&mut f, &mut label, operand_slot);

        f.write_opcode(Opcode::Return, 2);
        mgr.define(&mut f, &mut label);

        assert!(label.is_defined());
        assert_eq!(f.word_at(operand_slot), label.offset().unwrap() as i64);
    }

    #[test]
    fn chain_of_three_jumps_all_patch_to_same_offset() {
        let mgr = LabelManager::new();
        let mut f = Function::new("f");
        let mut label = Label::new();
        let mut slots = Vec::new();

        for _ in 0..3 {
            f.write_opcode(Opcode::Jump, 1);
            let slot = f.current_offset();
            f.write_word(-1, 1);
            mgr.emit_jump(&mut f, &mut label, slot);
            slots.push(slot);
        }

        mgr.define(&mut f, &mut label);
        let resolved = label.offset().unwrap() as i64;
        for slot in slots {
            assert_eq!(f.word_at(slot), resolved);
        }
    }

    #[test]
    fn undefined_named_label_is_reported() {
        let mut mgr = LabelManager::new();
        mgr.named_label("top");
        assert_eq!(mgr.undefined_named_labels().count(), 1);
    }
}
