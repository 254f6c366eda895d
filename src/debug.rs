//! Disassembler for a compiled [`Function`]'s word stream (`show opcodes
//! NAME`). Every opcode prints at a fixed column with its operand words
//! trailing it, wide enough for slot numbers and jump targets that
//! wouldn't fit in a single byte.
use crate::opcode::{Function, Opcode};

/// Disassembles every instruction in `function`, returning the listing as
/// a string rather than printing directly, so [`crate::vm::Vm`]'s `show`
/// handling can fold it into its own output buffer.
pub fn disassemble_function(function: &Function) -> String {
    let mut out = format!("== {} ==\n", function.name);
    let code = function.code();
    let mut offset = 0;
    while offset < code.len() {
        offset = disassemble_instruction(function, offset, &mut out);
    }
    out
}

/// Prints one instruction, returning the offset of the next one.
pub fn disassemble_instruction(function: &Function, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{offset:04} "));

    if offset > 0 && at_same_line_as_previous_offset(function, offset) {
        out.push_str("   | ");
    } else {
        match function.line_for(offset) {
            Some(line) => out.push_str(&format!("{line:4} ")),
            None => out.push_str("   ? "),
        }
    }

    let word = function.word_at(offset);
    let Ok(op) = Opcode::try_from(word) else {
        out.push_str(&format!("<bad opcode {word}>\n"));
        return offset + 1;
    };

    let operands = op.operand_count();
    out.push_str(&format!("{op:?}"));
    for i in 0..operands {
        let operand = function.word_at(offset + 1 + i);
        out.push_str(&format!(" {operand}"));
    }
    out.push('\n');
    offset + 1 + operands
}

fn at_same_line_as_previous_offset(function: &Function, offset: usize) -> bool {
    function
        .line_for(offset)
        .zip(function.line_for(offset - 1))
        .map(|(current, previous)| current == previous)
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disassembly_lists_every_instruction() {
        let mut f = Function::new("f");
        f.write_opcode(Opcode::Zero, 1);
        f.write_opcode(Opcode::One, 1);
        f.write_opcode(Opcode::Add, 1);
        f.write_opcode(Opcode::Return, 2);
        let text = disassemble_function(&f);
        assert!(text.contains("== f =="));
        assert!(text.contains("Add"));
        assert!(text.contains("Return"));
    }

    #[test]
    fn operand_words_are_printed_inline() {
        let mut f = Function::new("g");
        f.write_opcode(Opcode::Number, 1);
        f.write_word(7, 1);
        f.write_opcode(Opcode::Return, 1);
        let text = disassemble_function(&f);
        assert!(text.contains("Number 7"));
    }
}
