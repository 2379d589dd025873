//! Disassembler for LC-3 programs.
//!
//! Converts instruction words back to readable assembly. PC-relative
//! operands are shown as their resolved target address.

use crate::cpu::decode::{decode, Instruction, Operand};
use crate::program::image::Image;
use std::fmt::Write;

/// Format a word the way LC-3 assembly writes hex literals (`x3000`).
pub fn hex(word: u16) -> String {
    format!("x{:04X}", word)
}

/// Disassemble the word stored at `addr`.
///
/// Words that do not decode are shown as data.
pub fn disassemble_word(word: u16, addr: u16) -> String {
    match decode(word) {
        Ok(decoded) => format_instruction(&decoded, addr.wrapping_add(1)),
        Err(_) => format!(".FILL {}", hex(word)),
    }
}

/// Disassemble a whole image into an address-annotated listing.
pub fn disassemble(image: &Image) -> String {
    let mut output = String::new();
    output.push_str("; LC-3 Disassembly\n");
    output.push_str("; -----------------\n");
    let _ = writeln!(output, ".ORIG {}", hex(image.origin));

    for (i, &word) in image.words.iter().enumerate() {
        let addr = image.origin.wrapping_add(i as u16);
        let line = disassemble_word(word, addr);
        let _ = writeln!(output, "{}: {}  {}", hex(addr), hex(word), line);
    }

    output.push_str(".END\n");
    output
}

/// Format a decoded instruction; `next_pc` is the address after it.
pub fn format_instruction(instr: &Instruction, next_pc: u16) -> String {
    let target = |offset: i16| hex(next_pc.wrapping_add(offset as u16));

    match *instr {
        // Operate
        Instruction::Add { dr, sr1, src2 } => format!("ADD {}, {}, {}", dr, sr1, format_operand(src2)),
        Instruction::And { dr, sr1, src2 } => format!("AND {}, {}, {}", dr, sr1, format_operand(src2)),
        Instruction::Not { dr, sr } => format!("NOT {}, {}", dr, sr),

        // Data movement
        Instruction::Ld { dr, offset } => format!("LD {}, {}", dr, target(offset)),
        Instruction::Ldi { dr, offset } => format!("LDI {}, {}", dr, target(offset)),
        Instruction::Ldr { dr, base, offset } => format!("LDR {}, {}, #{}", dr, base, offset),
        Instruction::Lea { dr, offset } => format!("LEA {}, {}", dr, target(offset)),
        Instruction::St { sr, offset } => format!("ST {}, {}", sr, target(offset)),
        Instruction::Sti { sr, offset } => format!("STI {}, {}", sr, target(offset)),
        Instruction::Str { sr, base, offset } => format!("STR {}, {}, #{}", sr, base, offset),

        // Control
        Instruction::Br { nzp: 0, .. } => "NOP".to_string(),
        Instruction::Br { nzp, offset } => format!("BR{} {}", format_nzp(nzp), target(offset)),
        Instruction::Jmp { base } if base.index() == 7 => "RET".to_string(),
        Instruction::Jmp { base } => format!("JMP {}", base),
        Instruction::Jsr { offset } => format!("JSR {}", target(offset)),
        Instruction::Jsrr { base } => format!("JSRR {}", base),
        Instruction::Trap { vector } => vector.name().to_string(),
    }
}

fn format_operand(src2: Operand) -> String {
    match src2 {
        Operand::Reg(reg) => reg.to_string(),
        Operand::Imm(imm) => format!("#{}", imm),
    }
}

fn format_nzp(nzp: u16) -> String {
    [(0b100, 'n'), (0b010, 'z'), (0b001, 'p')]
        .iter()
        .filter(|(bit, _)| nzp & bit != 0)
        .map(|&(_, c)| c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::registers::Reg;
    use crate::cpu::trap::TrapVector;

    #[test]
    fn test_disassemble_halt() {
        let halt = encode(&Instruction::Trap { vector: TrapVector::Halt });
        assert_eq!(disassemble_word(halt, 0x3000), "HALT");
    }

    #[test]
    fn test_disassemble_add() {
        let add = encode(&Instruction::Add { dr: Reg::R1, sr1: Reg::R2, src2: Operand::Imm(-3) });
        assert_eq!(disassemble_word(add, 0x3000), "ADD R1, R2, #-3");

        let add = encode(&Instruction::Add { dr: Reg::R0, sr1: Reg::R0, src2: Operand::Reg(Reg::R4) });
        assert_eq!(disassemble_word(add, 0x3000), "ADD R0, R0, R4");
    }

    #[test]
    fn test_disassemble_pc_relative_targets() {
        let br = encode(&Instruction::Br { nzp: 0b110, offset: 4 });
        assert_eq!(disassemble_word(br, 0x3000), "BRnz x3005");

        let lea = encode(&Instruction::Lea { dr: Reg::R0, offset: -1 });
        assert_eq!(disassemble_word(lea, 0x3000), "LEA R0, x3000");

        let jsr = encode(&Instruction::Jsr { offset: 0x10 });
        assert_eq!(disassemble_word(jsr, 0x3000), "JSR x3011");
    }

    #[test]
    fn test_disassemble_aliases() {
        assert_eq!(disassemble_word(0xC1C0, 0x3000), "RET");
        assert_eq!(disassemble_word(0x0000, 0x3000), "NOP");
        assert_eq!(disassemble_word(0xC080, 0x3000), "JMP R2");
    }

    #[test]
    fn test_undecodable_words_are_data() {
        assert_eq!(disassemble_word(0xD123, 0x3000), ".FILL xD123");
        assert_eq!(disassemble_word(0xF0FF, 0x3000), ".FILL xF0FF");
    }

    #[test]
    fn test_listing() {
        let image = Image::new(0x3000, vec![0xE002, 0xF022, 0xF025]);
        let listing = disassemble(&image);

        assert!(listing.contains(".ORIG x3000"));
        assert!(listing.contains("x3000: xE002  LEA R0, x3003"));
        assert!(listing.contains("x3001: xF022  PUTS"));
        assert!(listing.contains("x3002: xF025  HALT"));
        assert!(listing.ends_with(".END\n"));
    }
}
