//! Instruction decoder for the LC-3.
//!
//! Every instruction is one 16-bit word. The top four bits select the
//! opcode; the remaining twelve hold register fields, an immediate flag
//! and sign-extended offsets whose width depends on the opcode:
//!
//! ```text
//!  15  12 11  9 8   6 5 4     0
//! | op   | DR  | SR1 |0|00|SR2 |   ADD/AND, register mode
//! | op   | DR  | SR1 |1| imm5  |   ADD/AND, immediate mode
//! | op   | nzp |   PCoffset9   |   BR
//! | op   | DR  |   PCoffset9   |   LD/LDI/LEA, ST/STI (SR in DR slot)
//! | op   | DR  |BaseR| offset6 |   LDR/STR
//! | op   |1|   PCoffset11      |   JSR
//! | op   |0|00|BaseR| 000000   |   JSRR, JMP
//! | op   |0000|  trapvect8    |   TRAP
//! ```
//!
//! Unused and reserved bits are ignored.

use crate::cpu::arith::{bits, sign_extend};
use crate::cpu::registers::Reg;
use crate::cpu::trap::TrapVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The sixteen opcodes, by their 4-bit encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Br = 0b0000,
    Add = 0b0001,
    Ld = 0b0010,
    St = 0b0011,
    Jsr = 0b0100,
    And = 0b0101,
    Ldr = 0b0110,
    Str = 0b0111,
    /// Return from interrupt; unused by this machine.
    Rti = 0b1000,
    Not = 0b1001,
    Ldi = 0b1010,
    Sti = 0b1011,
    Jmp = 0b1100,
    /// Reserved.
    Res = 0b1101,
    Lea = 0b1110,
    Trap = 0b1111,
}

impl Opcode {
    /// The opcode of an instruction word.
    pub fn of(word: u16) -> Self {
        match word >> 12 {
            0b0000 => Opcode::Br,
            0b0001 => Opcode::Add,
            0b0010 => Opcode::Ld,
            0b0011 => Opcode::St,
            0b0100 => Opcode::Jsr,
            0b0101 => Opcode::And,
            0b0110 => Opcode::Ldr,
            0b0111 => Opcode::Str,
            0b1000 => Opcode::Rti,
            0b1001 => Opcode::Not,
            0b1010 => Opcode::Ldi,
            0b1011 => Opcode::Sti,
            0b1100 => Opcode::Jmp,
            0b1101 => Opcode::Res,
            0b1110 => Opcode::Lea,
            _ => Opcode::Trap,
        }
    }

    /// The opcode shifted into place in an instruction word.
    #[inline]
    pub fn bits(self) -> u16 {
        (self as u16) << 12
    }
}

/// Second operand of ADD and AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// SR2
    Reg(Reg),
    /// Sign-extended imm5
    Imm(i16),
}

/// Decoded LC-3 instruction.
///
/// Offsets are stored already sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Operate ====================

    /// DR := SR1 + operand
    Add { dr: Reg, sr1: Reg, src2: Operand },

    /// DR := SR1 & operand
    And { dr: Reg, sr1: Reg, src2: Operand },

    /// DR := !SR
    Not { dr: Reg, sr: Reg },

    // ==================== Data Movement ====================

    /// DR := mem[PC + offset9]
    Ld { dr: Reg, offset: i16 },

    /// DR := mem[mem[PC + offset9]]
    Ldi { dr: Reg, offset: i16 },

    /// DR := mem[BaseR + offset6]
    Ldr { dr: Reg, base: Reg, offset: i16 },

    /// DR := PC + offset9
    Lea { dr: Reg, offset: i16 },

    /// mem[PC + offset9] := SR
    St { sr: Reg, offset: i16 },

    /// mem[mem[PC + offset9]] := SR
    Sti { sr: Reg, offset: i16 },

    /// mem[BaseR + offset6] := SR
    Str { sr: Reg, base: Reg, offset: i16 },

    // ==================== Control ====================

    /// Branch if any of the `nzp` bits matches the condition register.
    Br { nzp: u16, offset: i16 },

    /// PC := BaseR (RET when BaseR is R7)
    Jmp { base: Reg },

    /// R7 := PC; PC := PC + offset11
    Jsr { offset: i16 },

    /// R7 := PC; PC := BaseR
    Jsrr { base: Reg },

    /// System call through the trap table.
    Trap { vector: TrapVector },
}

impl Instruction {
    /// The opcode this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Add { .. } => Opcode::Add,
            Instruction::And { .. } => Opcode::And,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Ldr { .. } => Opcode::Ldr,
            Instruction::Lea { .. } => Opcode::Lea,
            Instruction::St { .. } => Opcode::St,
            Instruction::Sti { .. } => Opcode::Sti,
            Instruction::Str { .. } => Opcode::Str,
            Instruction::Br { .. } => Opcode::Br,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jsr { .. } | Instruction::Jsrr { .. } => Opcode::Jsr,
            Instruction::Trap { .. } => Opcode::Trap,
        }
    }

    /// Whether executing this instruction sets the condition register.
    pub fn sets_flags(&self) -> bool {
        matches!(
            self,
            Instruction::Add { .. }
                | Instruction::And { .. }
                | Instruction::Not { .. }
                | Instruction::Ld { .. }
                | Instruction::Ldi { .. }
                | Instruction::Ldr { .. }
                | Instruction::Lea { .. }
        )
    }
}

#[inline]
fn dr(word: u16) -> Reg {
    Reg::from_field(bits(word, 9, 3))
}

#[inline]
fn sr1(word: u16) -> Reg {
    Reg::from_field(bits(word, 6, 3))
}

#[inline]
fn offset(word: u16, width: u32) -> i16 {
    sign_extend(word, width) as i16
}

fn operand(word: u16) -> Operand {
    if bits(word, 5, 1) == 1 {
        Operand::Imm(offset(word, 5))
    } else {
        Operand::Reg(Reg::from_field(word))
    }
}

/// Decode a 16-bit instruction word.
pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    let instruction = match Opcode::of(word) {
        Opcode::Br => Instruction::Br { nzp: bits(word, 9, 3), offset: offset(word, 9) },
        Opcode::Add => Instruction::Add { dr: dr(word), sr1: sr1(word), src2: operand(word) },
        Opcode::And => Instruction::And { dr: dr(word), sr1: sr1(word), src2: operand(word) },
        Opcode::Not => Instruction::Not { dr: dr(word), sr: sr1(word) },
        Opcode::Ld => Instruction::Ld { dr: dr(word), offset: offset(word, 9) },
        Opcode::Ldi => Instruction::Ldi { dr: dr(word), offset: offset(word, 9) },
        Opcode::Ldr => Instruction::Ldr { dr: dr(word), base: sr1(word), offset: offset(word, 6) },
        Opcode::Lea => Instruction::Lea { dr: dr(word), offset: offset(word, 9) },
        Opcode::St => Instruction::St { sr: dr(word), offset: offset(word, 9) },
        Opcode::Sti => Instruction::Sti { sr: dr(word), offset: offset(word, 9) },
        Opcode::Str => Instruction::Str { sr: dr(word), base: sr1(word), offset: offset(word, 6) },
        Opcode::Jmp => Instruction::Jmp { base: sr1(word) },
        Opcode::Jsr => {
            if bits(word, 11, 1) == 1 {
                Instruction::Jsr { offset: offset(word, 11) }
            } else {
                Instruction::Jsrr { base: sr1(word) }
            }
        }
        Opcode::Trap => {
            let vector = bits(word, 0, 8) as u8;
            let vector = TrapVector::from_code(vector)
                .ok_or(DecodeError::UnknownTrap { vector, word })?;
            Instruction::Trap { vector }
        }
        opcode @ (Opcode::Rti | Opcode::Res) => {
            return Err(DecodeError::ReservedOpcode { opcode, word });
        }
    };

    Ok(instruction)
}

/// Mask a signed offset into a field of `width` bits.
#[inline]
fn field(value: i16, width: u32) -> u16 {
    (value as u16) & ((1u16 << width) - 1)
}

fn encode_operand(src2: &Operand) -> u16 {
    match *src2 {
        Operand::Reg(sr2) => sr2.field(),
        Operand::Imm(imm) => 1 << 5 | field(imm, 5),
    }
}

/// Encode an instruction back to its 16-bit word.
///
/// Offsets wider than their field are truncated to it.
pub fn encode(instr: &Instruction) -> u16 {
    let op = instr.opcode().bits();
    let operands = match *instr {
        Instruction::Add { dr, sr1, src2 } | Instruction::And { dr, sr1, src2 } => {
            dr.field() << 9 | sr1.field() << 6 | encode_operand(&src2)
        }
        Instruction::Not { dr, sr } => dr.field() << 9 | sr.field() << 6 | 0x3F,
        Instruction::Ld { dr, offset }
        | Instruction::Ldi { dr, offset }
        | Instruction::Lea { dr, offset } => dr.field() << 9 | field(offset, 9),
        Instruction::St { sr, offset } | Instruction::Sti { sr, offset } => {
            sr.field() << 9 | field(offset, 9)
        }
        Instruction::Ldr { dr, base, offset } => dr.field() << 9 | base.field() << 6 | field(offset, 6),
        Instruction::Str { sr, base, offset } => sr.field() << 9 | base.field() << 6 | field(offset, 6),
        Instruction::Br { nzp, offset } => (nzp & 0x7) << 9 | field(offset, 9),
        Instruction::Jmp { base } | Instruction::Jsrr { base } => base.field() << 6,
        Instruction::Jsr { offset } => 1 << 11 | field(offset, 11),
        Instruction::Trap { vector } => vector.code() as u16,
    };
    op | operands
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("reserved opcode {opcode:?} in instruction x{word:04X}")]
    ReservedOpcode { opcode: Opcode, word: u16 },

    #[error("unknown trap vector x{vector:02X} in instruction x{word:04X}")]
    UnknownTrap { vector: u8, word: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_add_immediate() {
        // ADD R2, R1, #-3
        let word = 0b0001_010_001_1_11101;
        assert_eq!(
            decode(word).unwrap(),
            Instruction::Add { dr: Reg::R2, sr1: Reg::R1, src2: Operand::Imm(-3) }
        );
    }

    #[test]
    fn test_decode_and_register() {
        // AND R0, R3, R7
        let word = 0b0101_000_011_0_00_111;
        assert_eq!(
            decode(word).unwrap(),
            Instruction::And { dr: Reg::R0, sr1: Reg::R3, src2: Operand::Reg(Reg::R7) }
        );
    }

    #[test]
    fn test_decode_branch_and_offsets() {
        // BRnp #-1
        assert_eq!(
            decode(0b0000_101_111111111).unwrap(),
            Instruction::Br { nzp: 0b101, offset: -1 }
        );
        // LDR R4, R5, #-32
        assert_eq!(
            decode(0b0110_100_101_100000).unwrap(),
            Instruction::Ldr { dr: Reg::R4, base: Reg::R5, offset: -32 }
        );
    }

    #[test]
    fn test_decode_jsr_uses_eleven_bits() {
        // Bit 10 is the sign bit of the 11-bit offset.
        assert_eq!(
            decode(0b0100_1_10000000000).unwrap(),
            Instruction::Jsr { offset: -1024 }
        );
        assert_eq!(
            decode(0b0100_1_01111111111).unwrap(),
            Instruction::Jsr { offset: 1023 }
        );
        assert_eq!(decode(0b0100_0_00_011_000000).unwrap(), Instruction::Jsrr { base: Reg::R3 });
    }

    #[test]
    fn test_decode_ret() {
        assert_eq!(decode(0xC1C0).unwrap(), Instruction::Jmp { base: Reg::R7 });
    }

    #[test]
    fn test_decode_traps() {
        assert_eq!(decode(0xF025).unwrap(), Instruction::Trap { vector: TrapVector::Halt });
        assert_eq!(decode(0xF022).unwrap(), Instruction::Trap { vector: TrapVector::Puts });
        assert_eq!(
            decode(0xF026),
            Err(DecodeError::UnknownTrap { vector: 0x26, word: 0xF026 })
        );
    }

    #[test]
    fn test_reserved_opcodes_rejected() {
        assert_eq!(
            decode(0xD000),
            Err(DecodeError::ReservedOpcode { opcode: Opcode::Res, word: 0xD000 })
        );
        assert_eq!(
            decode(0x8000),
            Err(DecodeError::ReservedOpcode { opcode: Opcode::Rti, word: 0x8000 })
        );
    }

    #[test]
    fn test_opcode_of_covers_all_nibbles() {
        for nibble in 0u16..16 {
            assert_eq!(Opcode::of(nibble << 12).bits(), nibble << 12);
        }
    }

    #[test]
    fn test_encode_known_words() {
        assert_eq!(encode(&Instruction::Trap { vector: TrapVector::Halt }), 0xF025);
        assert_eq!(encode(&Instruction::Jmp { base: Reg::R7 }), 0xC1C0);
        assert_eq!(
            encode(&Instruction::Lea { dr: Reg::R0, offset: 2 }),
            0b1110_000_000000010
        );
        assert_eq!(encode(&Instruction::Not { dr: Reg::R1, sr: Reg::R2 }), 0b1001_001_010_111111);
    }

    #[test]
    fn test_encode_decode_every_opcode() {
        let test_cases = [
            Instruction::Add { dr: Reg::R1, sr1: Reg::R2, src2: Operand::Imm(15) },
            Instruction::And { dr: Reg::R3, sr1: Reg::R4, src2: Operand::Reg(Reg::R5) },
            Instruction::Not { dr: Reg::R6, sr: Reg::R7 },
            Instruction::Ld { dr: Reg::R0, offset: -256 },
            Instruction::Ldi { dr: Reg::R1, offset: 255 },
            Instruction::Ldr { dr: Reg::R2, base: Reg::R6, offset: 31 },
            Instruction::Lea { dr: Reg::R3, offset: -5 },
            Instruction::St { sr: Reg::R4, offset: 7 },
            Instruction::Sti { sr: Reg::R5, offset: -7 },
            Instruction::Str { sr: Reg::R6, base: Reg::R1, offset: -1 },
            Instruction::Br { nzp: 0b111, offset: -3 },
            Instruction::Jmp { base: Reg::R2 },
            Instruction::Jsr { offset: -1000 },
            Instruction::Jsrr { base: Reg::R4 },
            Instruction::Trap { vector: TrapVector::Getc },
        ];

        for instr in test_cases {
            assert_eq!(decode(encode(&instr)).unwrap(), instr);
        }
    }

    #[test]
    fn test_sets_flags() {
        assert!(Instruction::Lea { dr: Reg::R0, offset: 0 }.sets_flags());
        assert!(!Instruction::St { sr: Reg::R0, offset: 0 }.sets_flags());
        assert!(!Instruction::Trap { vector: TrapVector::Getc }.sets_flags());
    }
}
