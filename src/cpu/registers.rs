//! LC-3 register file.
//!
//! The machine has:
//! - R0-R7: eight 16-bit general purpose registers (R7 is the link register
//!   by convention)
//! - PC: 16-bit program counter
//! - COND: condition register holding exactly one of P, Z or N

use crate::cpu::arith;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default load address for user programs.
pub const PC_START: u16 = 0x3000;

/// Index of a general purpose register, always in `0..8`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    pub const R0: Reg = Reg(0);
    pub const R1: Reg = Reg(1);
    pub const R2: Reg = Reg(2);
    pub const R3: Reg = Reg(3);
    pub const R4: Reg = Reg(4);
    pub const R5: Reg = Reg(5);
    pub const R6: Reg = Reg(6);
    pub const R7: Reg = Reg(7);

    /// All registers in index order.
    pub const ALL: [Reg; 8] = [
        Reg::R0, Reg::R1, Reg::R2, Reg::R3,
        Reg::R4, Reg::R5, Reg::R6, Reg::R7,
    ];

    /// Build a register index from a 3-bit instruction field.
    ///
    /// Bits above the field are discarded.
    #[inline]
    pub const fn from_field(field: u16) -> Self {
        Reg((field & 0x7) as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn field(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Condition code, one-hot encoded as in the BR `nzp` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Condition {
    /// P: last result was greater than zero
    Positive,
    /// Z: last result was zero
    #[default]
    Zero,
    /// N: last result had bit 15 set
    Negative,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Positive, Condition::Zero, Condition::Negative];

    /// The flag as it lines up with the `nzp` bits of a branch.
    #[inline]
    pub const fn bits(self) -> u16 {
        match self {
            Condition::Positive => 0b001,
            Condition::Zero => 0b010,
            Condition::Negative => 0b100,
        }
    }

    /// Single-letter name used in listings.
    pub const fn letter(self) -> char {
        match self {
            Condition::Positive => 'P',
            Condition::Zero => 'Z',
            Condition::Negative => 'N',
        }
    }
}

/// The LC-3 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General purpose registers R0-R7.
    pub r: [u16; 8],

    /// Program counter.
    pub pc: u16,

    /// Condition register.
    pub cond: Condition,
}

impl Registers {
    /// Create a register file with everything zeroed and PC at the
    /// default load address.
    pub fn new() -> Self {
        Self {
            r: [0; 8],
            pc: PC_START,
            cond: Condition::Zero,
        }
    }

    /// Reset all registers.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> u16 {
        self.r[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Reg, value: u16) {
        self.r[reg.index()] = value;
    }

    /// Write a register and derive the condition code from the new value.
    pub fn set_with_flags(&mut self, reg: Reg, value: u16) {
        self.set(reg, value);
        self.update_flags(reg);
    }

    /// Set the condition register from the signed value of `reg`.
    pub fn update_flags(&mut self, reg: Reg) {
        self.cond = arith::condition_of(self.get(reg));
    }

    /// Increment the program counter by 1, wrapping at the top of memory.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr;
    }

    /// PC-relative effective address: the (already incremented) PC plus a
    /// sign-extended offset.
    #[inline]
    pub fn pc_relative(&self, offset: i16) -> u16 {
        self.pc.wrapping_add(offset as u16)
    }

    /// Base + offset effective address.
    #[inline]
    pub fn base_relative(&self, base: Reg, offset: i16) -> u16 {
        self.get(base).wrapping_add(offset as u16)
    }

    /// Whether a branch with the given `nzp` mask would be taken.
    #[inline]
    pub fn branch_taken(&self, nzp: u16) -> bool {
        nzp & self.cond.bits() != 0
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
