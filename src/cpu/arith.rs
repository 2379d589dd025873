//! Word-level arithmetic helpers.
//!
//! All LC-3 arithmetic happens on 16-bit words with silent wraparound.
//! Immediate and offset fields are narrower two's-complement values that
//! must be sign-extended before they take part in an addition.

use crate::cpu::registers::Condition;

/// Width of a machine word in bits.
pub const WORD_BITS: u32 = 16;

/// Sign-extend the low `bit_count` bits of `value` to a full word.
///
/// Bits above `bit_count` in the input are ignored.
///
/// # Panics
/// Panics if `bit_count` is zero or wider than a word.
#[inline]
pub fn sign_extend(value: u16, bit_count: u32) -> u16 {
    assert!(
        bit_count > 0 && bit_count <= WORD_BITS,
        "bit count {} out of range (1-{})", bit_count, WORD_BITS
    );
    if bit_count == WORD_BITS {
        return value;
    }

    let mask = (1u16 << bit_count) - 1;
    let field = value & mask;
    if (field >> (bit_count - 1)) & 1 == 1 {
        field | !mask
    } else {
        field
    }
}

/// Extract `width` bits of `word` starting at bit `lsb`.
#[inline]
pub fn bits(word: u16, lsb: u32, width: u32) -> u16 {
    (word >> lsb) & ((1u16 << width) - 1)
}

/// Derive the condition flag a value produces.
///
/// Exactly one flag results: negative when bit 15 is set, zero for zero,
/// positive otherwise.
#[inline]
pub fn condition_of(value: u16) -> Condition {
    if value == 0 {
        Condition::Zero
    } else if value >> 15 == 1 {
        Condition::Negative
    } else {
        Condition::Positive
    }
}
