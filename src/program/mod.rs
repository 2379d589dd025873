//! Program images and listings.
//!
//! This module provides:
//! - The object image loader (big-endian words, origin first)
//! - A disassembler (words → readable text)

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_word};
pub use image::{load_image, Image, ImageError};
