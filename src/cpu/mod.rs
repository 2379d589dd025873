//! CPU emulation for the LC-3.
//!
//! This module implements the complete LC-3 user-level architecture:
//! - 65,536 sixteen-bit memory words with keyboard registers at xFE00/xFE02
//! - 8 general purpose registers, PC and a one-hot N/Z/P condition code
//! - 15 instructions plus the reserved opcode, and the six standard traps

pub mod arith;
pub mod memory;
pub mod registers;
pub mod decode;
pub mod trap;
pub mod execute;

pub use memory::Memory;
pub use registers::{Condition, Reg, Registers};
pub use decode::{Instruction, Opcode, Operand, DecodeError};
pub use trap::TrapVector;
pub use execute::{Cpu, CpuError, CpuState, Snapshot};
