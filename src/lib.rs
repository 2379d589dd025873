//! # LC-3 Virtual Machine
//!
//! A virtual machine for the LC-3, a 16-bit educational computer with
//! eight registers, a one-hot condition code and a word-addressed memory.
//!
//! The CPU owns its registers and memory; the host console is lent to it
//! for every step, so the caller decides how keyboard and display work.

pub mod cpu;
pub mod console;
pub mod program;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Instruction, Reg, Condition, TrapVector};
pub use console::{Console, BufferedConsole};
pub use program::{disassemble, load_image, Image, ImageError};

#[cfg(feature = "term")]
pub use console::TerminalConsole;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
