//! TUI debugger for the LC-3 VM.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register, flag and memory views
//! - Step/run/breakpoint controls
//! - Disassembly around the PC
//! - A console pane with keyboard input forwarded to the program

mod app;
mod ui;

pub use app::{DebuggerApp, InputMode, run_debugger};
