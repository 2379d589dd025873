//! WebAssembly bindings for the LC-3 VM.
//!
//! This module provides JavaScript-friendly wrappers around the core VM.
//! The keyboard and display are an in-memory [`BufferedConsole`]: the host
//! pushes keys and drains output between calls.

use js_sys::Uint16Array;
use wasm_bindgen::prelude::*;
use crate::console::BufferedConsole;
use crate::program::disasm::{disassemble_word, format_instruction};
use crate::{Cpu, Image};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly VM wrapper.
#[wasm_bindgen]
pub struct WasmVm {
    cpu: Cpu,
    console: BufferedConsole,
    image: Option<Image>,
}

#[wasm_bindgen]
impl WasmVm {
    /// Create a new VM instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            console: BufferedConsole::new(),
            image: None,
        }
    }

    /// Load an object image (origin word first, big-endian).
    /// Returns the number of program words.
    #[wasm_bindgen]
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<usize, JsError> {
        let image = Image::parse(bytes)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        let len = image.len();
        self.cpu = Cpu::new();
        self.cpu.load_program(image.origin, &image.words)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.console = BufferedConsole::new();
        self.image = Some(image);

        Ok(len)
    }

    /// Step one instruction. Returns the disassembled instruction.
    ///
    /// Fails with a "waiting for input" error while GETC/IN has no key;
    /// push a key and step again.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let next_pc = self.cpu.regs.pc.wrapping_add(1);
        let instr = self.cpu.step(&mut self.console)
            .map_err(|e| {
                if e.is_waiting_for_input() {
                    JsError::new("waiting for input")
                } else {
                    JsError::new(&format!("{}", e))
                }
            })?;

        Ok(format_instruction(&instr, next_pc))
    }

    /// Run until halt, max cycles, or the program waits for input.
    /// Returns the total cycle count. A pending IN prompt is not repeated
    /// when the run resumes.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        match self.cpu.run_limited(max_cycles as u64, &mut self.console) {
            Ok(_) => Ok(self.cpu.cycles),
            Err(e) if e.is_waiting_for_input() => Ok(self.cpu.cycles),
            Err(e) => Err(JsError::new(&format!("{}", e))),
        }
    }

    /// Reset the VM to the freshly loaded image.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.cpu.reset();
        self.console = BufferedConsole::new();
        if let Some(image) = &self.image {
            self.cpu.load_program(image.origin, &image.words)
                .map_err(|e| JsError::new(&format!("{}", e)))?;
        }
        Ok(())
    }

    /// Queue keyboard input (UTF-8 bytes of `text`).
    #[wasm_bindgen]
    pub fn push_input(&mut self, text: &str) {
        self.console.push_input(text.as_bytes());
    }

    /// Drain the display output written since the last call.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> String {
        String::from_utf8_lossy(&self.console.take_output()).into_owned()
    }

    /// Check if the VM is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if the VM is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.cpu.regs.pc
    }

    /// Get general-purpose register `index` (0-7).
    #[wasm_bindgen]
    pub fn register(&self, index: u8) -> Result<u16, JsError> {
        self.cpu.regs.r
            .get(index as usize)
            .copied()
            .ok_or_else(|| JsError::new(&format!("no register R{}", index)))
    }

    /// Get the condition flag as "N", "Z" or "P".
    #[wasm_bindgen]
    pub fn cond(&self) -> String {
        self.cpu.regs.cond.letter().to_string()
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Get the word at `addr` without touching device registers.
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: u16) -> u16 {
        self.cpu.mem.peek(addr)
    }

    /// Get `len` words starting at `start`, wrapping at the top of memory.
    #[wasm_bindgen]
    pub fn memory_range(&self, start: u16, len: u16) -> Uint16Array {
        let words: Vec<u16> = self.cpu.mem
            .dump(start, len as usize)
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        Uint16Array::from(words.as_slice())
    }

    /// Get registers, state and cycles as JSON.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.snapshot())
            .map_err(|e| JsError::new(&format!("{}", e)))
    }
}

impl Default for WasmVm {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble a single word as if stored at `addr`.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u16, addr: u16) -> String {
    disassemble_word(word, addr)
}
