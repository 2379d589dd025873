//! LC-3 memory subsystem.
//!
//! 65,536 sixteen-bit words, addressed by the full `u16` range. Two
//! addresses are keyboard device registers: reading the status register
//! polls the host console and latches any pending key into the data
//! register. Writes are never intercepted.

use crate::console::Console;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The number of words in the address space.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register: bit 15 set when a key is ready.
pub const KBSR: u16 = 0xFE00;

/// Keyboard data register: the last key latched by a status poll.
pub const KBDR: u16 = 0xFE02;

/// Status value meaning "a key is ready".
const KBSR_READY: u16 = 0x8000;

/// LC-3 memory: 65,536 sixteen-bit cells.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a word as the CPU sees it.
    ///
    /// Reading [`KBSR`] polls `console` for a key first.
    pub fn read<C: Console + ?Sized>(&mut self, addr: u16, console: &mut C) -> u16 {
        if addr == KBSR {
            match console.poll_key() {
                Some(key) => {
                    self.cells[KBSR as usize] = KBSR_READY;
                    self.cells[KBDR as usize] = key as u16;
                }
                None => self.cells[KBSR as usize] = 0,
            }
        }
        self.cells[addr as usize]
    }

    /// Read a word without touching any device.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    /// Write a word. Device addresses are ordinary cells on write.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Copy `words` into memory starting at `origin`.
    pub fn load(&mut self, origin: u16, words: &[u16]) -> Result<(), MemoryError> {
        let start = origin as usize;
        if start + words.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                origin,
                size: words.len(),
                available: MEMORY_SIZE - start,
            });
        }

        self.cells[start..start + words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Read a NUL-terminated run of words starting at `addr`, wrapping at
    /// the top of memory. The terminator is not included.
    pub fn string_at(&self, addr: u16) -> impl Iterator<Item = u16> + '_ {
        let mut cursor = addr;
        let mut remaining = MEMORY_SIZE;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let word = self.peek(cursor);
            if word == 0 {
                return None;
            }
            cursor = cursor.wrapping_add(1);
            remaining -= 1;
            Some(word)
        })
    }

    /// `count` cells from `start` as address/value pairs, wrapping around.
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        (0..count.min(MEMORY_SIZE))
            .map(|i| {
                let addr = start.wrapping_add(i as u16);
                (addr, self.peek(addr))
            })
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur when placing a program in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Program does not fit between its origin and the top of memory.
    ProgramTooLarge { origin: u16, size: usize, available: usize },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::ProgramTooLarge { origin, size, available } => {
                write!(
                    f,
                    "program of {} words at x{:04X} exceeds available space {}",
                    size, origin, available
                )
            }
        }
    }
}

impl std::error::Error for MemoryError {}
