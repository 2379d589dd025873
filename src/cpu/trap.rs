//! Trap routines.
//!
//! `TRAP` calls into a fixed table of host services addressed by an 8-bit
//! vector. Instead of running service routines from memory, each vector is
//! implemented directly against the host [`Console`].

use crate::console::Console;
use crate::cpu::memory::Memory;
use crate::cpu::registers::{Reg, Registers};
use serde::{Deserialize, Serialize};
use std::io;
use tracing::debug;

/// Prompt printed by the IN trap.
pub const IN_PROMPT: &[u8] = b"Enter a character: ";

/// Trap vectors understood by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrapVector {
    /// Read a key without echo into R0.
    Getc = 0x20,
    /// Write the low byte of R0.
    Out = 0x21,
    /// Write a word-per-character string starting at R0.
    Puts = 0x22,
    /// Prompt, read a key with echo into R0.
    In = 0x23,
    /// Write a two-characters-per-word string starting at R0.
    Putsp = 0x24,
    /// Stop the machine.
    Halt = 0x25,
}

impl TrapVector {
    pub const ALL: [TrapVector; 6] = [
        TrapVector::Getc,
        TrapVector::Out,
        TrapVector::Puts,
        TrapVector::In,
        TrapVector::Putsp,
        TrapVector::Halt,
    ];

    /// Look up a vector by its 8-bit code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|vector| vector.code() == code)
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Assembler mnemonic for the trap.
    pub fn name(self) -> &'static str {
        match self {
            TrapVector::Getc => "GETC",
            TrapVector::Out => "OUT",
            TrapVector::Puts => "PUTS",
            TrapVector::In => "IN",
            TrapVector::Putsp => "PUTSP",
            TrapVector::Halt => "HALT",
        }
    }
}

/// Trap progress that has to survive a retried step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapState {
    /// IN has printed its prompt and is still waiting for the key.
    pub prompted: bool,
}

/// What the engine should do after a trap returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    Continue,
    Halt,
}

/// Run a trap routine.
///
/// Traps never touch the condition register. String traps read memory
/// without device side effects.
pub fn execute<C: Console + ?Sized>(
    vector: TrapVector,
    regs: &mut Registers,
    mem: &Memory,
    state: &mut TrapState,
    console: &mut C,
) -> io::Result<TrapOutcome> {
    debug!(trap = vector.name(), r0 = regs.get(Reg::R0), "trap");

    match vector {
        TrapVector::Getc => {
            let key = console.read_key()?;
            regs.set(Reg::R0, key as u16);
        }

        TrapVector::Out => {
            console.write_byte(low_byte(regs.get(Reg::R0)))?;
            console.flush()?;
        }

        TrapVector::Puts => {
            for word in mem.string_at(regs.get(Reg::R0)) {
                console.write_byte(low_byte(word))?;
            }
            console.flush()?;
        }

        TrapVector::In => {
            if !state.prompted {
                console.write_bytes(IN_PROMPT)?;
                console.flush()?;
                state.prompted = true;
            }
            let key = console.read_key()?;
            state.prompted = false;
            console.write_byte(key)?;
            console.flush()?;
            regs.set(Reg::R0, key as u16);
        }

        TrapVector::Putsp => {
            for word in mem.string_at(regs.get(Reg::R0)) {
                console.write_byte(low_byte(word))?;
                let high = (word >> 8) as u8;
                if high != 0 {
                    console.write_byte(high)?;
                }
            }
            console.flush()?;
        }

        TrapVector::Halt => {
            console.write_bytes(b"HALT\n")?;
            console.flush()?;
            return Ok(TrapOutcome::Halt);
        }
    }

    Ok(TrapOutcome::Continue)
}

#[inline]
fn low_byte(word: u16) -> u8 {
    (word & 0xFF) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferedConsole;

    fn setup(r0: u16) -> (Registers, Memory, BufferedConsole) {
        let mut regs = Registers::new();
        regs.set(Reg::R0, r0);
        (regs, Memory::new(), BufferedConsole::new())
    }

    #[test]
    fn test_vector_codes() {
        for vector in TrapVector::ALL {
            assert_eq!(TrapVector::from_code(vector.code()), Some(vector));
        }
        assert_eq!(TrapVector::from_code(0x1F), None);
        assert_eq!(TrapVector::from_code(0x26), None);
    }

    #[test]
    fn test_puts_stops_at_zero_word() {
        let (mut regs, mut mem, mut console) = setup(0x4000);
        mem.load(0x4000, &[0x48, 0x49, 0x00, 0x21]).unwrap();

        let outcome = execute(TrapVector::Puts, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();

        assert_eq!(outcome, TrapOutcome::Continue);
        assert_eq!(console.output(), b"HI");
    }

    #[test]
    fn test_puts_uses_low_byte_only() {
        let (mut regs, mut mem, mut console) = setup(0x4000);
        mem.load(0x4000, &[0x1241, 0x00]).unwrap();

        execute(TrapVector::Puts, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();
        assert_eq!(console.output(), b"A");
    }

    #[test]
    fn test_putsp_unpacks_two_per_word() {
        let (mut regs, mut mem, mut console) = setup(0x5000);
        // "HEL" packed low byte first; odd tail has a zero high byte.
        mem.load(0x5000, &[0x4548, 0x004C, 0x0000]).unwrap();

        execute(TrapVector::Putsp, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();
        assert_eq!(console.output(), b"HEL");
    }

    #[test]
    fn test_out_writes_low_byte() {
        let (mut regs, mem, mut console) = setup(0x0A41);
        execute(TrapVector::Out, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();
        assert_eq!(console.output(), b"A");
    }

    #[test]
    fn test_getc_does_not_echo() {
        let (mut regs, mem, _) = setup(0);
        let mut console = BufferedConsole::with_input(b"k");
        regs.cond = crate::cpu::registers::Condition::Negative;

        execute(TrapVector::Getc, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();

        assert_eq!(regs.get(Reg::R0), b'k' as u16);
        assert!(console.output().is_empty());
        assert_eq!(regs.cond, crate::cpu::registers::Condition::Negative);
    }

    #[test]
    fn test_in_prompts_and_echoes() {
        let (mut regs, mem, _) = setup(0);
        let mut console = BufferedConsole::with_input(b"y");

        execute(TrapVector::In, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();

        assert_eq!(regs.get(Reg::R0), b'y' as u16);
        assert_eq!(console.output_string(), "Enter a character: y");
    }

    #[test]
    fn test_in_prompts_once_while_waiting() {
        let (mut regs, mem, mut console) = setup(0);
        let mut state = TrapState::default();

        for _ in 0..3 {
            let err = execute(TrapVector::In, &mut regs, &mem, &mut state, &mut console).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
            assert!(state.prompted);
        }

        console.push_input(b"q");
        execute(TrapVector::In, &mut regs, &mem, &mut state, &mut console).unwrap();

        assert_eq!(console.output_string(), "Enter a character: q");
        assert!(!state.prompted);
    }

    #[test]
    fn test_getc_without_input_fails() {
        let (mut regs, mem, mut console) = setup(0);
        let err = execute(TrapVector::Getc, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_halt() {
        let (mut regs, mem, mut console) = setup(0);
        let outcome = execute(TrapVector::Halt, &mut regs, &mem, &mut TrapState::default(), &mut console).unwrap();
        assert_eq!(outcome, TrapOutcome::Halt);
        assert_eq!(console.output_string(), "HALT\n");
    }
}
