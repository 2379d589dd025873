//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::console::Console;
use crate::cpu::decode::{self, DecodeError, Instruction, Operand};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::{Reg, Registers};
use crate::cpu::trap::{self, TrapOutcome, TrapState};
use crate::program::disasm;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tracing::{error, trace};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed the HALT trap).
    Halted,
    /// CPU fetched an instruction it cannot execute.
    Fault,
}

/// The LC-3 CPU: register file, memory and run state.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    /// Trap progress kept across a retried step.
    #[serde(default)]
    traps: TrapState,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

/// Register-level view of a CPU, without memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub registers: Registers,
    pub state: CpuState,
    pub cycles: u64,
}

impl Cpu {
    /// Create a new CPU with zeroed state and PC at x3000.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            traps: TrapState::default(),
            last_instr: None,
        }
    }

    /// Reset the CPU to initial state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.traps = TrapState::default();
        self.last_instr = None;
    }

    /// Load words at `origin` and point the PC at them.
    pub fn load_program(&mut self, origin: u16, words: &[u16]) -> Result<(), MemoryError> {
        self.mem.load(origin, words)?;
        self.regs.jump(origin);
        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed. A decode fault moves the
    /// CPU to [`CpuState::Fault`]. A console failure inside a trap leaves
    /// the PC on the trap so the step can be retried.
    pub fn step<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch
        let pc = self.regs.pc;
        let raw = self.mem.read(pc, console);
        self.regs.advance_pc();

        // Decode
        let instr = match decode::decode(raw) {
            Ok(instr) => instr,
            Err(e) => {
                error!(pc = %disasm::hex(pc), "{}", e);
                self.state = CpuState::Fault;
                return Err(e.into());
            }
        };

        trace!(
            pc = %disasm::hex(pc),
            word = %disasm::hex(raw),
            "{}",
            disasm::format_instruction(&instr, self.regs.pc)
        );

        // Execute
        if let Err(e) = self.execute(instr, console) {
            self.regs.jump(pc);
            return Err(e);
        }

        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(console)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited<C: Console + ?Sized>(
        &mut self,
        max_cycles: u64,
        console: &mut C,
    ) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(console)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction. The PC already points past it.
    fn execute<C: Console + ?Sized>(&mut self, instr: Instruction, console: &mut C) -> Result<(), CpuError> {
        match instr {
            // ==================== Operate ====================

            Instruction::Add { dr, sr1, src2 } => {
                let value = self.regs.get(sr1).wrapping_add(self.operand(src2));
                self.regs.set_with_flags(dr, value);
            }

            Instruction::And { dr, sr1, src2 } => {
                let value = self.regs.get(sr1) & self.operand(src2);
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Not { dr, sr } => {
                let value = !self.regs.get(sr);
                self.regs.set_with_flags(dr, value);
            }

            // ==================== Data Movement ====================

            Instruction::Ld { dr, offset } => {
                let addr = self.regs.pc_relative(offset);
                let value = self.mem.read(addr, console);
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Ldi { dr, offset } => {
                let pointer = self.mem.read(self.regs.pc_relative(offset), console);
                let value = self.mem.read(pointer, console);
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.base_relative(base, offset);
                let value = self.mem.read(addr, console);
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Lea { dr, offset } => {
                let addr = self.regs.pc_relative(offset);
                self.regs.set_with_flags(dr, addr);
            }

            Instruction::St { sr, offset } => {
                let addr = self.regs.pc_relative(offset);
                self.mem.write(addr, self.regs.get(sr));
            }

            Instruction::Sti { sr, offset } => {
                let addr = self.mem.read(self.regs.pc_relative(offset), console);
                self.mem.write(addr, self.regs.get(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.base_relative(base, offset);
                self.mem.write(addr, self.regs.get(sr));
            }

            // ==================== Control ====================

            Instruction::Br { nzp, offset } => {
                if self.regs.branch_taken(nzp) {
                    let target = self.regs.pc_relative(offset);
                    self.regs.jump(target);
                }
            }

            Instruction::Jmp { base } => {
                let target = self.regs.get(base);
                self.regs.jump(target);
            }

            Instruction::Jsr { offset } => {
                let target = self.regs.pc_relative(offset);
                self.regs.set(Reg::R7, self.regs.pc);
                self.regs.jump(target);
            }

            Instruction::Jsrr { base } => {
                // R7 is written before the base is read, so JSRR R7 falls through.
                self.regs.set(Reg::R7, self.regs.pc);
                let target = self.regs.get(base);
                self.regs.jump(target);
            }

            Instruction::Trap { vector } => {
                let outcome = trap::execute(vector, &mut self.regs, &self.mem, &mut self.traps, console)?;
                if outcome == TrapOutcome::Halt {
                    self.state = CpuState::Halted;
                }
            }
        }

        Ok(())
    }

    /// Value of the second ADD/AND operand.
    #[inline]
    fn operand(&self, src2: Operand) -> u16 {
        match src2 {
            Operand::Reg(reg) => self.regs.get(reg),
            Operand::Imm(imm) => imm as u16,
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Register state, run state and cycle count.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.regs.clone(),
            state: self.state,
            cycles: self.cycles,
        }
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("console I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CpuError {
    /// A trap is waiting for keyboard input that a non-blocking console
    /// does not have yet.
    pub fn is_waiting_for_input(&self) -> bool {
        matches!(self, CpuError::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
    }

    /// The user interrupted a console read.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, CpuError::Io(e) if e.kind() == io::ErrorKind::Interrupted)
    }
}
