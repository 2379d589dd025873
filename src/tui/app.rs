//! Debugger application state and logic.

use crate::console::{key_to_byte, BufferedConsole};
use crate::cpu::Cpu;
use crate::program::disasm::{disassemble_word, format_instruction, hex};
use crossterm::event::{KeyCode, KeyEvent};
use std::collections::HashSet;

/// Instructions executed per UI tick while running.
const STEPS_PER_TICK: usize = 2_000;

/// Program output kept on screen, in bytes.
const OUTPUT_LIMIT: usize = 16 * 1024;

/// Where key presses go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keys are debugger commands.
    Command,
    /// Keys are typed into the program's keyboard.
    Keyboard,
}

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Machine state to return to on reset.
    initial: Cpu,
    /// Console lent to the CPU.
    pub console: BufferedConsole,
    /// Program output collected so far.
    pub output: String,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Is the program blocked in GETC/IN?
    pub waiting_for_input: bool,
    /// Where key presses go.
    pub mode: InputMode,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First address shown in the memory view.
    pub mem_scroll: u16,
}

impl DebuggerApp {
    /// Create a new debugger around a prepared CPU.
    pub fn new(cpu: Cpu) -> Self {
        let mem_scroll = cpu.regs.pc;
        Self {
            initial: cpu.clone(),
            cpu,
            console: BufferedConsole::new(),
            output: String::new(),
            breakpoints: HashSet::new(),
            running: false,
            waiting_for_input: false,
            mode: InputMode::Command,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step(&mut self.console) {
            Ok(instr) => {
                self.waiting_for_input = false;
                self.status = format!("{}: {}", hex(pc), format_instruction(&instr, pc.wrapping_add(1)));
            }
            Err(e) if e.is_waiting_for_input() => {
                self.waiting_for_input = true;
                self.status = "Waiting for keyboard input. Press F2 to type.".into();
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
        self.collect_output();
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Pause continuous execution.
    pub fn pause(&mut self) {
        self.running = false;
        self.status = "Paused.".into();
    }

    /// Blocked in GETC/IN with nothing typed yet.
    pub fn is_blocked(&self) -> bool {
        self.waiting_for_input && self.console.pending_input() == 0
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        if self.is_blocked() {
            return;
        }

        for _ in 0..STEPS_PER_TICK {
            if !self.running {
                return;
            }

            if !self.cpu.is_running() {
                self.running = false;
                self.status = format!("{:?} after {} cycles", self.cpu.state, self.cpu.cycles);
                return;
            }

            self.step();
            if self.waiting_for_input {
                return;
            }

            // Check for breakpoint after stepping so a resume leaves it.
            let pc = self.cpu.regs.pc;
            if self.running && self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at {}", hex(pc));
                return;
            }
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at {}", hex(pc));
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at {}", hex(pc));
        }
    }

    /// Switch between command keys and program keyboard input.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            InputMode::Command => {
                self.status = "Typing into the program. F2 returns to commands.".into();
                InputMode::Keyboard
            }
            InputMode::Keyboard => {
                self.status = "Command mode.".into();
                InputMode::Command
            }
        };
    }

    /// Dispatch a key press according to the input mode.
    pub fn handle_key(&mut self, key: &KeyEvent) {
        match (self.mode, key.code) {
            (_, KeyCode::F(2)) => self.toggle_mode(),
            (InputMode::Keyboard, _) => self.type_key(key),
            (InputMode::Command, KeyCode::Char('q')) => self.should_quit = true,
            (InputMode::Command, KeyCode::Char('s')) => {
                self.running = false;
                self.step();
            }
            (InputMode::Command, KeyCode::Char('r')) => self.run(),
            (InputMode::Command, KeyCode::Char('p')) => self.pause(),
            (InputMode::Command, KeyCode::Char('b')) => self.toggle_breakpoint(),
            (InputMode::Command, KeyCode::Char('x')) => self.reset(),
            (InputMode::Command, KeyCode::Char('g')) => self.follow_pc(),
            (InputMode::Command, KeyCode::Up) => self.scroll_memory(-1),
            (InputMode::Command, KeyCode::Down) => self.scroll_memory(1),
            (InputMode::Command, KeyCode::PageUp) => self.scroll_memory(-16),
            (InputMode::Command, KeyCode::PageDown) => self.scroll_memory(16),
            _ => {}
        }
    }

    /// Feed a key press to the program's keyboard.
    pub fn type_key(&mut self, key: &KeyEvent) {
        if let Some(byte) = key_to_byte(key) {
            self.console.push_input(&[byte]);
            self.waiting_for_input = false;
        }
    }

    /// Reset CPU to initial state.
    pub fn reset(&mut self) {
        self.cpu = self.initial.clone();
        self.console = BufferedConsole::new();
        self.output.clear();
        self.running = false;
        self.waiting_for_input = false;
        self.mem_scroll = self.cpu.regs.pc;
        self.status = "Reset. Ready.".into();
    }

    /// Scroll the memory view by `delta` words.
    pub fn scroll_memory(&mut self, delta: i32) {
        self.mem_scroll = self.mem_scroll.wrapping_add(delta as u16);
    }

    /// Move the memory view to the PC.
    pub fn follow_pc(&mut self) {
        self.mem_scroll = self.cpu.regs.pc;
    }

    /// Get disassembly around the current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.cpu.regs.pc;
        let start = pc.wrapping_sub((lines / 2) as u16);

        (0..lines)
            .map(|i| {
                let addr = start.wrapping_add(i as u16);
                let word = self.cpu.mem.peek(addr);
                (addr, disassemble_word(word, addr), addr == pc)
            })
            .collect()
    }

    /// Move new console output into the on-screen buffer.
    fn collect_output(&mut self) {
        let bytes = self.console.take_output();
        if bytes.is_empty() {
            return;
        }
        self.output.push_str(&String::from_utf8_lossy(&bytes));
        if self.output.len() > OUTPUT_LIMIT {
            let mut cut = self.output.len() - OUTPUT_LIMIT;
            while !self.output.is_char_boundary(cut) {
                cut += 1;
            }
            self.output.drain(..cut);
        }
    }
}

/// Run the debugger on a prepared CPU.
pub fn run_debugger(cpu: Cpu) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(cpu);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        // Only spin while there is work to do.
        let timeout = if app.running && !app.is_blocked() {
            Duration::ZERO
        } else {
            Duration::from_millis(50)
        };
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(&key);
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Instruction};
    use crate::cpu::registers::{Reg, PC_START};
    use crate::cpu::TrapVector;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app_with(instructions: &[Instruction]) -> DebuggerApp {
        let words: Vec<u16> = instructions.iter().map(encode).collect();
        let mut cpu = Cpu::new();
        cpu.load_program(PC_START, &words).unwrap();
        DebuggerApp::new(cpu)
    }

    #[test]
    fn test_step_and_reset() {
        let mut app = app_with(&[
            Instruction::Lea { dr: Reg::R0, offset: 0 },
            Instruction::Trap { vector: TrapVector::Halt },
        ]);

        app.step();
        assert_eq!(app.cpu.regs.get(Reg::R0), PC_START + 1);
        assert!(app.status.contains("LEA R0"));

        app.reset();
        assert_eq!(app.cpu.regs.get(Reg::R0), 0);
        assert_eq!(app.cpu.regs.pc, PC_START);
    }

    #[test]
    fn test_run_collects_output() {
        let mut app = app_with(&[Instruction::Trap { vector: TrapVector::Halt }]);
        app.run();
        app.tick();

        assert!(app.cpu.is_halted());
        assert!(!app.running);
        assert_eq!(app.output, "HALT\n");
    }

    #[test]
    fn test_breakpoint_stops_run() {
        let mut app = app_with(&[
            Instruction::Br { nzp: 0, offset: 0 },
            Instruction::Br { nzp: 0, offset: 0 },
            Instruction::Trap { vector: TrapVector::Halt },
        ]);
        app.breakpoints.insert(PC_START + 1);

        app.run();
        app.tick();
        assert!(!app.running);
        assert_eq!(app.cpu.regs.pc, PC_START + 1);

        // Resuming from the breakpoint moves past it.
        app.run();
        app.tick();
        assert!(app.cpu.is_halted());
    }

    #[test]
    fn test_toggle_breakpoint() {
        let mut app = app_with(&[Instruction::Trap { vector: TrapVector::Halt }]);
        app.toggle_breakpoint();
        assert!(app.breakpoints.contains(&PC_START));
        app.toggle_breakpoint();
        assert!(app.breakpoints.is_empty());
    }

    #[test]
    fn test_typed_keys_reach_getc() {
        let mut app = app_with(&[
            Instruction::Trap { vector: TrapVector::Getc },
            Instruction::Trap { vector: TrapVector::Halt },
        ]);
        app.run();
        app.tick();
        assert!(app.waiting_for_input);
        assert!(app.cpu.is_running());

        app.handle_key(&press(KeyCode::F(2)));
        app.handle_key(&press(KeyCode::Char('z')));
        app.tick();

        assert!(app.cpu.is_halted());
        assert_eq!(app.cpu.regs.get(Reg::R0), b'z' as u16);
    }

    #[test]
    fn test_in_prompt_shown_once_while_waiting() {
        let mut app = app_with(&[
            Instruction::Trap { vector: TrapVector::In },
            Instruction::Trap { vector: TrapVector::Halt },
        ]);
        app.run();
        for _ in 0..3 {
            app.tick();
        }
        assert!(app.is_blocked());
        assert!(app.running);
        assert_eq!(app.output, "Enter a character: ");

        app.handle_key(&press(KeyCode::F(2)));
        app.handle_key(&press(KeyCode::Char('k')));
        app.tick();

        assert!(app.cpu.is_halted());
        assert_eq!(app.output, "Enter a character: kHALT\n");
    }

    #[test]
    fn test_keyboard_mode_forwards_tab_and_esc() {
        let mut app = app_with(&[Instruction::Trap { vector: TrapVector::Halt }]);
        app.handle_key(&press(KeyCode::F(2)));
        assert_eq!(app.mode, InputMode::Keyboard);

        app.handle_key(&press(KeyCode::Tab));
        app.handle_key(&press(KeyCode::Esc));
        assert_eq!(app.mode, InputMode::Keyboard);
        assert_eq!(app.console.pending_input(), 2);

        app.handle_key(&press(KeyCode::F(2)));
        assert_eq!(app.mode, InputMode::Command);
        app.handle_key(&press(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let app = app_with(&[Instruction::Trap { vector: TrapVector::Halt }]);
        let lines = app.get_disassembly(5);

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2], (PC_START, "HALT".to_string(), true));
    }
}
