//! Host console devices.
//!
//! The VM talks to the outside world through a byte-oriented console:
//! a keyboard that can be polled or read, and a display that takes single
//! bytes. The caller owns the console and lends it to the CPU for each step.

use std::collections::VecDeque;
use std::io;

/// Byte-oriented host console used by the keyboard registers and traps.
pub trait Console {
    /// Non-blocking check for a pending key. Consumes it if present.
    fn poll_key(&mut self) -> Option<u8>;

    /// Blocking read of a single key.
    fn read_key(&mut self) -> io::Result<u8>;

    /// Write one byte to the display.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Flush pending display output.
    fn flush(&mut self) -> io::Result<()>;

    /// Write a run of bytes to the display.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Whether the user asked to stop execution (e.g. Ctrl-C in raw mode).
    fn interrupted(&self) -> bool {
        false
    }
}

/// In-memory console with a queued keyboard and a captured display.
///
/// `read_key` on an empty queue fails with [`io::ErrorKind::WouldBlock`]
/// instead of blocking, which lets a driver feed input and retry.
#[derive(Debug, Clone, Default)]
pub struct BufferedConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console with keyboard input already queued.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    /// Queue keys for the program to read.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Number of queued keys not yet read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Captured output, lossily decoded.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Drain the captured output.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Console for BufferedConsole {
    fn poll_key(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn read_key(&mut self) -> io::Result<u8> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no keyboard input queued"))
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "term")]
pub use terminal::TerminalConsole;

#[cfg(feature = "tui")]
pub(crate) use terminal::key_to_byte;

#[cfg(feature = "term")]
mod terminal {
    use super::Console;
    use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
    use crossterm::terminal;
    use std::io::{self, Stdout, Write};
    use std::time::Duration;
    use tracing::{debug, warn};

    /// Console backed by the host terminal in raw mode.
    ///
    /// Raw mode is entered on construction and restored on drop. Ctrl-C no
    /// longer raises a signal in raw mode, so it is reported through
    /// [`Console::interrupted`] and as an [`io::ErrorKind::Interrupted`] read.
    pub struct TerminalConsole {
        out: Stdout,
        interrupted: bool,
    }

    impl TerminalConsole {
        pub fn new() -> io::Result<Self> {
            terminal::enable_raw_mode()?;
            debug!("terminal switched to raw mode");
            Ok(Self {
                out: io::stdout(),
                interrupted: false,
            })
        }

        /// Wait for the next key that maps to a byte.
        ///
        /// With a timeout, returns `Ok(None)` once no event is pending.
        fn next_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
            loop {
                if let Some(timeout) = timeout {
                    if !event::poll(timeout)? {
                        return Ok(None);
                    }
                }

                let Event::Key(key) = event::read()? else {
                    continue;
                };
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                if is_interrupt(&key) {
                    self.interrupted = true;
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted by user"));
                }
                if let Some(byte) = key_to_byte(&key) {
                    return Ok(Some(byte));
                }
            }
        }
    }

    impl Console for TerminalConsole {
        fn poll_key(&mut self) -> Option<u8> {
            match self.next_byte(Some(Duration::ZERO)) {
                Ok(byte) => byte,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => None,
                Err(e) => {
                    warn!("keyboard poll failed: {}", e);
                    None
                }
            }
        }

        fn read_key(&mut self) -> io::Result<u8> {
            loop {
                if let Some(byte) = self.next_byte(None)? {
                    return Ok(byte);
                }
            }
        }

        fn write_byte(&mut self, byte: u8) -> io::Result<()> {
            // Raw mode disables output post-processing.
            if byte == b'\n' {
                self.out.write_all(b"\r\n")
            } else {
                self.out.write_all(&[byte])
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            self.out.flush()
        }

        fn interrupted(&self) -> bool {
            self.interrupted
        }
    }

    impl Drop for TerminalConsole {
        fn drop(&mut self) {
            let _ = self.out.flush();
            if let Err(e) = terminal::disable_raw_mode() {
                warn!("failed to restore terminal mode: {}", e);
            }
        }
    }

    fn is_interrupt(key: &KeyEvent) -> bool {
        key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
    }

    /// Map a key press to the byte an LC-3 program expects.
    pub(crate) fn key_to_byte(key: &KeyEvent) -> Option<u8> {
        match key.code {
            KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() => {
                Some((c.to_ascii_lowercase() as u8) - b'a' + 1)
            }
            KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
            KeyCode::Enter => Some(b'\n'),
            KeyCode::Tab => Some(b'\t'),
            KeyCode::Backspace => Some(0x08),
            KeyCode::Esc => Some(0x1B),
            _ => None,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_key_to_byte() {
            let key = |code, modifiers| KeyEvent::new(code, modifiers);
            assert_eq!(key_to_byte(&key(KeyCode::Char('a'), KeyModifiers::NONE)), Some(b'a'));
            assert_eq!(key_to_byte(&key(KeyCode::Char('A'), KeyModifiers::SHIFT)), Some(b'A'));
            assert_eq!(key_to_byte(&key(KeyCode::Enter, KeyModifiers::NONE)), Some(b'\n'));
            assert_eq!(key_to_byte(&key(KeyCode::Char('d'), KeyModifiers::CONTROL)), Some(0x04));
            assert_eq!(key_to_byte(&key(KeyCode::Char('é'), KeyModifiers::NONE)), None);
            assert_eq!(key_to_byte(&key(KeyCode::F(1), KeyModifiers::NONE)), None);
        }

        #[test]
        fn test_ctrl_c_is_interrupt() {
            assert!(is_interrupt(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
            assert!(!is_interrupt(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_input_order() {
        let mut console = BufferedConsole::with_input(b"ab");
        assert_eq!(console.pending_input(), 2);
        assert_eq!(console.poll_key(), Some(b'a'));
        assert_eq!(console.read_key().unwrap(), b'b');
        assert_eq!(console.poll_key(), None);
    }

    #[test]
    fn test_buffered_read_would_block() {
        let mut console = BufferedConsole::new();
        let err = console.read_key().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        console.push_input(b"x");
        assert_eq!(console.read_key().unwrap(), b'x');
    }

    #[test]
    fn test_buffered_output_capture() {
        let mut console = BufferedConsole::new();
        console.write_bytes(b"HI").unwrap();
        console.write_byte(b'!').unwrap();
        assert_eq!(console.output_string(), "HI!");
        assert_eq!(console.take_output(), b"HI!".to_vec());
        assert!(console.output().is_empty());
    }
}
