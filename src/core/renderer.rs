//! Terminal status line rendering
//!
//! The renderer owns the single physical status ("flash") line. It lives
//! inside the registry lock, so flash frames and ordinary log lines are
//! serialized and never interleave on the terminal.

use super::destination::Destination;
use std::io::IsTerminal;

/// Width used when the terminal size cannot be queried
pub const FALLBACK_WIDTH: usize = 80;

/// Which process streams are attached to a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalState {
    pub stdout_tty: bool,
    pub stderr_tty: bool,
}

impl TerminalState {
    pub fn detect() -> Self {
        Self {
            stdout_tty: std::io::stdout().is_terminal(),
            stderr_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Both streams piped or redirected
    pub fn piped() -> Self {
        Self {
            stdout_tty: false,
            stderr_tty: false,
        }
    }

    pub fn interactive() -> Self {
        Self {
            stdout_tty: true,
            stderr_tty: true,
        }
    }
}

/// Usable terminal width: one column less than the window, so a full
/// status line never wraps.
pub fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((columns, _)) if columns > 1 => usize::from(columns) - 1,
        _ => FALLBACK_WIDTH,
    }
}

#[derive(Debug)]
pub struct LineRenderer {
    terminal: TerminalState,
    width_override: Option<usize>,
    erase_pending: bool,
    last_flash_len: usize,
}

impl LineRenderer {
    pub fn new(terminal: TerminalState, width_override: Option<usize>) -> Self {
        Self {
            terminal,
            width_override,
            erase_pending: false,
            last_flash_len: 0,
        }
    }

    pub fn terminal(&self) -> TerminalState {
        self.terminal
    }

    pub fn width(&self) -> usize {
        self.width_override.unwrap_or_else(terminal_width)
    }

    pub fn erase_pending(&self) -> bool {
        self.erase_pending
    }

    /// Whether a write to `destination` lands on the terminal that shows
    /// the status line. Erasing is pointless, and harmful to redirected
    /// logs, when stderr itself is piped.
    pub fn is_attached(&self, destination: &Destination) -> bool {
        if !self.terminal.stderr_tty {
            return false;
        }
        match destination {
            Destination::Stdout => self.terminal.stdout_tty,
            Destination::Stderr => true,
            Destination::Discard | Destination::Writer(_) => false,
        }
    }

    /// Erase sequence for the displayed flash line, if a write to
    /// `destination` must clear it first.
    pub fn take_erase(&mut self, destination: &Destination) -> Option<Vec<u8>> {
        if self.erase_pending && self.is_attached(destination) {
            Some(self.erase_sequence())
        } else {
            None
        }
    }

    /// `\r`, blanks over the last flash, `\r`
    pub fn erase_sequence(&mut self) -> Vec<u8> {
        let mut seq = Vec::with_capacity(self.last_flash_len + 2);
        seq.push(b'\r');
        seq.resize(self.last_flash_len + 1, b' ');
        seq.push(b'\r');
        self.erase_pending = false;
        seq
    }

    /// Bytes to put on the terminal for a flash of `line`, or `None` when
    /// stderr is not a terminal.
    pub fn compose_flash(&mut self, line: &str) -> Option<Vec<u8>> {
        if !self.terminal.stderr_tty {
            return None;
        }
        let width = self.width();
        let shown: String = if line.chars().count() > width {
            line.chars().take(width).collect()
        } else {
            line.to_string()
        };
        let bytes = shown.into_bytes();
        self.erase_pending = true;
        self.last_flash_len = bytes.len().min(width);
        Some(bytes)
    }
}
