//! Guaranteed outer-terminal setup/teardown (§5 "Raw mode", §6
//! "Outer-terminal escape usage"). Enters raw mode and the exact
//! escape sequence the renderer assumes on entry; `Drop` guarantees
//! the inverse sequence runs even on an early return or panic unwind.

use std::io::{self, Write};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

const ENTER_SEQUENCE: &[u8] = b"\x1b[?1049h\x1b[2J\x1b[3J\x1b[H\x1b[0m\x1b(B\x1b)0\x0f\x1b[?25l\x1b[?1000h\x1b[?1006h";
const LEAVE_SEQUENCE: &[u8] = b"\x1b[?1006l\x1b[?1000l\x1b[0m\x1b[?25h\x1b[?1049l";

pub struct TerminalGuard {
    active: bool,
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = stdout.write_all(ENTER_SEQUENCE).and_then(|_| stdout.flush()) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        Ok(TerminalGuard { active: true })
    }

    /// Restores the outer terminal. Idempotent so it's safe to call
    /// explicitly before the value is also dropped.
    pub fn leave(&mut self) {
        if !self.active {
            return;
        }
        let mut stdout = io::stdout();
        let _ = stdout.write_all(LEAVE_SEQUENCE);
        let _ = stdout.flush();
        let _ = disable_raw_mode();
        self.active = false;
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_leave_sequences_are_well_formed_escapes() {
        assert!(ENTER_SEQUENCE.starts_with(b"\x1b[?1049h"));
        assert!(LEAVE_SEQUENCE.ends_with(b"\x1b[?1049l"));
    }

    #[test]
    fn leave_is_idempotent_without_a_live_terminal() {
        let mut guard = TerminalGuard { active: false };
        guard.leave();
        assert!(!guard.active);
    }
}
