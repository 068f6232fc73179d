//! Raw mode for the invoking terminal for the duration of a session.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use std::io::{self, IsTerminal};
use tracing::debug;

/// Puts the real stdin terminal into raw mode and restores the captured mode
/// when dropped.
///
/// Does nothing when stdin is not a terminal. Failures to switch or restore
/// are only logged.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    pub fn acquire() -> Self {
        if !io::stdin().is_terminal() {
            debug!("stdin is not a terminal, leaving terminal mode alone");
            return Self { active: false };
        }
        // Already raw means someone else owns the saved mode.
        if is_raw_mode_enabled().unwrap_or(false) {
            return Self { active: false };
        }
        match enable_raw_mode() {
            Ok(()) => Self { active: true },
            Err(e) => {
                debug!("failed to set raw mode: {e}");
                Self { active: false }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Restore the captured mode now instead of at drop.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = disable_raw_mode() {
            debug!("failed to restore terminal state: {e}");
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
