//! Session state shared between the controller and the relays.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Running = 0,
    PasswordSent = 1,
    TerminatedWrongPassword = 2,
    TerminatedHostPrompt = 3,
    TerminatedChildExit = 4,
    TerminatedIoError = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::PasswordSent,
            2 => Self::TerminatedWrongPassword,
            3 => Self::TerminatedHostPrompt,
            4 => Self::TerminatedChildExit,
            5 => Self::TerminatedIoError,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running | Self::PasswordSent)
    }

    /// Terminations decided by us rather than by the child.
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            Self::TerminatedWrongPassword | Self::TerminatedHostPrompt
        )
    }
}

/// Shared, lock-free handle on the session state and termination flag.
///
/// Terminal states are sticky: once one is recorded, later transitions are
/// ignored.
#[derive(Debug, Clone)]
pub struct SharedState {
    state: Arc<AtomicU8>,
    terminate: Arc<AtomicBool>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(SessionState::Running as u8)),
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `next` unless a terminal state was already recorded. Returns
    /// whether the transition took effect.
    pub fn transition(&self, next: SessionState) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if SessionState::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .is_ok()
    }

    pub fn request_termination(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
