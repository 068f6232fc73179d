//! Keeps the PTY window size in step with the real terminal.

use crate::pty::PtyResizer;
use anyhow::Result;
use std::io;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::debug;

/// Copy the current terminal size onto the PTY now and on every SIGWINCH.
///
/// Failures, including failure to install the signal handler, are only
/// logged. The task runs until the runtime shuts down.
pub fn spawn_resize_propagator(resizer: PtyResizer) -> Option<JoinHandle<()>> {
    let mut sigwinch = match signal(SignalKind::window_change()) {
        Ok(sigwinch) => sigwinch,
        Err(e) => {
            debug!("failed to install SIGWINCH handler: {e}");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        // Initial resize
        sync_size(crossterm::terminal::size(), |rows, cols| {
            resizer.resize(rows, cols)
        });
        while sigwinch.recv().await.is_some() {
            sync_size(crossterm::terminal::size(), |rows, cols| {
                resizer.resize(rows, cols)
            });
        }
    }))
}

/// Apply a `(cols, rows)` terminal size through `apply`. Returns whether the
/// PTY was resized.
fn sync_size(size: io::Result<(u16, u16)>, apply: impl FnOnce(u16, u16) -> Result<()>) -> bool {
    let (cols, rows) = match size {
        Ok(size) => size,
        Err(e) => {
            debug!("error reading terminal size: {e}");
            return false;
        }
    };
    if rows == 0 || cols == 0 {
        debug!("ignoring empty terminal size {cols}x{rows}");
        return false;
    }
    match apply(rows, cols) {
        Ok(()) => {
            debug!("resized pty to {cols}x{rows}");
            true
        }
        Err(e) => {
            debug!("error resizing pty: {e:#}");
            false
        }
    }
}
