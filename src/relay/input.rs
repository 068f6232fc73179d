//! Input relay: forwards the user's keystrokes to the child.

use crate::pty::{PtyWriter, write_to};
use crate::state::SharedState;
use std::io::{self, Read};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Copy `input` to the PTY after `delay`, until EOF, a write failure, or a
/// termination request.
///
/// The delay keeps typed bytes from landing in the middle of the secret
/// line. The thread blocks in `read` and is abandoned at exit rather than
/// joined.
pub fn spawn_input_relay<R: Read + Send + 'static>(
    mut input: R,
    writer: PtyWriter,
    state: SharedState,
    delay: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(delay);

        let mut buffer = [0u8; 1024];
        while !state.should_terminate() {
            let n = match input.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("error reading stdin: {e}");
                    break;
                }
            };
            if state.should_terminate() {
                break;
            }
            if let Err(e) = write_to(&writer, &buffer[..n]) {
                debug!("error writing to pty: {e}");
                break;
            }
        }
    })
}
