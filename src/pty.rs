use crate::config::Command;
use anyhow::{Context, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use portable_pty::{Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Write half of the PTY, shared by the output relay (secret injection) and
/// the input relay (forwarded keystrokes).
pub type PtyWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Manages the target command running inside a PTY
pub struct PtySession {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    child: Box<dyn Child + Send + Sync>,
    writer: PtyWriter,
    exited: Arc<AtomicBool>,
}

impl PtySession {
    /// Spawn `command` in a new PTY, returning the session and reader separately.
    ///
    /// The child becomes a session leader with the PTY as its controlling
    /// terminal and stdin, stdout and stderr attached to it.
    pub fn spawn(command: &Command, rows: u16, cols: u16) -> Result<(Self, Box<dyn Read + Send>)> {
        let pty_system = portable_pty::native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&command.program);
        for arg in &command.args {
            cmd.arg(arg);
        }
        // portable-pty falls back to $HOME otherwise.
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn command `{}`", command.program))?;

        // Keeping the slave open here would hide EOF from the reader.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let session = PtySession {
            master: Arc::new(Mutex::new(pair.master)),
            child,
            writer: Arc::new(Mutex::new(writer)),
            exited: Arc::new(AtomicBool::new(false)),
        };

        Ok((session, reader))
    }

    pub fn writer(&self) -> PtyWriter {
        Arc::clone(&self.writer)
    }

    pub fn resizer(&self) -> PtyResizer {
        PtyResizer {
            master: Arc::clone(&self.master),
        }
    }

    /// A handle that can terminate the child while another thread waits on it.
    ///
    /// The child gets portable-pty's hangup first; its process group is
    /// killed outright if it is still running after `grace`.
    pub fn killer(&self, grace: Duration) -> Box<dyn ChildKiller + Send + Sync> {
        Box::new(ChildTerminator {
            hangup: self.child.clone_killer(),
            pid: self.child.process_id(),
            exited: Arc::clone(&self.exited),
            grace,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Block until the child process exits
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait();
        self.exited.store(true, Ordering::SeqCst);
        status
    }
}

/// Hangup, then SIGKILL to the process group once `grace` has passed without
/// the child being reaped.
#[derive(Debug)]
struct ChildTerminator {
    hangup: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
    grace: Duration,
}

impl ChildKiller for ChildTerminator {
    fn kill(&mut self) -> io::Result<()> {
        let hung_up = self.hangup.kill();

        // The child is a session leader, so its pid is also its process group.
        if let Some(pgid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
            let exited = Arc::clone(&self.exited);
            let grace = self.grace;
            thread::spawn(move || {
                let deadline = Instant::now() + grace;
                while Instant::now() < deadline {
                    if exited.load(Ordering::SeqCst) {
                        return;
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                if exited.load(Ordering::SeqCst) {
                    return;
                }
                debug!("child ignored hangup, sending SIGKILL");
                if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                    debug!("failed to kill child process group: {e}");
                }
            });
        }

        hung_up
    }

    fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        Box::new(ChildTerminator {
            hangup: self.hangup.clone_killer(),
            pid: self.pid,
            exited: Arc::clone(&self.exited),
            grace: self.grace,
        })
    }
}

/// Applies window sizes to the PTY from any thread.
#[derive(Clone)]
pub struct PtyResizer {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
}

impl PtyResizer {
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let master = self
            .master
            .lock()
            .map_err(|_| anyhow::anyhow!("PTY master lock poisoned"))?;
        master.resize(size).context("Failed to resize PTY")?;
        Ok(())
    }
}

/// Write `data` to the PTY as one locked, flushed write.
pub fn write_to(writer: &PtyWriter, data: &[u8]) -> io::Result<()> {
    let mut writer = writer
        .lock()
        .map_err(|_| io::Error::other("PTY writer lock poisoned"))?;
    writer.write_all(data)?;
    writer.flush()
}
