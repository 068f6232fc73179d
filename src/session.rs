//! Session controller: launches the command, runs the relays, and turns the
//! way the session ended into a process exit code.

use crate::config::SessionConfig;
use crate::pty::PtySession;
use crate::pty_reader::spawn_reader;
use crate::relay::{OutputRelay, spawn_input_relay};
use crate::resize::spawn_resize_propagator;
use crate::state::{SessionState, SharedState};
use crate::terminal::RawModeGuard;
use anyhow::Result;
use portable_pty::ExitStatus;
use std::io::{self, Read, Write};
use std::thread;
use tokio::task::JoinError;
use tracing::{debug, info};

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub exit_code: u8,
}

/// Runs one command under a PTY and answers its password prompt.
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session { config }
    }

    /// Run against the real stdin/stdout, with the invoking terminal in raw
    /// mode while the child runs.
    ///
    /// Only a launch failure is returned as an error; every other outcome is
    /// folded into [`SessionOutcome::exit_code`].
    pub async fn run(self) -> Result<SessionOutcome> {
        let launched = self.launch()?;
        let _raw_mode = RawModeGuard::acquire();
        Ok(self.drive(launched, io::stdin(), io::stdout()).await)
    }

    /// Like [`Session::run`] but relaying `input` and `output` instead of the
    /// process's standard streams, and leaving terminal modes alone.
    pub async fn run_with<I, O>(self, input: I, output: O) -> Result<SessionOutcome>
    where
        I: Read + Send + 'static,
        O: Write + Send + 'static,
    {
        let launched = self.launch()?;
        Ok(self.drive(launched, input, output).await)
    }

    fn launch(&self) -> Result<(PtySession, Box<dyn Read + Send>)> {
        info!("Starting command: {}", self.config.command.display());
        let (pty, reader) = PtySession::spawn(
            &self.config.command,
            self.config.initial_rows,
            self.config.initial_cols,
        )?;
        debug!("child started with pid {:?}", pty.process_id());
        Ok((pty, reader))
    }

    async fn drive<I, O>(
        self,
        (mut pty, reader): (PtySession, Box<dyn Read + Send>),
        input: I,
        output: O,
    ) -> SessionOutcome
    where
        I: Read + Send + 'static,
        O: Write + Send + 'static,
    {
        let config = self.config;
        let state = SharedState::new();
        let writer = pty.writer();

        let resize_task = spawn_resize_propagator(pty.resizer());

        let chunks = spawn_reader(reader, config.read_chunk);
        let relay = OutputRelay::new(
            &config.prompt,
            config.secret,
            writer.clone(),
            pty.killer(config.kill_grace),
            state.clone(),
            output,
        )
        .with_verbose(config.verbose);
        let poll_interval = config.poll_interval;
        let output_thread = thread::spawn(move || relay.run(chunks, poll_interval));

        // Not joined: blocks on stdin until the process exits.
        spawn_input_relay(input, writer, state.clone(), config.input_delay);

        let waited = tokio::task::spawn_blocking(move || pty.wait())
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));

        // Let the relay drain trailing output before deciding the outcome, so
        // a repeated prompt printed just before exit still counts.
        state.request_termination();
        let joined = tokio::task::spawn_blocking(move || output_thread.join()).await;
        match RelayJoin::from(joined) {
            RelayJoin::Finished => {}
            RelayJoin::Panicked => debug!("output relay panicked"),
            RelayJoin::Unjoinable => debug!("could not wait for the output relay"),
        }
        state.transition(SessionState::TerminatedChildExit);

        if let Some(task) = resize_task {
            task.abort();
        }

        if let Err(e) = &waited {
            debug!("command failed: {e}");
        }

        let final_state = state.get();
        SessionOutcome {
            state: final_state,
            exit_code: derive_exit_code(final_state, &waited),
        }
    }
}

/// How waiting for the output relay thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayJoin {
    Finished,
    /// The relay thread itself panicked.
    Panicked,
    /// The blocking task that joins the thread failed.
    Unjoinable,
}

impl From<Result<thread::Result<()>, JoinError>> for RelayJoin {
    fn from(joined: Result<thread::Result<()>, JoinError>) -> Self {
        match joined {
            Ok(Ok(())) => RelayJoin::Finished,
            Ok(Err(_)) => RelayJoin::Panicked,
            Err(_) => RelayJoin::Unjoinable,
        }
    }
}

/// Exit code for the whole run.
///
/// Forced terminations exit 1 whatever the child reported. Otherwise the
/// child's own code is passed through, and a failed wait is 1.
pub fn derive_exit_code(state: SessionState, waited: &io::Result<ExitStatus>) -> u8 {
    if state.is_forced() {
        return 1;
    }
    match waited {
        Ok(status) => u8::try_from(status.exit_code()).unwrap_or(1),
        Err(_) => 1,
    }
}
