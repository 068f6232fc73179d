//! Output relay: forwards child output and decides when the session ends.

use crate::matcher::{Pattern, PromptMatcher};
use crate::pty::{PtyWriter, write_to};
use crate::state::{SessionState, SharedState};
use portable_pty::ChildKiller;
use secrecy::{ExposeSecret, SecretString};
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What the relay should do after handling a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Watches the PTY output for the password and host-key prompts.
///
/// Each chunk is first written verbatim to `sink`, then fed to the password
/// matcher, then to the host matcher. The secret is written at most once.
pub struct OutputRelay<O: Write> {
    password: PromptMatcher,
    host: PromptMatcher,
    secret: SecretString,
    writer: PtyWriter,
    killer: Box<dyn ChildKiller + Send + Sync>,
    state: SharedState,
    sink: O,
    secret_sent: bool,
    seen_output: bool,
    verbose: bool,
}

impl<O: Write> OutputRelay<O> {
    pub fn new(
        prompt: &str,
        secret: SecretString,
        writer: PtyWriter,
        killer: Box<dyn ChildKiller + Send + Sync>,
        state: SharedState,
        sink: O,
    ) -> Self {
        Self {
            password: PromptMatcher::new(Pattern::new(prompt)),
            host: PromptMatcher::new(Pattern::new(Pattern::HOST_AUTHENTICITY)),
            secret,
            writer,
            killer,
            state,
            sink,
            secret_sent: false,
            seen_output: false,
            verbose: false,
        }
    }

    /// Also log every chunk read, not just prompt detections.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[cfg(test)]
    pub fn secret_sent(&self) -> bool {
        self.secret_sent
    }

    /// Process one chunk of child output.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> Flow {
        if self.verbose {
            if !self.seen_output {
                debug!(
                    "searching for password prompt using match \"{}\"",
                    String::from_utf8_lossy(self.password.pattern().as_bytes())
                );
            }
            debug!("read {} bytes", chunk.len());
        }
        self.seen_output = true;

        if let Err(e) = self.forward(chunk) {
            debug!("error writing to stdout: {e}");
        }

        if self.password.feed(chunk) {
            if self.secret_sent {
                info!("detected prompt again, wrong password, terminating");
                return self.terminate(SessionState::TerminatedWrongPassword);
            }
            debug!("detected prompt, sending password");
            self.send_secret();
            self.password.reset();
        }

        if self.host.feed(chunk) {
            info!("detected host authentication prompt, exiting");
            return self.terminate(SessionState::TerminatedHostPrompt);
        }

        Flow::Continue
    }

    /// Relay chunks from `rx` until a fatal prompt, end of stream, or a
    /// termination request that is followed by a quiet `poll_interval`.
    pub fn run(mut self, rx: Receiver<io::Result<Vec<u8>>>, poll_interval: Duration) {
        let mut drain_deadline: Option<Instant> = None;

        loop {
            if self.state.should_terminate() {
                // Child is gone: keep draining what is buffered, but not forever.
                let deadline =
                    *drain_deadline.get_or_insert_with(|| Instant::now() + poll_interval * 5);
                if Instant::now() >= deadline {
                    break;
                }
            }

            match rx.recv_timeout(poll_interval) {
                Ok(Ok(chunk)) => {
                    if self.handle_chunk(&chunk) == Flow::Stop {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!("error reading from pty: {e}");
                    self.state.transition(SessionState::TerminatedIoError);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.state.should_terminate() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn forward(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.sink.write_all(chunk)?;
        self.sink.flush()
    }

    fn send_secret(&mut self) {
        let secret = self.secret.expose_secret();
        let mut line = Vec::with_capacity(secret.len() + 1);
        line.extend_from_slice(secret.as_bytes());
        line.push(b'\n');
        if let Err(e) = write_to(&self.writer, &line) {
            debug!("error writing password to pty: {e}");
        }
        self.secret_sent = true;
        self.state.transition(SessionState::PasswordSent);
    }

    fn terminate(&mut self, reason: SessionState) -> Flow {
        self.state.transition(reason);
        self.state.request_termination();
        if let Err(e) = self.killer.kill() {
            debug!("failed to terminate child: {e}");
        }
        Flow::Stop
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Default)]
    struct FakeKiller(Arc<AtomicUsize>);

    impl ChildKiller for FakeKiller {
        fn kill(&mut self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
            Box::new(self.clone())
        }
    }

    struct Harness {
        relay: OutputRelay<SharedBuf>,
        stdout: SharedBuf,
        pty_input: SharedBuf,
        kills: Arc<AtomicUsize>,
        state: SharedState,
    }

    fn harness(prompt: &str) -> Harness {
        let stdout = SharedBuf::default();
        let pty_input = SharedBuf::default();
        let killer = FakeKiller::default();
        let kills = Arc::clone(&killer.0);
        let state = SharedState::new();
        let writer: PtyWriter = Arc::new(Mutex::new(Box::new(pty_input.clone())));
        let relay = OutputRelay::new(
            prompt,
            SecretString::from("hunter2"),
            writer,
            Box::new(killer),
            state.clone(),
            stdout.clone(),
        );
        Harness {
            relay,
            stdout,
            pty_input,
            kills,
            state,
        }
    }

    #[test]
    fn test_sends_secret_once_on_prompt() {
        let mut h = harness("password");
        assert_eq!(h.relay.handle_chunk(b"login: user\n"), Flow::Continue);
        assert!(h.pty_input.contents().is_empty());
        assert_eq!(h.relay.handle_chunk(b"password: "), Flow::Continue);
        assert_eq!(h.pty_input.contents(), b"hunter2\n");
        assert_eq!(h.state.get(), SessionState::PasswordSent);
        assert_eq!(h.relay.handle_chunk(b"\r\nWelcome\r\n$ "), Flow::Continue);
        assert_eq!(h.pty_input.contents(), b"hunter2\n");
        assert_eq!(h.kills.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prompt_split_across_chunks() {
        let mut h = harness("password");
        h.relay.handle_chunk(b"user@host's pas");
        assert!(!h.relay.secret_sent());
        h.relay.handle_chunk(b"sword: ");
        assert!(h.relay.secret_sent());
    }

    #[test]
    fn test_repeated_prompt_is_wrong_password() {
        let mut h = harness("password");
        h.relay.handle_chunk(b"password: ");
        assert_eq!(
            h.relay.handle_chunk(b"\r\nPermission denied, please try again.\r\npassword: "),
            Flow::Stop
        );
        assert_eq!(h.state.get(), SessionState::TerminatedWrongPassword);
        assert!(h.state.should_terminate());
        assert_eq!(h.kills.load(Ordering::SeqCst), 1);
        assert_eq!(h.pty_input.contents(), b"hunter2\n");
    }

    #[test]
    fn test_host_prompt_terminates() {
        let mut h = harness("password");
        let flow = h.relay.handle_chunk(b"The authenticity of host 'x' can't be established.\r\n");
        assert_eq!(flow, Flow::Stop);
        assert_eq!(h.state.get(), SessionState::TerminatedHostPrompt);
        assert_eq!(h.kills.load(Ordering::SeqCst), 1);
        assert!(h.pty_input.contents().is_empty());
    }

    #[test]
    fn test_host_prompt_after_password_sent() {
        let mut h = harness("password");
        h.relay.handle_chunk(b"password: ");
        assert_eq!(
            h.relay.handle_chunk(b"The authenticity of host "),
            Flow::Stop
        );
        assert_eq!(h.state.get(), SessionState::TerminatedHostPrompt);
    }

    #[test]
    fn test_host_prompt_needs_only_prefix() {
        let mut h = harness("password");
        assert_eq!(h.relay.handle_chunk(b"The authenticity of "), Flow::Continue);
        assert_eq!(h.relay.handle_chunk(b"host "), Flow::Stop);
    }

    #[test]
    fn test_output_forwarded_verbatim() {
        let mut h = harness("password");
        h.relay.handle_chunk(b"\x1b[1mhello\x1b[0m ");
        h.relay.handle_chunk(b"password: ");
        h.relay.handle_chunk(b"password: ");
        assert_eq!(
            h.stdout.contents(),
            b"\x1b[1mhello\x1b[0m password: password: ".to_vec()
        );
    }

    #[test]
    fn test_custom_prompt() {
        let mut h = harness("Passphrase for key");
        h.relay.handle_chunk(b"password: ");
        assert!(!h.relay.secret_sent());
        h.relay.handle_chunk(b"Enter Passphrase for key '/id': ");
        assert_eq!(h.pty_input.contents(), b"hunter2\n");
    }

    fn captured_logs(verbose: bool) -> String {
        let logs = SharedBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut h = harness("password");
            h.relay = h.relay.with_verbose(verbose);
            h.relay.handle_chunk(b"password: ");
        });
        String::from_utf8_lossy(&logs.contents()).into_owned()
    }

    #[test]
    fn test_chunk_logging_only_when_verbose() {
        let quiet = captured_logs(false);
        assert!(!quiet.contains("read 10 bytes"), "logs were {quiet}");
        assert!(!quiet.contains("searching for password prompt"));
        assert!(quiet.contains("sending password"));

        let verbose = captured_logs(true);
        assert!(verbose.contains("searching for password prompt using match \"password\""));
        assert!(verbose.contains("read 10 bytes"), "logs were {verbose}");
        assert!(!verbose.contains("hunter2"));
    }

    #[test]
    fn test_run_stops_on_disconnect() {
        let h = harness("password");
        let (tx, rx) = channel();
        tx.send(Ok(b"password: ".to_vec())).unwrap();
        drop(tx);
        h.relay.run(rx, Duration::from_millis(10));
        assert_eq!(h.pty_input.contents(), b"hunter2\n");
        assert_eq!(h.stdout.contents(), b"password: ");
        assert_eq!(h.state.get(), SessionState::PasswordSent);
    }

    #[test]
    fn test_run_stops_on_read_error_without_kill() {
        let h = harness("password");
        let (tx, rx) = channel();
        tx.send(Err(io::Error::other("boom"))).unwrap();
        h.relay.run(rx, Duration::from_millis(10));
        assert_eq!(h.state.get(), SessionState::TerminatedIoError);
        assert_eq!(h.kills.load(Ordering::SeqCst), 0);
        drop(tx);
    }

    #[test]
    fn test_run_observes_termination_flag() {
        let h = harness("password");
        let (tx, rx) = channel::<io::Result<Vec<u8>>>();
        h.state.request_termination();
        let started = Instant::now();
        h.relay.run(rx, Duration::from_millis(10));
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(tx);
    }

    #[test]
    fn test_run_stops_after_wrong_password() {
        let h = harness("password");
        let (tx, rx) = channel();
        tx.send(Ok(b"password: ".to_vec())).unwrap();
        tx.send(Ok(b"password: ".to_vec())).unwrap();
        tx.send(Ok(b"never forwarded".to_vec())).unwrap();
        h.relay.run(rx, Duration::from_millis(10));
        assert_eq!(h.state.get(), SessionState::TerminatedWrongPassword);
        assert_eq!(h.stdout.contents(), b"password: password: ");
        drop(tx);
    }
}
