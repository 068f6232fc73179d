//! Session configuration handed to [`crate::Session`].

use crate::matcher::Pattern;
use secrecy::SecretString;
use std::time::Duration;

/// Program path plus argument vector, spawned once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new<S: AsRef<str>>(program: impl Into<String>, args: &[S]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    /// Build from a full argv, first element being the program.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args))
    }

    /// Space-joined form for diagnostics.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything a session needs, passed in explicitly at construction.
#[derive(Debug)]
pub struct SessionConfig {
    pub command: Command,
    pub secret: SecretString,
    pub prompt: String,
    /// Emit per-chunk read diagnostics. Other messages are left to the
    /// installed `tracing` subscriber's level.
    pub verbose: bool,
    /// Upper bound on a single PTY read.
    pub read_chunk: usize,
    /// How long the output relay waits for data before re-checking the
    /// termination flag.
    pub poll_interval: Duration,
    /// Delay before stdin starts being forwarded to the child.
    pub input_delay: Duration,
    /// How long a child may ignore the hangup before it is killed.
    pub kill_grace: Duration,
    pub initial_rows: u16,
    pub initial_cols: u16,
}

impl SessionConfig {
    pub const DEFAULT_READ_CHUNK: usize = 256;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_INPUT_DELAY: Duration = Duration::from_millis(100);
    pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(250);

    pub fn new(command: Command, secret: SecretString) -> Self {
        Self {
            command,
            secret,
            prompt: Pattern::DEFAULT_PROMPT.to_string(),
            verbose: false,
            read_chunk: Self::DEFAULT_READ_CHUNK,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            input_delay: Self::DEFAULT_INPUT_DELAY,
            kill_grace: Self::DEFAULT_KILL_GRACE,
            initial_rows: 24,
            initial_cols: 80,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_input_delay(mut self, input_delay: Duration) -> Self {
        self.input_delay = input_delay;
        self
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }
}
