//! # sshpass
//!
//! Non-interactive password entry for programs that insist on reading it
//! from a terminal.
//!
//! Tools such as `ssh` refuse to take a password from a pipe or an
//! environment variable and open `/dev/tty` instead. This crate runs such a
//! command inside a pseudo-terminal, watches its output for a password
//! prompt, and types the secret the first time the prompt appears. Everything
//! else is relayed untouched between the real terminal and the child.
//!
//! The session ends with exit code `1` when:
//!
//! - the prompt appears a second time (the secret was rejected), or
//! - the child asks to confirm an unknown host key
//!   (`"The authenticity of host "`), which is not safe to automate.
//!
//! Otherwise the child's own exit code is passed through.
//!
//! ## Quick start
//!
//! ```no_run
//! use sshpass::{Command, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let command = Command::new("ssh", &["user@host", "uptime"]);
//!     let config = SessionConfig::new(command, "hunter2".into());
//!
//!     let outcome = Session::new(config).run().await?;
//!     std::process::exit(outcome.exit_code.into());
//! }
//! ```
//!
//! ## Prompt matching
//!
//! [`Pattern::advance`] is a streaming matcher: it carries a single integer
//! of state between chunks, so a prompt split across reads is still found.
//! Use [`SessionConfig::with_prompt`] to search for something other than
//! `"password"`.

pub mod config;
pub mod matcher;
pub(crate) mod pty;
pub(crate) mod pty_reader;
pub(crate) mod relay;
pub(crate) mod resize;
pub mod secret;
pub mod session;
pub mod state;
pub mod terminal;

pub use config::{Command, SessionConfig};
pub use matcher::{Pattern, PromptMatcher};
pub use secret::SecretSource;
pub use session::{Session, SessionOutcome, derive_exit_code};
pub use state::{SessionState, SharedState};
