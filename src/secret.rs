//! Where the secret comes from.

use anyhow::{Context, Result, anyhow, bail};
use secrecy::SecretString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::debug;

/// Environment variable read by [`SecretSource::Env`].
pub const ENV_VAR: &str = "SSHPASS";

/// One of the ways a secret can be supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Whole file, surrounding whitespace trimmed
    File(PathBuf),
    /// First line of an already-open file descriptor
    Fd(i32),
    /// Given verbatim
    Literal(String),
    /// The `SSHPASS` environment variable
    Env,
    /// Typed interactively on stdin
    Prompt,
}

impl SecretSource {
    pub fn resolve(&self) -> Result<SecretString> {
        match self {
            SecretSource::File(path) => {
                debug!("Reading password from file {}", path.display());
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to open password file {}", path.display()))?;
                Ok(SecretString::from(content.trim().to_string()))
            }
            SecretSource::Fd(fd) => {
                debug!("Reading password from file descriptor {fd}");
                let file = File::open(format!("/dev/fd/{fd}"))
                    .with_context(|| format!("invalid file descriptor: {fd}"))?;
                read_first_line(BufReader::new(file))
                    .context("failed to read from file descriptor")?
                    .ok_or_else(|| anyhow!("no password found in file descriptor"))
            }
            SecretSource::Literal(secret) => {
                debug!("Using password from command line");
                Ok(SecretString::from(secret.clone()))
            }
            SecretSource::Env => {
                debug!("Reading password from {ENV_VAR} environment variable");
                from_env_value(std::env::var(ENV_VAR).ok())
            }
            SecretSource::Prompt => {
                debug!("Reading password from stdin");
                let mut stderr = io::stderr();
                write!(stderr, "Password: ")?;
                stderr.flush()?;
                read_first_line(io::stdin().lock())
                    .context("failed to read password")?
                    .ok_or_else(|| anyhow!("no password entered"))
            }
        }
    }
}

fn from_env_value(value: Option<String>) -> Result<SecretString> {
    match value {
        Some(value) if !value.is_empty() => Ok(SecretString::from(value)),
        _ => bail!("{ENV_VAR} environment variable is not set"),
    }
}

/// First line without its terminator, or `None` at immediate EOF.
fn read_first_line(mut reader: impl BufRead) -> io::Result<Option<SecretString>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
    Ok(Some(SecretString::from(trimmed)))
}
