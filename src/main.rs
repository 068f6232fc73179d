use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, builder::NonEmptyStringValueParser};
use sshpass::{Command, Pattern, SecretSource, Session, SessionConfig};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sshpass",
    about = "Answer a program's terminal password prompt non-interactively",
    version,
    group(ArgGroup::new("source").args(["file", "fd", "password", "env"]).multiple(false))
)]
struct Args {
    /// Take password to use from file
    #[arg(short = 'f', value_name = "FILENAME")]
    file: Option<PathBuf>,

    /// Use number as file descriptor for getting password
    #[arg(short = 'd', value_name = "NUMBER")]
    fd: Option<i32>,

    /// Provide password as argument (security unwise)
    #[arg(short = 'p', value_name = "PASSWORD")]
    password: Option<String>,

    /// Password is passed as env-var "SSHPASS"
    #[arg(short = 'e')]
    env: bool,

    /// Which string should sshpass search for to detect a password prompt
    #[arg(
        short = 'P',
        value_name = "PROMPT",
        default_value = Pattern::DEFAULT_PROMPT,
        value_parser = NonEmptyStringValueParser::new()
    )]
    prompt: String,

    /// Be verbose about what you're doing
    #[arg(short = 'v')]
    verbose: bool,

    /// Command to run, followed by its arguments
    #[arg(value_name = "COMMAND", trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

impl Args {
    fn secret_source(&self) -> SecretSource {
        if let Some(path) = &self.file {
            SecretSource::File(path.clone())
        } else if let Some(fd) = self.fd {
            SecretSource::Fd(fd)
        } else if let Some(password) = &self.password {
            SecretSource::Literal(password.clone())
        } else if self.env {
            SecretSource::Env
        } else {
            SecretSource::Prompt
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1 rather than clap's 2.
            return Ok(if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    init_logging(args.verbose);

    let command = Command::from_argv(&args.command).context("No command specified")?;
    let secret = args.secret_source().resolve()?;

    let config = SessionConfig::new(command, secret)
        .with_prompt(args.prompt)
        .with_verbose(args.verbose);

    let outcome = Session::new(config).run().await?;

    Ok(ExitCode::from(outcome.exit_code))
}

/// Diagnostics go to stderr, and only with `-v`.
fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::OFF
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .init();
}
