//! Top-level CLI definition and dispatch.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use mirror_sentinel::core::config::Config;
use mirror_sentinel::core::errors::SentinelError;
use mirror_sentinel::daemon::loop_main::{MirrorArgs, MirrorDaemon};

/// Keep a destination directory tree in step with a source tree.
#[derive(Debug, Parser)]
#[command(
    name = "sentinel",
    version,
    about = "Mirror a source directory onto a destination and keep it current",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Directory to mirror from.
    #[arg(value_name = "src_path")]
    source: PathBuf,
    /// Directory to mirror into; created if missing.
    #[arg(value_name = "dest_path")]
    destination: PathBuf,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Pause between change detection and reconciliation, in milliseconds.
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
    /// Number of path index buckets.
    #[arg(long, value_name = "N")]
    index_capacity: Option<usize>,
    /// Override the activity log path.
    #[arg(long, value_name = "PATH")]
    activity_log: Option<PathBuf>,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad configuration or flags.
    #[error("{0}")]
    User(String),
    /// Startup or runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) => 2,
            Self::Internal(_) => 3,
        }
    }
}

impl From<SentinelError> for CliError {
    fn from(e: SentinelError) -> Self {
        match e {
            SentinelError::InvalidConfig { .. }
            | SentinelError::MissingConfig { .. }
            | SentinelError::ConfigParse { .. } => Self::User(e.to_string()),
            SentinelError::Serialization { .. } => Self::Internal(e.to_string()),
            _ => Self::Runtime(e.to_string()),
        }
    }
}

/// Resolve the effective configuration: file, then env, then flags.
fn effective_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ms) = cli.interval_ms {
        config.daemon.poll_interval_ms = ms;
    }
    if let Some(capacity) = cli.index_capacity {
        config.index.capacity = capacity;
    }
    if let Some(path) = &cli.activity_log {
        config.paths.activity_log.clone_from(path);
    }
    config.validate()?;
    Ok(config)
}

/// Run the daemon in the foreground until it is signalled to stop.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = effective_config(cli)?;
    let args = MirrorArgs {
        source: cli.source.clone(),
        destination: cli.destination.clone(),
    };
    let mut daemon = MirrorDaemon::init(config, &args)?;
    daemon.run()?;
    Ok(())
}
