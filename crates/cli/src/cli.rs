//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vibe Coordinator - control plane for a fleet of vibration recording devices
#[derive(Parser, Debug)]
#[command(
    name = "vibe-coordinator",
    author,
    version,
    about = "Vibration measurement fleet coordinator",
    long_about = "Tracks recording devices from their heartbeats, keeps them at the target\n\
                  configuration, schedules measurements across the idle fleet and\n\
                  persists the recorded samples."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "VIBE_COORDINATOR_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (defaults to the configured one for `run`, pretty otherwise)
    #[arg(long, value_enum, global = true, env = "VIBE_COORDINATOR_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter used when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the coordinator until interrupted
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "coordinator.toml",
        env = "VIBE_COORDINATOR_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the measurement data directory
    #[arg(long, env = "VIBE_COORDINATOR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the number of dispatcher workers
    #[arg(long, env = "VIBE_COORDINATOR_WORKERS")]
    pub workers: Option<usize>,

    /// Override the metrics server port (0 = disabled)
    #[arg(long, env = "VIBE_COORDINATOR_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Validate configuration and exit without starting
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "coordinator.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "coordinator.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List measurements already stored under the data directory
    #[arg(long)]
    pub measurements: bool,

    /// Print the full effective configuration as TOML instead of a summary
    #[arg(long, conflicts_with = "json")]
    pub effective: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for contracts::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
