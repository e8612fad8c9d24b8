//! # Vibe Coordinator CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading and validation
//! - Coordinator lifecycle management
//! - Graceful shutdown handling

mod cli;
mod commands;
mod error;
mod logging;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use commands::{run_coordinator, run_info, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // `run` sets up logging itself once its configuration is loaded
    let result = match &cli.command {
        Commands::Run(args) => run_coordinator(&cli, args).await,
        Commands::Validate(args) => {
            logging::init(&cli, None)?;
            run_validate(args)
        }
        Commands::Info(args) => {
            logging::init(&cli, None)?;
            run_info(args)
        }
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
