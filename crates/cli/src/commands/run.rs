//! `run` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use config_loader::ConfigSource;
use contracts::CoordinatorBlueprint;
use coordinator::Coordinator;
use device_client::HttpDeviceClient;
use tracing::{error, info, warn};

use crate::cli::{Cli, RunArgs};
use crate::error::CliError;
use crate::logging;

/// Execute the `run` command
pub async fn run_coordinator(cli: &Cli, args: &RunArgs) -> Result<()> {
    let (mut blueprint, source) = config_loader::ConfigLoader::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut blueprint, args)?;

    logging::init(cli, Some(&blueprint.observability))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %source,
        "Vibe coordinator starting"
    );
    if source == ConfigSource::Defaults {
        warn!(path = %args.config.display(), "Config file not found, running with defaults");
    }
    info!(
        data_dir = %blueprint.storage.data_dir.display(),
        workers = blueprint.dispatcher.workers,
        sink = ?blueprint.sink.sink_type,
        max_age_secs = blueprint.registry.max_age_secs,
        http_timeout_ms = blueprint.http.timeout_ms,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    if let Some(port) = blueprint.observability.metrics_port {
        observability::install_prometheus(port)?;
    }

    let client = HttpDeviceClient::new(blueprint.http.timeout())
        .context("Failed to build device HTTP client")?;
    let running = Coordinator::launch(&blueprint, Arc::new(client));

    shutdown_signal().await;
    warn!("Received shutdown signal, stopping coordinator...");

    running.shutdown().await;
    info!("Vibe coordinator finished");
    Ok(())
}

/// Apply command-line overrides and re-validate
fn apply_overrides(blueprint: &mut CoordinatorBlueprint, args: &RunArgs) -> Result<()> {
    if let Some(ref data_dir) = args.data_dir {
        blueprint.storage.data_dir = data_dir.clone();
    }
    if let Some(workers) = args.workers {
        blueprint.dispatcher.workers = workers;
    }
    if let Some(port) = args.metrics_port {
        blueprint.observability.metrics_port = (port != 0).then_some(port);
    }
    config_loader::ConfigLoader::validate(blueprint)
        .map_err(|e| CliError::invalid_override(e.to_string()))?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
