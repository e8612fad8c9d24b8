//! Tracing setup from command-line flags and configuration

use anyhow::Result;
use observability::ObservabilityConfig;

use crate::cli::{Cli, LogFormat};

/// Install the subscriber
///
/// Flags win over `configured`; without either the format is pretty. The
/// Prometheus exporter is left to the `run` command.
pub fn init(cli: &Cli, configured: Option<&contracts::ObservabilityConfig>) -> Result<()> {
    let log_format = match (cli.log_format, configured) {
        (Some(format), _) => format.into(),
        (None, Some(config)) => config.log_format,
        (None, None) => LogFormat::Pretty.into(),
    };

    let default_log_level = match configured {
        Some(config) if cli.verbose == 0 && !cli.quiet => config.log_level.clone(),
        _ => cli.log_level().to_string(),
    };

    observability::init_with_config(ObservabilityConfig {
        log_format,
        metrics_port: None,
        default_log_level,
    })
}
