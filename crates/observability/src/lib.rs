//! # Observability
//!
//! Logging and Prometheus metrics for the coordinator.
//!
//! The coordinator crates only call the `record_*` functions; whether those
//! land anywhere depends on [`install_prometheus`] having run. Logging goes
//! through `tracing` with the subscriber installed by [`init_with_config`].
//!
//! ```ignore
//! use observability::{init_with_config, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::from(&blueprint.observability))?;
//! observability::record_heartbeat("rpi-01");
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use contracts::LogFormat;

pub use crate::metrics::{
    record_active_measurements, record_command_processed, record_device_evicted,
    record_devices_known, record_heartbeat, record_measurement_finished,
    record_measurement_scheduled, record_sink_batch, record_sweep_duration_ms,
    record_target_state_patch,
};

/// Logging and exporter settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port (None = no exporter)
    pub metrics_port: Option<u16>,
    /// Filter directive used when RUST_LOG is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

impl From<&contracts::ObservabilityConfig> for ObservabilityConfig {
    fn from(config: &contracts::ObservabilityConfig) -> Self {
        Self {
            log_format: config.log_format,
            metrics_port: config.metrics_port,
            default_log_level: config.log_level.clone(),
        }
    }
}

/// Install the global subscriber and, if a port is set, the exporter
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => parse_filter(&directives)?,
        _ => parse_filter(&config.default_log_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config.log_format))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// Serve `/metrics` on `port` and route the `record_*` calls there
pub fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on port {port}"))?;

    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

fn parse_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).with_context(|| format!("Invalid log filter '{directives}'"))
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(false).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}
