//! CoordinatorBlueprint - Config Loader output
//!
//! Describes one coordinator process: storage root, registry and scheduler
//! timings, dispatcher pool size, outbound HTTP, sample sink and the initial
//! target state. Every section has defaults so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::TargetState;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    /// Initial target state
    #[serde(default)]
    pub target_state: TargetState,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Where measurements and sample data live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Device registry timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// A device silent for longer than this is evicted (seconds)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: f64,

    /// Eviction loop tick (milliseconds)
    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            eviction_interval_ms: default_eviction_interval_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn max_age(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_age_secs).unwrap_or(Duration::MAX)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}

fn default_max_age_secs() -> f64 {
    30.0
}

fn default_eviction_interval_ms() -> u64 {
    1000
}

/// Scheduler sweep and deathbed timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sweep loop tick (milliseconds)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Time past the end before a still-running measurement goes on the deathbed (seconds)
    #[serde(default = "default_time_til_deathbed_secs")]
    pub time_til_deathbed_secs: f64,

    /// Time on the deathbed before the measurement is evicted as failed (seconds)
    #[serde(default = "default_time_on_deathbed_secs")]
    pub time_on_deathbed_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            time_til_deathbed_secs: default_time_til_deathbed_secs(),
            time_on_deathbed_secs: default_time_on_deathbed_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_sweep_interval_ms() -> u64 {
    100
}

fn default_time_til_deathbed_secs() -> f64 {
    30.0
}

fn default_time_on_deathbed_secs() -> f64 {
    120.0
}

/// Dispatcher worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of worker loops; commands are strictly FIFO only with 1
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

/// Outbound HTTP to devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (milliseconds); a timed out call counts as failed
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    500
}

/// Per-device sample sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub sink_type: SinkType,
}

/// Sink type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// CSV file per device per measurement
    #[default]
    Csv,
    /// Log a summary of each batch and discard it
    Log,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON structured logs
    #[default]
    Json,
    /// Human readable, multi-line
    Pretty,
    /// Single line
    Compact,
}

/// Logging / metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port (None = disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let bp: CoordinatorBlueprint = serde_json::from_str("{}").unwrap();

        assert_eq!(bp.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(bp.registry.max_age(), Duration::from_secs(30));
        assert_eq!(bp.registry.eviction_interval(), Duration::from_secs(1));
        assert_eq!(bp.scheduler.sweep_interval(), Duration::from_millis(100));
        assert_eq!(bp.scheduler.time_til_deathbed_secs, 30.0);
        assert_eq!(bp.scheduler.time_on_deathbed_secs, 120.0);
        assert_eq!(bp.dispatcher.workers, 1);
        assert_eq!(bp.http.timeout(), Duration::from_millis(500));
        assert_eq!(bp.sink.sink_type, SinkType::Csv);
        assert_eq!(bp.target_state, TargetState::default());
        assert_eq!(bp.observability.log_format, LogFormat::Json);
        assert_eq!(bp.observability.metrics_port, None);
    }

    #[test]
    fn test_out_of_range_max_age_saturates() {
        let mut bp = CoordinatorBlueprint::default();
        bp.registry.max_age_secs = 1e300;
        assert_eq!(bp.registry.max_age(), Duration::MAX);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let bp: CoordinatorBlueprint =
            serde_json::from_str(r#"{"scheduler": {"time_on_deathbed_secs": 5.0}}"#).unwrap();
        assert_eq!(bp.scheduler.time_on_deathbed_secs, 5.0);
        assert_eq!(bp.scheduler.sweep_interval_ms, 100);
    }
}
