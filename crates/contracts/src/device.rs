//! Device heartbeat payload
//!
//! What a recording device reports about itself on every heartbeat.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status a recording device reports for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    /// Booted, sensor not yet configured
    #[default]
    New,
    /// Idle and ready to record
    Initialised,
    /// Currently recording a measurement
    Recording,
    /// Sensor failed
    Failed,
}

impl DeviceStatus {
    /// Upper-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Initialised => "INITIALISED",
            Self::Recording => "RECORDING",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heartbeat payload
///
/// Owned by the device and replaced wholesale on every heartbeat. The
/// configuration fields mirror [`TargetState`](crate::TargetState) so the
/// reconciler can compare them field by field. Keys the coordinator does not
/// model are kept in `extra` and round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    /// Human readable device name
    #[serde(default)]
    pub name: String,

    /// Sample rate (Hz)
    pub fs: u32,

    /// Samples per pushed batch
    pub samples_per_batch: u32,

    pub accelerometer_enabled: bool,

    pub accelerometer_sens: u32,

    pub gyro_enabled: bool,

    pub gyro_sens: u32,

    /// Reported status
    #[serde(default)]
    pub status: DeviceStatus,

    /// Base URL the device listens on
    #[serde(rename = "serviceURL")]
    pub service_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,

    /// Unmodelled keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DevicePayload {
    /// True if the device reports itself idle (INITIALISED)
    pub fn is_idle(&self) -> bool {
        self.status == DeviceStatus::Initialised
    }
}
