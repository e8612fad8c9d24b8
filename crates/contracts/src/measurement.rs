//! Measurement identity, status enums and the persisted metadata record

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractError, DeviceId, TargetState};

/// Fixed wire/storage format for measurement times (second resolution)
pub const DATETIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Format a time in [`DATETIME_FORMAT`]
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DATETIME_FORMAT).to_string()
}

/// Parse a time in [`DATETIME_FORMAT`], interpreted as UTC
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, ContractError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ContractError::invalid_time(value, e.to_string()))
}

/// Serde adapter for `DateTime<Utc>` in [`DATETIME_FORMAT`]
pub mod compact_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            time: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_some(&super::super::format_time(t)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| super::super::parse_time(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Measurement identifier: `<start>_<name>`
///
/// Deterministic in (start time, name), which is what makes two schedules of
/// the same name at different times distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(String);

impl MeasurementId {
    /// Build the id from start time and name
    pub fn new(start: &DateTime<Utc>, name: &str) -> Self {
        Self(format!("{}_{}", format_time(start), name))
    }

    /// Wrap an id received from a device or operator
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative storage path: `<yyyymmdd>/<hhmmss>/<name>`
    ///
    /// Only the two separators produced by the time format become directory
    /// boundaries; underscores inside the name are kept.
    pub fn as_path(&self) -> PathBuf {
        self.0.splitn(3, '_').collect()
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MeasurementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Overall measurement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasurementStatus {
    New,
    Scheduled,
    Recording,
    /// Overdue, waiting out the deathbed grace period
    Dying,
    Failed,
    Complete,
}

impl MeasurementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Scheduled => "SCHEDULED",
            Self::Recording => "RECORDING",
            Self::Dying => "DYING",
            Self::Failed => "FAILED",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device's progress within one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    Scheduled,
    Recording,
    Complete,
    Failed,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "SCHEDULED",
            Self::Recording => "RECORDING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Per-device entry in a measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub state: RecordStatus,

    #[serde(default)]
    pub reason: Option<String>,

    /// When `state` last changed
    #[serde(with = "compact_time")]
    pub time: DateTime<Utc>,

    /// When data was last received
    #[serde(default, with = "compact_time::option", skip_serializing_if = "Option::is_none")]
    pub last: Option<DateTime<Utc>>,

    /// Samples received so far
    #[serde(default)]
    pub count: u64,
}

/// Persisted metadata of a terminal measurement
///
/// Stored as `metadata.json` under the measurement's storage path; enough to
/// rebuild the measurement on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementMetadata {
    pub id: MeasurementId,
    pub name: String,
    #[serde(with = "compact_time")]
    pub start_time: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
    #[serde(default)]
    pub description: Option<String>,
    pub measurement_parameters: TargetState,
    pub status: MeasurementStatus,
    #[serde(default)]
    pub recording_devices: BTreeMap<DeviceId, DeviceRecord>,
}
