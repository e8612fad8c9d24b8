//! TargetState - the configuration every device is driven towards

use serde::{Deserialize, Serialize};

use crate::DevicePayload;

/// Desired device configuration
///
/// One instance per coordinator. Replaced wholesale on operator update,
/// stamped onto every new measurement, and pushed to devices (as a full
/// document, never a diff) whenever they drift from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetState {
    /// Sample rate (Hz)
    pub fs: u32,
    /// Samples per pushed batch
    pub samples_per_batch: u32,
    pub accelerometer_enabled: bool,
    pub accelerometer_sens: u32,
    pub gyro_enabled: bool,
    pub gyro_sens: u32,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            fs: 500,
            samples_per_batch: 125,
            accelerometer_enabled: true,
            accelerometer_sens: 4,
            gyro_enabled: true,
            gyro_sens: 500,
        }
    }
}

/// Partial target state update; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_per_batch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerometer_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerometer_sens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_sens: Option<u32>,
}

/// A single field where a device differs from the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDrift {
    pub field: &'static str,
    pub reported: String,
    pub desired: String,
}

impl TargetState {
    /// Apply a partial update, returning the merged state
    pub fn merge(mut self, patch: &TargetStatePatch) -> Self {
        if let Some(v) = patch.fs {
            self.fs = v;
        }
        if let Some(v) = patch.samples_per_batch {
            self.samples_per_batch = v;
        }
        if let Some(v) = patch.accelerometer_enabled {
            self.accelerometer_enabled = v;
        }
        if let Some(v) = patch.accelerometer_sens {
            self.accelerometer_sens = v;
        }
        if let Some(v) = patch.gyro_enabled {
            self.gyro_enabled = v;
        }
        if let Some(v) = patch.gyro_sens {
            self.gyro_sens = v;
        }
        self
    }

    /// Field-by-field comparison against what a device last reported.
    ///
    /// Empty result means the device is at target.
    pub fn drift_from(&self, reported: &DevicePayload) -> Vec<FieldDrift> {
        let mut drift = Vec::new();
        let mut check = |field: &'static str, reported: String, desired: String| {
            if reported != desired {
                drift.push(FieldDrift {
                    field,
                    reported,
                    desired,
                });
            }
        };

        check("fs", reported.fs.to_string(), self.fs.to_string());
        check(
            "samplesPerBatch",
            reported.samples_per_batch.to_string(),
            self.samples_per_batch.to_string(),
        );
        check(
            "gyroEnabled",
            reported.gyro_enabled.to_string(),
            self.gyro_enabled.to_string(),
        );
        check(
            "gyroSens",
            reported.gyro_sens.to_string(),
            self.gyro_sens.to_string(),
        );
        check(
            "accelerometerEnabled",
            reported.accelerometer_enabled.to_string(),
            self.accelerometer_enabled.to_string(),
        );
        check(
            "accelerometerSens",
            reported.accelerometer_sens.to_string(),
            self.accelerometer_sens.to_string(),
        );
        drift
    }
}
