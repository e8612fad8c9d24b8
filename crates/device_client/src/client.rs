//! Device client abstraction
//!
//! The two outbound calls the coordinator makes to a recording device, behind
//! a trait so the registry and reconciler can be driven by a mock in tests.

use std::future::Future;

use contracts::{format_time, MeasurementId, TargetState};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Body of `PUT {url}/measurements/{id}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRequest {
    /// Seconds
    pub duration: f64,
    /// Start time in the fixed measurement time format
    pub at: String,
}

impl ScheduleRequest {
    pub fn new(duration: f64, start: &DateTime<Utc>) -> Self {
        Self {
            duration,
            at: format_time(start),
        }
    }
}

/// Recording device client trait
///
/// Both calls resolve to the HTTP status code the device answered with. A
/// call that never got an answer (timeout, refused connection) is an `Err`;
/// callers decide how to fold that into a per-device outcome.
pub trait DeviceClient: Send + Sync {
    /// Ask a device to record a measurement
    fn schedule_measurement(
        &self,
        service_url: &str,
        measurement: &MeasurementId,
        request: &ScheduleRequest,
    ) -> impl Future<Output = Result<u16>> + Send;

    /// Push the full target state to a device
    fn apply_target_state(
        &self,
        service_url: &str,
        target: &TargetState,
    ) -> impl Future<Output = Result<u16>> + Send;
}

/// `{base}/measurements/{id}`, tolerating a trailing slash on the base
pub fn measurement_url(service_url: &str, measurement: &MeasurementId) -> String {
    format!(
        "{}/measurements/{}",
        service_url.trim_end_matches('/'),
        measurement
    )
}
