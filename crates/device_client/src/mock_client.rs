//! Mock device client
//!
//! Records every call instead of sending it; failures and status codes can be
//! injected per service URL.

use std::collections::{HashMap, HashSet};

use contracts::{MeasurementId, TargetState};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::instrument;

use crate::client::{measurement_url, DeviceClient, ScheduleRequest};
use crate::error::{DeviceClientError, Result};

/// Mock client configuration
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Service URLs whose calls fail with a transport error
    pub fail_urls: Vec<String>,
    /// Status codes returned per service URL (default: `default_status`)
    pub statuses: HashMap<String, u16>,
    pub default_status: u16,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fail_urls: Vec::new(),
            statuses: HashMap::new(),
            default_status: 200,
        }
    }
}

/// HTTP verb of a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMethod {
    Put,
    Patch,
}

/// A call the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: MockMethod,
    pub url: String,
    pub body: Value,
}

/// Mock device client
#[derive(Debug, Default)]
pub struct MockDeviceClient {
    default_status: u16,
    statuses: Mutex<HashMap<String, u16>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockDeviceClient {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            default_status: config.default_status,
            statuses: Mutex::new(config.statuses),
            failing: Mutex::new(config.fail_urls.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make calls to `service_url` fail (or succeed again)
    pub fn set_failing(&self, service_url: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(service_url.to_string());
        } else {
            set.remove(service_url);
        }
    }

    pub fn set_status(&self, service_url: &str, status: u16) {
        self.statuses.lock().insert(service_url.to_string(), status);
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls of one verb whose URL starts with `service_url`
    pub fn calls_to(&self, method: MockMethod, service_url: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && c.url.starts_with(service_url))
            .cloned()
            .collect()
    }

    pub fn patch_count(&self, service_url: &str) -> usize {
        self.calls_to(MockMethod::Patch, service_url).len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn respond(&self, service_url: &str, call: MockCall) -> Result<u16> {
        self.calls.lock().push(call);
        if self.failing.lock().contains(service_url) {
            return Err(DeviceClientError::transport(service_url, "mock failure"));
        }
        Ok(self
            .statuses
            .lock()
            .get(service_url)
            .copied()
            .unwrap_or(self.default_status))
    }
}

impl DeviceClient for MockDeviceClient {
    #[instrument(name = "mock_device_schedule", skip(self, request), fields(url = %service_url))]
    async fn schedule_measurement(
        &self,
        service_url: &str,
        measurement: &MeasurementId,
        request: &ScheduleRequest,
    ) -> Result<u16> {
        let call = MockCall {
            method: MockMethod::Put,
            url: measurement_url(service_url, measurement),
            body: serde_json::to_value(request)
                .map_err(|e| DeviceClientError::transport(service_url, e.to_string()))?,
        };
        self.respond(service_url, call)
    }

    #[instrument(name = "mock_device_patch", skip(self, target), fields(url = %service_url))]
    async fn apply_target_state(&self, service_url: &str, target: &TargetState) -> Result<u16> {
        let call = MockCall {
            method: MockMethod::Patch,
            url: service_url.to_string(),
            body: serde_json::to_value(target)
                .map_err(|e| DeviceClientError::transport(service_url, e.to_string()))?,
        };
        self.respond(service_url, call)
    }
}
