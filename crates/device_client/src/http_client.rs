//! reqwest-backed device client

use std::time::Duration;

use contracts::{MeasurementId, TargetState};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::client::{measurement_url, DeviceClient, ScheduleRequest};
use crate::error::{DeviceClientError, Result};

/// HTTP client talking JSON to recording devices
///
/// Every request carries the configured timeout; a device that does not
/// answer in time is reported as [`DeviceClientError::Timeout`].
#[derive(Debug, Clone)]
pub struct HttpDeviceClient {
    client: Client,
}

impl HttpDeviceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceClientError::Build {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn map_error(url: &str, err: reqwest::Error) -> DeviceClientError {
    if err.is_timeout() {
        DeviceClientError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_builder() {
        DeviceClientError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        DeviceClientError::transport(url, err.to_string())
    }
}

impl DeviceClient for HttpDeviceClient {
    #[instrument(name = "device_schedule", skip(self, service_url, measurement, request), fields(url = %service_url, measurement = %measurement))]
    async fn schedule_measurement(
        &self,
        service_url: &str,
        measurement: &MeasurementId,
        request: &ScheduleRequest,
    ) -> Result<u16> {
        let url = measurement_url(service_url, measurement);
        let response = self
            .client
            .put(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_error(&url, e))?;
        let status = response.status().as_u16();
        debug!(status, "device answered schedule");
        Ok(status)
    }

    #[instrument(name = "device_patch", skip(self, target), fields(url = %service_url))]
    async fn apply_target_state(&self, service_url: &str, target: &TargetState) -> Result<u16> {
        let response = self
            .client
            .patch(service_url)
            .json(target)
            .send()
            .await
            .map_err(|e| map_error(service_url, e))?;
        let status = response.status().as_u16();
        debug!(status, "device answered patch");
        Ok(status)
    }
}
