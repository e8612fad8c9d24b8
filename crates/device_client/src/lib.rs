//! # Device Client
//!
//! Outbound calls from the coordinator to recording devices.
//!
//! Responsibilities:
//! - Schedule a measurement on a device (`PUT {url}/measurements/{id}`)
//! - Push the target state to a device (`PATCH {url}`)
//! - Provide a recording mock for tests

pub mod client;
pub mod error;
pub mod http_client;
pub mod mock_client;

pub use client::{measurement_url, DeviceClient, ScheduleRequest};
pub use error::{DeviceClientError, Result};
pub use http_client::HttpDeviceClient;
pub use mock_client::{MockCall, MockConfig, MockDeviceClient, MockMethod};
