//! DataSink trait - per-device sample persistence interface
//!
//! Defines the abstract interface for the blocking delegate behind an
//! `AsyncSink`.

use crate::{ContractError, MeasurementId, SampleBatch};

/// Sample output trait
///
/// A sink is reused across measurements: `open` starts a session for one
/// measurement, `close` ends it.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Start a write session for the given measurement
    async fn open(&mut self, measurement: &MeasurementId) -> Result<(), ContractError>;

    /// Write one batch
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, batch: &SampleBatch) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// End the current session. `failure_reason` is set when the device failed.
    async fn close(&mut self, failure_reason: Option<&str>) -> Result<(), ContractError>;
}
