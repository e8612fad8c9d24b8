//! LogSink - logs batch summaries via tracing and discards the samples

use contracts::{ContractError, DataSink, MeasurementId, SampleBatch};
use tracing::{info, instrument};

/// Sink that logs batch summaries for debugging
pub struct LogSink {
    name: String,
    measurement: Option<MeasurementId>,
    batches: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measurement: None,
            batches: 0,
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self, measurement: &MeasurementId) -> Result<(), ContractError> {
        info!(sink = %self.name, measurement = %measurement, "LogSink opened");
        self.measurement = Some(measurement.clone());
        self.batches = 0;
        Ok(())
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, batch),
        fields(sink = %self.name, samples = batch.len())
    )]
    async fn write(&mut self, batch: &SampleBatch) -> Result<(), ContractError> {
        self.batches += 1;
        info!(
            sink = %self.name,
            measurement = ?self.measurement.as_ref().map(|m| m.as_str()),
            batch = self.batches,
            samples = batch.len(),
            "Sample batch received"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self, failure_reason: Option<&str>) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            batches = self.batches,
            failure_reason = ?failure_reason,
            "LogSink closed"
        );
        self.measurement = None;
        Ok(())
    }
}
