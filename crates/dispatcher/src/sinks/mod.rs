//! Sample sink implementations
//!
//! [`CsvSink`] persists to disk, [`LogSink`] only logs. [`DeviceSink`] is the
//! closed set the coordinator builds per device from configuration.

mod csv_file;
mod log;

use std::path::PathBuf;

use contracts::{ContractError, DataSink, DeviceId, MeasurementId, SampleBatch, SinkType};

pub use self::csv_file::CsvSink;
pub use self::log::LogSink;

/// Sink chosen by configuration
pub enum DeviceSink {
    Csv(CsvSink),
    Log(LogSink),
}

impl DataSink for DeviceSink {
    fn name(&self) -> &str {
        match self {
            Self::Csv(s) => s.name(),
            Self::Log(s) => s.name(),
        }
    }

    async fn open(&mut self, measurement: &MeasurementId) -> Result<(), ContractError> {
        match self {
            Self::Csv(s) => s.open(measurement).await,
            Self::Log(s) => s.open(measurement).await,
        }
    }

    async fn write(&mut self, batch: &SampleBatch) -> Result<(), ContractError> {
        match self {
            Self::Csv(s) => s.write(batch).await,
            Self::Log(s) => s.write(batch).await,
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Csv(s) => s.flush().await,
            Self::Log(s) => s.flush().await,
        }
    }

    async fn close(&mut self, failure_reason: Option<&str>) -> Result<(), ContractError> {
        match self {
            Self::Csv(s) => s.close(failure_reason).await,
            Self::Log(s) => s.close(failure_reason).await,
        }
    }
}

/// Builds one [`DeviceSink`] per device
#[derive(Debug, Clone)]
pub struct SinkFactory {
    sink_type: SinkType,
    data_dir: PathBuf,
}

impl SinkFactory {
    pub fn new(sink_type: SinkType, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sink_type,
            data_dir: data_dir.into(),
        }
    }

    pub fn create(&self, device: &DeviceId) -> DeviceSink {
        match self.sink_type {
            SinkType::Csv => DeviceSink::Csv(CsvSink::new(&self.data_dir, device.clone())),
            SinkType::Log => DeviceSink::Log(LogSink::new(device.as_ref())),
        }
    }
}
