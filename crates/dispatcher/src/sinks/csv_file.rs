//! CsvSink - writes sample batches to `<data_dir>/<measurement path>/<device>/data.out`

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use contracts::{ContractError, DataSink, DeviceId, MeasurementId, Sample, SampleBatch};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

/// Name of the per-device data file
pub const DATA_FILE: &str = "data.out";

/// Sink that appends samples to a CSV file per measurement
///
/// The first named record of a session writes the header row; positional
/// rows are written as they come.
pub struct CsvSink {
    device: DeviceId,
    data_dir: PathBuf,
    writer: Option<csv::Writer<File>>,
    path: Option<PathBuf>,
    header_written: bool,
}

impl CsvSink {
    pub fn new(data_dir: impl AsRef<Path>, device: DeviceId) -> Self {
        Self {
            device,
            data_dir: data_dir.as_ref().to_path_buf(),
            writer: None,
            path: None,
            header_written: false,
        }
    }

    /// File of the current session
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Where a device's samples for a measurement end up
    pub fn data_path(data_dir: &Path, measurement: &MeasurementId, device: &DeviceId) -> PathBuf {
        data_dir
            .join(measurement.as_path())
            .join(device.as_ref())
            .join(DATA_FILE)
    }

    fn field(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    fn write_samples(&mut self, batch: &SampleBatch) -> csv::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        for sample in batch {
            match sample {
                Sample::Record(map) => {
                    if !self.header_written {
                        writer.write_record(map.keys())?;
                        self.header_written = true;
                    }
                    writer.write_record(map.values().map(Self::field))?;
                }
                Sample::Row(values) => {
                    writer.write_record(values.iter().map(Self::field))?;
                }
            }
        }
        Ok(())
    }

    fn sink_error(&self, e: impl std::fmt::Display) -> ContractError {
        ContractError::sink_write(self.device.as_ref(), e.to_string())
    }
}

impl DataSink for CsvSink {
    fn name(&self) -> &str {
        &self.device
    }

    #[instrument(name = "csv_sink_open", skip(self, measurement), fields(sink = %self.device, measurement = %measurement))]
    async fn open(&mut self, measurement: &MeasurementId) -> Result<(), ContractError> {
        let path = Self::data_path(&self.data_dir, measurement, &self.device);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() {
            warn!(path = %path.display(), "Data file exists, truncating");
        }
        let writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| self.sink_error(e))?;

        debug!(path = %path.display(), "CsvSink opened");
        self.writer = Some(writer);
        self.path = Some(path);
        self.header_written = false;
        Ok(())
    }

    #[instrument(
        name = "csv_sink_write",
        skip(self, batch),
        fields(sink = %self.device, samples = batch.len())
    )]
    async fn write(&mut self, batch: &SampleBatch) -> Result<(), ContractError> {
        if self.writer.is_none() {
            return Err(ContractError::SinkNotOpen {
                sink_name: self.device.to_string(),
            });
        }
        self.write_samples(batch).map_err(|e| {
            error!(sink = %self.device, error = %e, "Write failed");
            self.sink_error(e)
        })
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    #[instrument(name = "csv_sink_close", skip(self))]
    async fn close(&mut self, failure_reason: Option<&str>) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(
            sink = %self.device,
            path = ?self.path,
            failure_reason = ?failure_reason,
            "CsvSink closed"
        );
        Ok(())
    }
}
