//! Dispatcher error types

use contracts::MeasurementId;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Command offered after shutdown
    #[error("dispatcher queue closed, '{kind}' command dropped")]
    QueueClosed { kind: &'static str },

    /// `stop` on a sink with no running session
    #[error("sink '{sink_name}' has no running session")]
    SinkNotStarted { sink_name: String },

    /// `stop` for a measurement other than the one being recorded
    #[error("sink '{sink_name}' is recording '{running}', not '{requested}'")]
    SessionMismatch {
        sink_name: String,
        running: MeasurementId,
        requested: MeasurementId,
    },

    /// Sink worker task died; the delegate is lost
    #[error("sink '{sink_name}' worker failed: {message}")]
    WorkerFailed { sink_name: String, message: String },

    /// Sink error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    pub fn not_started(sink_name: impl Into<String>) -> Self {
        Self::SinkNotStarted {
            sink_name: sink_name.into(),
        }
    }
}
