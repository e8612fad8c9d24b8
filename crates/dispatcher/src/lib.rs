//! # Dispatcher
//!
//! Decoupled execution paths for the coordinator.
//!
//! Responsibilities:
//! - Run side-effecting commands on a fixed worker pool (the reactor)
//! - Queue inbound sample batches per device and drain them off the request path
//! - Persist samples (CSV) or log them

pub mod async_sink;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod sinks;

pub use async_sink::AsyncSink;
pub use contracts::{Command, CommandHandler, DataSink};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherHandle};
pub use error::DispatcherError;
pub use metrics::{CommandMetrics, MetricsSnapshot, SinkMetrics};
pub use sinks::{CsvSink, DeviceSink, LogSink, SinkFactory};
