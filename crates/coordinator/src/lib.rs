//! # Coordinator
//!
//! Control plane for a fleet of vibration recording devices.
//!
//! Responsibilities:
//! - Track devices from their heartbeats and evict the silent ones
//! - Keep every idle device at the target state
//! - Schedule measurements and drive them to COMPLETE or FAILED
//! - Persist terminal measurements and reload them on startup
//!
//! ## Example
//!
//! ```ignore
//! use coordinator::Coordinator;
//!
//! let running = Coordinator::launch(&blueprint, Arc::new(client));
//! let coordinator = running.coordinator();
//!
//! coordinator.heartbeat(device_id, payload);
//! let id = coordinator.schedule_measurement("first", 0.2, Utc::now(), None).await?;
//!
//! running.shutdown().await;
//! ```

mod background;
mod coordinator;
mod error;
mod measurement;
mod reconciler;
mod registry;
mod scheduler;
mod store;

#[cfg(test)]
mod testing;

pub use background::spawn_periodic;
pub use coordinator::{Coordinator, RunningCoordinator};
pub use error::{Result, SchedulerError};
pub use measurement::{secs, Measurement};
pub use reconciler::{ReconcileOutcome, Reconciler, TargetStateController};
pub use registry::{Device, DeviceRegistry, SinkHandle, TRANSPORT_FAILURE_STATUS};
pub use scheduler::{
    resolve_start_time, MeasurementEdit, Scheduler, SchedulerTimings, SweepReport,
    DEATHBED_EVICTION_REASON, DEFAULT_DURATION_SECS,
};
pub use store::{MeasurementStore, METADATA_FILE};

pub use contracts::{
    DeviceId, DevicePayload, DeviceStatus, MeasurementId, MeasurementStatus, RecordStatus,
    Sample, SampleBatch, TargetState, TargetStatePatch,
};
