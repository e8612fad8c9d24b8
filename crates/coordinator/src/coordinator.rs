//! Coordinator facade
//!
//! Everything a transport layer needs: device heartbeats, measurement
//! scheduling and the device callbacks, measurement management and the
//! target state. [`Coordinator::launch`] wires the components from a
//! [`CoordinatorBlueprint`] and starts the background loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::{
    CoordinatorBlueprint, DeviceId, DevicePayload, DeviceStatus, MeasurementId,
    MeasurementStatus, SampleBatch, TargetState, TargetStatePatch,
};
use device_client::DeviceClient;
use dispatcher::{Dispatcher, SinkFactory};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Result;
use crate::measurement::Measurement;
use crate::reconciler::{Reconciler, TargetStateController};
use crate::registry::{Device, DeviceRegistry};
use crate::scheduler::{
    resolve_start_time, MeasurementEdit, Scheduler, SchedulerTimings, DEFAULT_DURATION_SECS,
};
use crate::store::MeasurementStore;

/// The coordinator's inbound operations
pub struct Coordinator<C> {
    registry: Arc<DeviceRegistry<C>>,
    target: Arc<TargetStateController>,
    scheduler: Arc<Scheduler<C>>,
}

impl<C: DeviceClient + 'static> Coordinator<C> {
    pub fn new(
        registry: Arc<DeviceRegistry<C>>,
        target: Arc<TargetStateController>,
        scheduler: Arc<Scheduler<C>>,
    ) -> Self {
        Self {
            registry,
            target,
            scheduler,
        }
    }

    /// Build every component from `blueprint` and start the background loops
    pub fn launch(blueprint: &CoordinatorBlueprint, client: Arc<C>) -> RunningCoordinator<C> {
        let data_dir = blueprint.storage.data_dir.clone();
        let dispatcher = Dispatcher::builder()
            .workers(blueprint.dispatcher.workers)
            .spawn(Arc::new(Reconciler::new(Arc::clone(&client))));

        let target = Arc::new(TargetStateController::new(
            blueprint.target_state,
            dispatcher.handle(),
        ));
        let registry = Arc::new(DeviceRegistry::new(
            client,
            Arc::clone(&target),
            SinkFactory::new(blueprint.sink.sink_type, &data_dir),
            blueprint.registry.max_age(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&registry),
            Arc::clone(&target),
            MeasurementStore::new(&data_dir),
            SchedulerTimings::from(&blueprint.scheduler),
        ));
        scheduler.reload();

        let shutdown = Arc::new(AtomicBool::new(false));
        let loops = vec![
            registry.spawn_evictor(blueprint.registry.eviction_interval(), Arc::clone(&shutdown)),
            scheduler.spawn_sweeper(blueprint.scheduler.sweep_interval(), Arc::clone(&shutdown)),
        ];

        info!(
            data_dir = %data_dir.display(),
            workers = blueprint.dispatcher.workers,
            sink = ?blueprint.sink.sink_type,
            "Coordinator started"
        );

        RunningCoordinator {
            coordinator: Arc::new(Self::new(registry, target, scheduler)),
            dispatcher,
            shutdown,
            loops,
        }
    }

    // ---- devices ----

    pub fn heartbeat(&self, device: DeviceId, payload: DevicePayload) {
        self.registry.accept(device, payload);
    }

    pub fn list_devices(&self, status: Option<DeviceStatus>) -> Vec<Device> {
        self.registry.devices(status)
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        self.registry.device(id)
    }

    // ---- measurements ----

    /// Schedule on every idle device, starting at `start`
    pub async fn schedule_measurement(
        &self,
        name: &str,
        duration: f64,
        start: DateTime<Utc>,
        description: Option<String>,
    ) -> Result<MeasurementId> {
        self.scheduler
            .schedule(name, duration, start, description)
            .await
    }

    /// Schedule from an operator request
    ///
    /// `start` wins over `delay_secs`; with neither, or with a start that is
    /// not in the future, the measurement starts shortly. `duration` defaults
    /// to 10 seconds.
    pub async fn request_measurement(
        &self,
        name: &str,
        duration: Option<f64>,
        start: Option<DateTime<Utc>>,
        delay_secs: Option<f64>,
        description: Option<String>,
    ) -> Result<MeasurementId> {
        let start = resolve_start_time(start, delay_secs, Utc::now());
        self.schedule_measurement(
            name,
            duration.unwrap_or(DEFAULT_DURATION_SECS),
            start,
            description,
        )
        .await
    }

    pub async fn start_measurement(&self, id: &MeasurementId, device: &DeviceId) -> bool {
        self.scheduler.start_measurement(id, device).await
    }

    pub fn record_data(&self, id: &MeasurementId, device: &DeviceId, batch: SampleBatch) -> bool {
        self.scheduler.record_data(id, device, batch)
    }

    pub async fn complete_measurement(&self, id: &MeasurementId, device: &DeviceId) -> bool {
        self.scheduler.complete_measurement(id, device).await
    }

    pub async fn fail_measurement(
        &self,
        id: &MeasurementId,
        device: &DeviceId,
        reason: Option<String>,
    ) -> bool {
        self.scheduler.fail_measurement(id, device, reason).await
    }

    pub fn list_measurements(&self, status: Option<MeasurementStatus>) -> Vec<Measurement> {
        self.scheduler.list_measurements(status)
    }

    pub fn get_measurement(&self, id: &str, status: Option<MeasurementStatus>) -> Option<Measurement> {
        self.scheduler.get_measurement(id, status)
    }

    pub fn delete_measurement(&self, id: &str) -> Result<Measurement> {
        self.scheduler.delete_measurement(id)
    }

    pub fn edit_measurement(&self, id: &str, edit: MeasurementEdit) -> Result<Measurement> {
        self.scheduler.edit_measurement(id, edit)
    }

    // ---- target state ----

    /// Merge `patch` and reconcile every known device against the result
    pub fn update_target_state(&self, patch: &TargetStatePatch) -> TargetState {
        let devices = self
            .registry
            .devices(None)
            .into_iter()
            .map(|d| (d.id, d.payload));
        self.target.update(patch, devices)
    }

    pub fn target_state(&self) -> TargetState {
        self.target.state()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry<C>> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<C>> {
        &self.scheduler
    }
}

/// A launched coordinator and the tasks it owns
pub struct RunningCoordinator<C> {
    coordinator: Arc<Coordinator<C>>,
    dispatcher: Dispatcher,
    shutdown: Arc<AtomicBool>,
    loops: Vec<JoinHandle<()>>,
}

impl<C: DeviceClient + 'static> RunningCoordinator<C> {
    pub fn coordinator(&self) -> &Arc<Coordinator<C>> {
        &self.coordinator
    }

    /// Stop the loops after their current tick, then drain the dispatcher
    pub async fn shutdown(self) {
        info!("Shutting down coordinator");
        self.shutdown.store(true, Ordering::Release);
        for handle in self.loops {
            if let Err(e) = handle.await {
                error!(error = ?e, "Background loop ended abnormally");
            }
        }
        self.dispatcher.shutdown().await;
        info!("Coordinator stopped");
    }
}
