//! Shared fixtures for unit tests

use std::sync::Arc;
use std::time::Duration;

use contracts::{DeviceId, DevicePayload, DeviceStatus, SinkType, TargetState};
use device_client::MockDeviceClient;
use dispatcher::{Dispatcher, SinkFactory};
use tempfile::TempDir;

use crate::reconciler::{Reconciler, TargetStateController};
use crate::registry::DeviceRegistry;
use crate::scheduler::{Scheduler, SchedulerTimings};
use crate::store::MeasurementStore;

/// Heartbeat of a device at the default target state, served at `http://<name>`
pub fn payload(name: &str, status: DeviceStatus) -> DevicePayload {
    let target = TargetState::default();
    DevicePayload {
        name: name.to_string(),
        fs: target.fs,
        samples_per_batch: target.samples_per_batch,
        accelerometer_enabled: target.accelerometer_enabled,
        accelerometer_sens: target.accelerometer_sens,
        gyro_enabled: target.gyro_enabled,
        gyro_sens: target.gyro_sens,
        status,
        service_url: format!("http://{name}"),
        failure_code: None,
        extra: Default::default(),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub client: Arc<MockDeviceClient>,
    pub dispatcher: Dispatcher,
    pub registry: Arc<DeviceRegistry<MockDeviceClient>>,
    pub scheduler: Arc<Scheduler<MockDeviceClient>>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockDeviceClient::new());
        let dispatcher =
            Dispatcher::builder().spawn(Arc::new(Reconciler::new(Arc::clone(&client))));
        let target = Arc::new(TargetStateController::new(
            TargetState::default(),
            dispatcher.handle(),
        ));
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&client),
            Arc::clone(&target),
            SinkFactory::new(SinkType::Csv, dir.path()),
            Duration::from_secs(30),
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&registry),
            target,
            MeasurementStore::new(dir.path()),
            SchedulerTimings::default(),
        ));
        Self {
            dir,
            client,
            dispatcher,
            registry,
            scheduler,
        }
    }

    /// A second scheduler over the same registry
    pub fn scheduler_with(
        &self,
        store: MeasurementStore,
        timings: SchedulerTimings,
    ) -> Scheduler<MockDeviceClient> {
        let target = Arc::new(TargetStateController::new(
            TargetState::default(),
            self.dispatcher.handle(),
        ));
        Scheduler::new(Arc::clone(&self.registry), target, store, timings)
    }

    pub fn idle_device(&self, name: &str) -> DeviceId {
        let id = DeviceId::from(name);
        self.registry
            .accept(id.clone(), payload(name, DeviceStatus::Initialised));
        id
    }
}
