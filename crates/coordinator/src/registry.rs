//! DeviceRegistry - fleet membership, heartbeats and staleness eviction

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use contracts::{DeviceId, DevicePayload, DeviceStatus, MeasurementId};
use device_client::{DeviceClient, ScheduleRequest};
use dispatcher::{AsyncSink, DeviceSink, SinkFactory};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::background::spawn_periodic;
use crate::reconciler::TargetStateController;

/// Outcome recorded for a device whose schedule call never got an answer
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Shared handle to a device's sample sink
pub type SinkHandle = Arc<AsyncSink<DeviceSink>>;

/// A known device
#[derive(Clone)]
pub struct Device {
    pub id: DeviceId,
    pub last_heartbeat: DateTime<Utc>,
    /// Last reported payload, replaced wholesale on each heartbeat
    pub payload: DevicePayload,
    pub sink: SinkHandle,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("last_heartbeat", &self.last_heartbeat)
            .field("payload", &self.payload)
            .field("sink_running", &self.sink.is_running())
            .finish()
    }
}

/// Fleet membership table
pub struct DeviceRegistry<C> {
    devices: RwLock<HashMap<DeviceId, Device>>,
    client: Arc<C>,
    target: Arc<TargetStateController>,
    sinks: SinkFactory,
    max_age: TimeDelta,
}

impl<C: DeviceClient + 'static> DeviceRegistry<C> {
    pub fn new(
        client: Arc<C>,
        target: Arc<TargetStateController>,
        sinks: SinkFactory,
        max_age: Duration,
    ) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            client,
            target,
            sinks,
            max_age: TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Record a heartbeat now
    pub fn accept(&self, id: DeviceId, payload: DevicePayload) {
        self.accept_at(id, payload, Utc::now());
    }

    /// Record a heartbeat at `now` and queue a reconciliation for it
    #[instrument(name = "device_heartbeat", skip(self, payload, now), fields(device = %id, status = %payload.status))]
    pub fn accept_at(&self, id: DeviceId, payload: DevicePayload, now: DateTime<Utc>) {
        let known = {
            let mut devices = self.devices.write();
            match devices.get_mut(&id) {
                Some(device) => {
                    device.last_heartbeat = now;
                    device.payload = payload.clone();
                }
                None => {
                    info!(url = %payload.service_url, "New device");
                    let sink = Arc::new(AsyncSink::new(self.sinks.create(&id)));
                    devices.insert(
                        id.clone(),
                        Device {
                            id: id.clone(),
                            last_heartbeat: now,
                            payload: payload.clone(),
                            sink,
                        },
                    );
                }
            }
            devices.len()
        };

        observability::record_heartbeat(&id);
        observability::record_devices_known(known);

        if !self.target.reconcile(&id, &payload) {
            warn!("Reconciliation not queued");
        }
    }

    /// Devices, optionally only those reporting `status`, ordered by id
    pub fn devices(&self, status: Option<DeviceStatus>) -> Vec<Device> {
        let mut found: Vec<Device> = self
            .devices
            .read()
            .values()
            .filter(|d| status.is_none_or(|s| d.payload.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    pub fn sink(&self, id: &str) -> Option<SinkHandle> {
        self.devices.read().get(id).map(|d| Arc::clone(&d.sink))
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Drop every device whose last heartbeat is older than the max age
    pub fn evict_stale_at(&self, now: DateTime<Utc>) -> Vec<DeviceId> {
        let (evicted, remaining) = {
            let mut devices = self.devices.write();
            let mut evicted = Vec::new();
            devices.retain(|id, device| {
                let age = now - device.last_heartbeat;
                if age > self.max_age {
                    evicted.push(id.clone());
                    false
                } else {
                    true
                }
            });
            (evicted, devices.len())
        };

        for id in &evicted {
            warn!(device = %id, "Evicting device, no heartbeat within max age");
            observability::record_device_evicted(id);
        }
        if !evicted.is_empty() {
            observability::record_devices_known(remaining);
        }
        evicted
    }

    /// Run eviction on a fixed tick until `shutdown` is set
    pub fn spawn_evictor(self: &Arc<Self>, period: Duration, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        spawn_periodic("device_evictor", period, shutdown, move || {
            let registry = Arc::clone(&registry);
            async move {
                registry.evict_stale_at(Utc::now());
            }
        })
    }

    /// Ask every idle device to record a measurement
    ///
    /// Returns the HTTP status each device answered with. A device that could
    /// not be reached is reported as 500; it never stops the others.
    #[instrument(name = "registry_schedule_measurement", skip(self, id, start), fields(measurement = %id))]
    pub async fn schedule_measurement(
        &self,
        id: &MeasurementId,
        duration: f64,
        start: DateTime<Utc>,
    ) -> BTreeMap<DeviceId, u16> {
        let request = ScheduleRequest::new(duration, &start);
        let idle = self.devices(Some(DeviceStatus::Initialised));
        debug!(devices = idle.len(), "Scheduling on idle devices");

        let mut outcomes = BTreeMap::new();
        for device in idle {
            let status = match self
                .client
                .schedule_measurement(&device.payload.service_url, id, &request)
                .await
            {
                Ok(status) => {
                    info!(device = %device.id, status, "Device answered schedule request");
                    status
                }
                Err(e) => {
                    warn!(device = %device.id, error = %e, "Schedule request failed");
                    TRANSPORT_FAILURE_STATUS
                }
            };
            outcomes.insert(device.id, status);
        }
        outcomes
    }
}
