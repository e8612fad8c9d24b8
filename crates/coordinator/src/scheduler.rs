//! Scheduler - measurement lifecycle state machine
//!
//! ```text
//! NEW -> SCHEDULED -> RECORDING -> COMPLETE
//!                              \-> FAILED
//!                              \-> DYING -> FAILED | COMPLETE
//! ```
//!
//! Request paths (`schedule`, device callbacks) and the sweep share one mutex
//! over the active / completed / failed collections and the deathbed. It is
//! never held across an await: sink and HTTP work happens after the decision
//! has been made under the lock.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use contracts::{
    format_time, DeviceId, MeasurementId, MeasurementStatus, RecordStatus, SampleBatch,
    SchedulerConfig,
};
use device_client::DeviceClient;
use dispatcher::DispatcherError;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::background::spawn_periodic;
use crate::error::{Result, SchedulerError};
use crate::measurement::{saturating_add, secs, Measurement};
use crate::reconciler::TargetStateController;
use crate::registry::DeviceRegistry;
use crate::store::MeasurementStore;

/// Used when a request gives no duration
pub const DEFAULT_DURATION_SECS: f64 = 10.0;

/// Reason recorded on devices force-failed by deathbed eviction
pub const DEATHBED_EVICTION_REASON: &str = "Evicting from deathbed";

/// How far past its end a measurement with no live devices is failed
const NO_DEVICES_GRACE_SECS: i64 = 1;

/// Lead time for a measurement without an explicit (or with a past) start
const START_LEAD_SECS: i64 = 2;

/// Deathbed delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerTimings {
    /// End time to DYING
    pub time_til_deathbed: TimeDelta,
    /// DYING to evicted
    pub time_on_deathbed: TimeDelta,
}

impl Default for SchedulerTimings {
    fn default() -> Self {
        Self {
            time_til_deathbed: TimeDelta::seconds(30),
            time_on_deathbed: TimeDelta::seconds(120),
        }
    }
}

impl From<&SchedulerConfig> for SchedulerTimings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            time_til_deathbed: secs(config.time_til_deathbed_secs),
            time_on_deathbed: secs(config.time_on_deathbed_secs),
        }
    }
}

/// Changes to a completed measurement
#[derive(Debug, Clone, Default)]
pub struct MeasurementEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Device renames, `(from, to)`
    pub devices: Vec<(DeviceId, DeviceId)>,
}

/// What one sweep pass changed
#[derive(Debug, Default, PartialEq)]
pub struct SweepReport {
    pub completed: Vec<MeasurementId>,
    pub failed: Vec<MeasurementId>,
    /// Newly placed on the deathbed
    pub dying: Vec<MeasurementId>,
    /// Metadata that could not be written
    pub store_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SweepAction {
    Complete,
    Fail,
    EnterDeathbed,
    Evict,
}

#[derive(Default)]
struct Collections {
    active: Vec<Measurement>,
    completed: Vec<Measurement>,
    failed: Vec<Measurement>,
    /// Measurement -> when it was first found overdue
    deathbed: HashMap<MeasurementId, DateTime<Utc>>,
}

impl Collections {
    fn active_mut(&mut self, id: &str) -> Option<&mut Measurement> {
        self.active.iter_mut().find(|m| m.id.as_str() == id)
    }
}

/// Decide what the sweep does with one active measurement
fn evaluate(
    m: &Measurement,
    now: DateTime<Utc>,
    on_deathbed_since: Option<DateTime<Utc>>,
    timings: &SchedulerTimings,
) -> Option<SweepAction> {
    // Still waiting for devices to answer the schedule request.
    if m.status == MeasurementStatus::New {
        return None;
    }

    let assigned = !m.devices.is_empty();
    if assigned && m.all_devices(RecordStatus::Complete) {
        return Some(SweepAction::Complete);
    }

    if now > saturating_add(m.end_time, TimeDelta::seconds(NO_DEVICES_GRACE_SECS))
        && (!assigned || m.all_devices(RecordStatus::Failed))
    {
        return Some(SweepAction::Fail);
    }

    // Without devices only the grace rule above applies.
    if assigned && now > saturating_add(m.end_time, timings.time_til_deathbed) {
        if m.any_device(RecordStatus::Failed) {
            return Some(SweepAction::Fail);
        }
        return match on_deathbed_since {
            None => Some(SweepAction::EnterDeathbed),
            Some(since) if now > saturating_add(since, timings.time_on_deathbed) => {
                Some(SweepAction::Evict)
            }
            Some(_) => None,
        };
    }

    None
}

/// Work out when a requested measurement should start
///
/// No start and no delay, or a start not in the future, means "shortly";
/// a delay is counted from `now`.
pub fn resolve_start_time(
    start: Option<DateTime<Utc>>,
    delay_secs: Option<f64>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let soon = now + TimeDelta::seconds(START_LEAD_SECS);
    match (start, delay_secs) {
        (Some(start), _) if start <= now => {
            info!(requested = %format_time(&start), "Start time is in the past, starting shortly");
            soon
        }
        (Some(start), _) => start,
        (None, Some(delay)) => saturating_add(now, secs(delay.max(0.0))),
        (None, None) => soon,
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SchedulerError::invalid("measurement name is empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(SchedulerError::invalid(format!(
            "measurement name '{name}' is not a valid directory name"
        )));
    }
    Ok(())
}

/// Measurement scheduler
pub struct Scheduler<C> {
    registry: Arc<DeviceRegistry<C>>,
    target: Arc<TargetStateController>,
    store: MeasurementStore,
    timings: SchedulerTimings,
    state: Mutex<Collections>,
}

impl<C: DeviceClient + 'static> Scheduler<C> {
    pub fn new(
        registry: Arc<DeviceRegistry<C>>,
        target: Arc<TargetStateController>,
        store: MeasurementStore,
        timings: SchedulerTimings,
    ) -> Self {
        Self {
            registry,
            target,
            store,
            timings,
            state: Mutex::new(Collections::default()),
        }
    }

    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    /// Schedule a measurement on every idle device
    ///
    /// Rejected without side effects if the window overlaps an active
    /// measurement. Devices that refuse or cannot be reached are recorded as
    /// FAILED; the measurement itself is still SCHEDULED.
    #[instrument(name = "schedule_measurement", skip(self, start, description), fields(start = %format_time(&start)))]
    pub async fn schedule(
        &self,
        name: &str,
        duration: f64,
        start: DateTime<Utc>,
        description: Option<String>,
    ) -> Result<MeasurementId> {
        validate_name(name)?;
        // Devices are told the start at second resolution.
        let start = start.trunc_subsecs(0);
        if !(duration.is_finite() && duration > 0.0) {
            return Err(SchedulerError::invalid(format!(
                "duration must be positive, got {duration}"
            )));
        }
        if start.checked_add_signed(secs(duration)).is_none() {
            return Err(SchedulerError::invalid("measurement ends out of range"));
        }

        let measurement = Measurement::new(name, start, duration, self.target.state(), description);
        let id = measurement.id.clone();
        {
            let mut state = self.state.lock();
            if let Some(existing) = state
                .active
                .iter()
                .find(|m| m.overlaps_with(start, duration))
            {
                warn!(existing = %existing.id, "Measurement times clash");
                return Err(SchedulerError::Clash {
                    existing: existing.id.clone(),
                });
            }
            state.active.push(measurement);
        }
        info!(measurement = %id, "Scheduling measurement");

        let outcomes = self.registry.schedule_measurement(&id, duration, start).await;
        let now = Utc::now();
        {
            let mut state = self.state.lock();
            if let Some(m) = state.active_mut(id.as_str()) {
                for (device, status) in &outcomes {
                    if *status == 200 {
                        // A fast device may already have called start.
                        if !m.devices.contains_key(device) {
                            m.update_device_status(device, RecordStatus::Scheduled, None, now);
                        }
                    } else {
                        let reason = format!("schedule request returned {status}");
                        m.update_device_status(device, RecordStatus::Failed, Some(reason), now);
                    }
                }
                if m.status == MeasurementStatus::New {
                    m.status = MeasurementStatus::Scheduled;
                }
            }
        }

        observability::record_measurement_scheduled(outcomes.len());
        Ok(id)
    }

    fn is_active(&self, id: &MeasurementId) -> bool {
        self.state.lock().active.iter().any(|m| &m.id == id)
    }

    /// A device reports it has started recording
    #[instrument(name = "start_measurement", skip_all, fields(measurement = %id, device = %device))]
    pub async fn start_measurement(&self, id: &MeasurementId, device: &DeviceId) -> bool {
        if !self.is_active(id) {
            debug!("Unknown or finished measurement");
            return false;
        }
        let Some(sink) = self.registry.sink(device) else {
            debug!("Unknown device");
            return false;
        };
        if let Err(e) = sink.start(id).await {
            error!(error = %e, "Failed to start data sink");
            return false;
        }

        let now = Utc::now();
        let updated = {
            let mut state = self.state.lock();
            match state.active_mut(id.as_str()) {
                Some(m) => {
                    if matches!(
                        m.status,
                        MeasurementStatus::New | MeasurementStatus::Scheduled
                    ) {
                        m.status = MeasurementStatus::Recording;
                    }
                    m.update_device_status(device, RecordStatus::Recording, None, now);
                    true
                }
                None => false,
            }
        };

        if !updated {
            warn!("Measurement finished while the sink was opening");
            if let Err(e) = sink.stop(id, Some("measurement no longer active")).await {
                warn!(error = %e, "Failed to stop data sink");
            }
        }
        updated
    }

    /// A device pushes a batch of samples
    ///
    /// Returns false if the measurement is not active, the device unknown,
    /// or the device's sink is not recording this measurement.
    pub fn record_data(&self, id: &MeasurementId, device: &DeviceId, batch: SampleBatch) -> bool {
        let Some(sink) = self.registry.sink(device) else {
            debug!(measurement = %id, device = %device, "Data from unknown device");
            return false;
        };
        if !self.is_active(id) {
            debug!(measurement = %id, device = %device, "Data for unknown measurement");
            return false;
        }
        let samples = batch.len();
        if !sink.handle_for(id, batch) {
            return false;
        }
        if let Some(m) = self.state.lock().active_mut(id.as_str()) {
            m.still_recording(device, samples, Utc::now());
        }
        true
    }

    /// A device reports it finished recording
    ///
    /// Queued samples are drained before the device is marked COMPLETE. A
    /// session the device has open for another measurement is left alone.
    #[instrument(name = "complete_measurement", skip_all, fields(measurement = %id, device = %device))]
    pub async fn complete_measurement(&self, id: &MeasurementId, device: &DeviceId) -> bool {
        if !self.is_active(id) {
            debug!("Unknown or finished measurement");
            return false;
        }
        let Some(sink) = self.registry.sink(device) else {
            debug!("Unknown device");
            return false;
        };
        stop_sink(&sink, id, None).await;

        let now = Utc::now();
        let mut state = self.state.lock();
        match state.active_mut(id.as_str()) {
            Some(m) => {
                m.update_device_status(device, RecordStatus::Complete, None, now);
                true
            }
            None => false,
        }
    }

    /// A device reports it failed
    #[instrument(name = "fail_measurement", skip_all, fields(measurement = %id, device = %device))]
    pub async fn fail_measurement(
        &self,
        id: &MeasurementId,
        device: &DeviceId,
        reason: Option<String>,
    ) -> bool {
        let Some(sink) = self.registry.sink(device) else {
            debug!("Unknown device");
            return false;
        };
        {
            let now = Utc::now();
            let mut state = self.state.lock();
            let Some(m) = state.active_mut(id.as_str()) else {
                debug!("Unknown or finished measurement");
                return false;
            };
            m.update_device_status(device, RecordStatus::Failed, reason.clone(), now);
        }
        stop_sink(&sink, id, reason.as_deref()).await;
        true
    }

    /// Advance every active measurement as of `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();
        let mut finished = Vec::new();
        let mut evicted_devices = Vec::new();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut idx = 0;
            while idx < state.active.len() {
                let since = state.deathbed.get(&state.active[idx].id).copied();
                let Some(action) = evaluate(&state.active[idx], now, since, &self.timings) else {
                    idx += 1;
                    continue;
                };

                if action == SweepAction::EnterDeathbed {
                    let m = &mut state.active[idx];
                    warn!(
                        measurement = %m.id,
                        end = %format_time(&m.end_time),
                        "Measurement overdue, adding to deathbed"
                    );
                    m.status = MeasurementStatus::Dying;
                    state.deathbed.insert(m.id.clone(), now);
                    report.dying.push(m.id.clone());
                    idx += 1;
                    continue;
                }

                let mut m = state.active.remove(idx);
                if let Some(since) = state.deathbed.remove(&m.id) {
                    debug!(measurement = %m.id, since = %format_time(&since), "Leaving deathbed");
                }

                if action == SweepAction::Evict {
                    warn!(measurement = %m.id, "Evicting measurement from deathbed");
                    for device in m.unfinished_devices() {
                        warn!(measurement = %m.id, device = %device, "Marking device failed");
                        m.update_device_status(
                            &device,
                            RecordStatus::Failed,
                            Some(DEATHBED_EVICTION_REASON.to_string()),
                            now,
                        );
                        evicted_devices.push((m.id.clone(), device));
                    }
                }

                if action == SweepAction::Complete {
                    info!(measurement = %m.id, "Measurement complete");
                    m.status = MeasurementStatus::Complete;
                    report.completed.push(m.id.clone());
                    state.completed.push(m.clone());
                } else {
                    warn!(
                        measurement = %m.id,
                        devices = m.devices.len(),
                        "Measurement failed"
                    );
                    m.status = MeasurementStatus::Failed;
                    report.failed.push(m.id.clone());
                    state.failed.push(m.clone());
                }
                finished.push(m);
            }
            observability::record_active_measurements(state.active.len(), state.deathbed.len());
        }

        for (id, device) in evicted_devices {
            if let Some(sink) = self.registry.sink(&device) {
                if sink.measurement().as_ref() == Some(&id) {
                    stop_sink(&sink, &id, Some(DEATHBED_EVICTION_REASON)).await;
                }
            }
        }

        for m in &finished {
            observability::record_measurement_finished(m.status);
            if let Err(e) = self.store.store(&m.to_metadata()) {
                error!(measurement = %m.id, error = %e, "Failed to persist measurement");
                report.store_errors.push(e.to_string());
            }
        }

        observability::record_sweep_duration_ms(started.elapsed().as_secs_f64() * 1000.0);
        report
    }

    /// Run the sweep on a fixed tick until `shutdown` is set
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        spawn_periodic("measurement_sweeper", period, shutdown, move || {
            let scheduler = Arc::clone(&scheduler);
            async move {
                scheduler.sweep_at(Utc::now()).await;
            }
        })
    }

    /// Measurements by status
    ///
    /// No filter returns active, completed and failed; DYING returns the
    /// deathbed; any other non-terminal status filters the active set.
    pub fn list_measurements(&self, status: Option<MeasurementStatus>) -> Vec<Measurement> {
        let state = self.state.lock();
        match status {
            None => state
                .active
                .iter()
                .chain(&state.completed)
                .chain(&state.failed)
                .cloned()
                .collect(),
            Some(MeasurementStatus::Complete) => state.completed.clone(),
            Some(MeasurementStatus::Failed) => state.failed.clone(),
            Some(MeasurementStatus::Dying) => state
                .active
                .iter()
                .filter(|m| state.deathbed.contains_key(&m.id))
                .cloned()
                .collect(),
            Some(other) => state
                .active
                .iter()
                .filter(|m| m.status == other)
                .cloned()
                .collect(),
        }
    }

    pub fn get_measurement(&self, id: &str, status: Option<MeasurementStatus>) -> Option<Measurement> {
        self.list_measurements(status)
            .into_iter()
            .find(|m| m.id.as_str() == id)
    }

    /// Delete a completed or failed measurement and its data
    #[instrument(name = "delete_measurement", skip(self))]
    pub fn delete_measurement(&self, id: &str) -> Result<Measurement> {
        let (terminal, measurement_id) = {
            let state = self.state.lock();
            if let Some(m) = state.completed.iter().find(|m| m.id.as_str() == id) {
                (MeasurementStatus::Complete, m.id.clone())
            } else if let Some(m) = state.failed.iter().find(|m| m.id.as_str() == id) {
                (MeasurementStatus::Failed, m.id.clone())
            } else if state.active.iter().any(|m| m.id.as_str() == id) {
                return Err(SchedulerError::invalid(format!(
                    "measurement '{id}' is still active"
                )));
            } else {
                return Err(SchedulerError::not_found(id));
            }
        };

        if self.store.measurement_dir(&measurement_id).exists() {
            self.store
                .delete(&measurement_id)
                .map_err(|errors| SchedulerError::persistence(id, errors))?;
        }

        let mut state = self.state.lock();
        let list = if terminal == MeasurementStatus::Complete {
            &mut state.completed
        } else {
            &mut state.failed
        };
        let idx = list
            .iter()
            .position(|m| m.id == measurement_id)
            .ok_or_else(|| SchedulerError::not_found(id))?;
        Ok(list.remove(idx))
    }

    /// Rename, re-describe or rename devices of a completed measurement
    #[instrument(name = "edit_measurement", skip(self, edit))]
    pub fn edit_measurement(&self, id: &str, edit: MeasurementEdit) -> Result<Measurement> {
        let original = self
            .get_measurement(id, Some(MeasurementStatus::Complete))
            .ok_or_else(|| SchedulerError::not_found(id))?;

        let mut edited = original.clone();
        if let Some(description) = edit.description {
            info!(from = ?original.description, to = %description, "Updating description");
            edited.description = Some(description);
        }
        if let Some(name) = edit.name.filter(|n| n != &original.name) {
            validate_name(&name)?;
            edited.rename(&name);
            if self.get_measurement(edited.id.as_str(), None).is_some() {
                return Err(SchedulerError::invalid(format!(
                    "measurement '{}' already exists",
                    edited.id
                )));
            }
        }
        for (from, to) in &edit.devices {
            if !edited.devices.contains_key(from) {
                return Err(SchedulerError::invalid(format!(
                    "device '{from}' did not record this measurement"
                )));
            }
            if edited.devices.contains_key(to) {
                return Err(SchedulerError::invalid(format!(
                    "device '{to}' already recorded this measurement"
                )));
            }
        }

        let persist = |e: contracts::ContractError| SchedulerError::persistence(id, vec![e.to_string()]);
        if edited.id != original.id {
            info!(to = %edited.id, "Renaming measurement");
            self.store.relocate(&original.id, &edited.id).map_err(persist)?;
        }
        for (from, to) in &edit.devices {
            info!(from = %from, to = %to, "Renaming device");
            self.store
                .rename_device(&edited.id, from, to)
                .map_err(persist)?;
            if let Some(record) = edited.devices.remove(from) {
                edited.devices.insert(to.clone(), record);
            }
        }
        self.store.store(&edited.to_metadata()).map_err(persist)?;

        let mut state = self.state.lock();
        match state.completed.iter_mut().find(|m| m.id == original.id) {
            Some(slot) => *slot = edited.clone(),
            None => state.completed.push(edited.clone()),
        }
        Ok(edited)
    }

    /// Replace the completed and failed collections with what is on disk
    pub fn reload(&self) -> usize {
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for meta in self.store.reload() {
            match meta.status {
                MeasurementStatus::Complete => completed.push(Measurement::from(meta)),
                MeasurementStatus::Failed => failed.push(Measurement::from(meta)),
                other => warn!(measurement = %meta.id, status = %other, "Ignoring non-terminal record"),
            }
        }
        let count = completed.len() + failed.len();
        let mut state = self.state.lock();
        state.completed = completed;
        state.failed = failed;
        info!(count, "Reloaded terminal measurements");
        count
    }
}

async fn stop_sink(
    sink: &dispatcher::AsyncSink<dispatcher::DeviceSink>,
    id: &MeasurementId,
    reason: Option<&str>,
) {
    match sink.stop(id, reason).await {
        Ok(()) => {}
        Err(DispatcherError::SinkNotStarted { .. }) => debug!(measurement = %id, "No sink session to stop"),
        Err(DispatcherError::SessionMismatch { running, .. }) => {
            warn!(measurement = %id, running = %running, "Sink is recording another measurement, left running")
        }
        Err(e) => warn!(measurement = %id, error = %e, "Failed to stop data sink"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{payload, Harness};
    use chrono::TimeZone;
    use contracts::{DeviceStatus, Sample};
    use device_client::MockMethod;
    use serde_json::json;

    fn batch(values: &[f64]) -> SampleBatch {
        values
            .iter()
            .map(|v| match json!({"time": v, "ax": v * 2.0}) {
                serde_json::Value::Object(map) => Sample::Record(map),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_resolve_start_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let soon = now + TimeDelta::seconds(2);

        assert_eq!(resolve_start_time(None, None, now), soon);
        assert_eq!(
            resolve_start_time(Some(now - TimeDelta::seconds(5)), None, now),
            soon
        );
        let later = now + TimeDelta::minutes(5);
        assert_eq!(resolve_start_time(Some(later), Some(1.0), now), later);
        assert_eq!(
            resolve_start_time(None, Some(30.0), now),
            now + TimeDelta::seconds(30)
        );
    }

    #[tokio::test]
    async fn test_clash_rejected_without_side_effects() {
        let h = Harness::new();
        h.idle_device("d1");
        let start = Utc::now() + TimeDelta::seconds(60);

        let first = h.scheduler.schedule("first", 10.0, start, None).await.unwrap();
        let err = h
            .scheduler
            .schedule("second", 10.0, start + TimeDelta::seconds(5), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Clash { ref existing } if *existing == first));
        assert_eq!(h.scheduler.list_measurements(None).len(), 1);
        assert_eq!(h.client.calls_to(MockMethod::Put, "http://d1").len(), 1);

        // a window touching the end also clashes, one strictly after does not
        assert!(h
            .scheduler
            .schedule("third", 1.0, start + TimeDelta::seconds(10), None)
            .await
            .is_err());
        assert!(h
            .scheduler
            .schedule("fourth", 1.0, start + TimeDelta::seconds(11), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let h = Harness::new();
        let now = Utc::now();
        for (name, duration) in [("", 1.0), ("a/b", 1.0), ("ok", 0.0), ("ok", f64::NAN)] {
            assert!(matches!(
                h.scheduler.schedule(name, duration, now, None).await,
                Err(SchedulerError::Invalid { .. })
            ));
        }
        assert!(h.scheduler.list_measurements(None).is_empty());
    }

    #[tokio::test]
    async fn test_partial_schedule_failure_still_scheduled() {
        let h = Harness::new();
        h.idle_device("d1");
        h.idle_device("d2");
        h.client.set_failing("http://d2", true);
        h.registry
            .accept(DeviceId::from("busy"), payload("busy", DeviceStatus::Recording));

        let id = h
            .scheduler
            .schedule("m", 1.0, Utc::now(), Some("desc".into()))
            .await
            .unwrap();
        let m = h.scheduler.get_measurement(id.as_str(), None).unwrap();

        assert_eq!(m.status, MeasurementStatus::Scheduled);
        assert_eq!(m.description.as_deref(), Some("desc"));
        assert_eq!(m.devices.len(), 2);
        assert_eq!(m.device_state(&"d1".into()), Some(RecordStatus::Scheduled));
        assert_eq!(m.device_state(&"d2".into()), Some(RecordStatus::Failed));
        assert!(m.devices[&DeviceId::from("d2")]
            .reason
            .as_deref()
            .unwrap()
            .contains("500"));
    }

    #[tokio::test]
    async fn test_no_devices_fails_after_grace_only() {
        let h = Harness::new();
        let id = h.scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        let end = h.scheduler.get_measurement(id.as_str(), None).unwrap().end_time;

        let at_grace = end + TimeDelta::seconds(1);
        assert_eq!(h.scheduler.sweep_at(at_grace).await, SweepReport::default());

        let report = h.scheduler.sweep_at(at_grace + TimeDelta::milliseconds(1)).await;
        assert_eq!(report.failed, vec![id.clone()]);
        assert!(h
            .scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Failed))
            .is_some());
        assert!(h.scheduler.store().metadata_path(&id).exists());
    }

    #[tokio::test]
    async fn test_device_lifecycle_completes_and_persists() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let id = h.scheduler.schedule("first", 0.2, Utc::now(), None).await.unwrap();

        assert!(h.scheduler.start_measurement(&id, &d1).await);
        assert_eq!(
            h.scheduler.get_measurement(id.as_str(), None).unwrap().status,
            MeasurementStatus::Recording
        );
        assert!(h.scheduler.record_data(&id, &d1, batch(&[0.0, 0.002])));
        assert!(h.scheduler.record_data(&id, &d1, batch(&[0.004])));
        assert!(h.scheduler.complete_measurement(&id, &d1).await);

        let report = h.scheduler.sweep_at(Utc::now()).await;
        assert_eq!(report.completed, vec![id.clone()]);
        assert!(report.store_errors.is_empty());

        let done = h
            .scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Complete))
            .unwrap();
        assert_eq!(done.devices[&d1].count, 3);
        assert!(h.scheduler.list_measurements(Some(MeasurementStatus::Recording)).is_empty());

        let data = std::fs::read_to_string(h.dir.path().join(id.as_path()).join("d1/data.out")).unwrap();
        assert_eq!(data.lines().count(), 4);

        // terminal: further callbacks are rejected
        assert!(!h.scheduler.record_data(&id, &d1, batch(&[1.0])));
        assert!(!h.scheduler.complete_measurement(&id, &d1).await);

        // a fresh scheduler over the same directory reloads the same record
        let scheduler = Scheduler::new(
            Arc::clone(&h.registry),
            Arc::new(TargetStateController::new(
                Default::default(),
                h.dispatcher.handle(),
            )),
            MeasurementStore::new(h.dir.path()),
            SchedulerTimings::default(),
        );
        assert_eq!(scheduler.reload(), 1);
        let reloaded = scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Complete))
            .unwrap();
        assert_eq!(reloaded.start_time, done.start_time);
        assert_eq!(reloaded.end_time, done.end_time);
        assert_eq!(reloaded.devices[&d1].state, RecordStatus::Complete);
        assert_eq!(reloaded.devices[&d1].count, 3);
    }

    #[tokio::test]
    async fn test_callbacks_need_known_pairing() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let id = h.scheduler.schedule("m", 5.0, Utc::now(), None).await.unwrap();
        let ghost_measurement = MeasurementId::from_raw("20000101_000000_ghost");
        let ghost_device = DeviceId::from("ghost");

        assert!(!h.scheduler.start_measurement(&ghost_measurement, &d1).await);
        assert!(!h.scheduler.start_measurement(&id, &ghost_device).await);
        assert!(!h.scheduler.record_data(&id, &ghost_device, batch(&[0.0])));
        assert!(!h.scheduler.complete_measurement(&ghost_measurement, &d1).await);
        assert!(!h.scheduler.fail_measurement(&id, &ghost_device, None).await);
        // known pair but no session yet: the batch is not accepted
        assert!(!h.scheduler.record_data(&id, &d1, batch(&[0.0])));
    }

    #[tokio::test]
    async fn test_callbacks_for_other_measurement_leave_session_alone() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let now = Utc::now();
        let a = h.scheduler.schedule("a", 5.0, now, None).await.unwrap();
        let b = h
            .scheduler
            .schedule("b", 5.0, now + TimeDelta::seconds(60), None)
            .await
            .unwrap();
        assert!(h.scheduler.start_measurement(&a, &d1).await);

        assert!(!h.scheduler.record_data(&b, &d1, batch(&[42.0])));
        assert!(h.scheduler.complete_measurement(&b, &d1).await);

        let sink = h.registry.sink(&d1).unwrap();
        assert_eq!(sink.measurement(), Some(a.clone()));
        let running = h.scheduler.get_measurement(a.as_str(), None).unwrap();
        assert_eq!(running.device_state(&d1), Some(RecordStatus::Recording));
        assert_eq!(running.devices[&d1].count, 0);

        assert!(h.scheduler.record_data(&a, &d1, batch(&[1.0])));
        assert!(h.scheduler.complete_measurement(&a, &d1).await);
        let data = std::fs::read_to_string(h.dir.path().join(a.as_path()).join("d1/data.out")).unwrap();
        assert_eq!(data.lines().collect::<Vec<_>>(), vec!["time,ax", "1.0,2.0"]);
        assert!(!h.dir.path().join(b.as_path()).join("d1/data.out").exists());
    }

    #[tokio::test]
    async fn test_short_deathbed_never_fails_empty_measurement_early() {
        let h = Harness::new();
        let scheduler = h.scheduler_with(
            MeasurementStore::new(h.dir.path()),
            SchedulerTimings {
                time_til_deathbed: TimeDelta::milliseconds(100),
                time_on_deathbed: TimeDelta::milliseconds(100),
            },
        );
        let id = scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        let end = scheduler.get_measurement(id.as_str(), None).unwrap().end_time;

        for offset in [200, 500, 1000] {
            let report = scheduler.sweep_at(end + TimeDelta::milliseconds(offset)).await;
            assert_eq!(report, SweepReport::default(), "at end + {offset}ms");
        }
        let report = scheduler.sweep_at(end + TimeDelta::milliseconds(1001)).await;
        assert_eq!(report.failed, vec![id]);
    }

    #[tokio::test]
    async fn test_unbounded_deathbed_delays_do_not_overflow() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let scheduler = h.scheduler_with(
            MeasurementStore::new(h.dir.path()),
            SchedulerTimings {
                time_til_deathbed: secs(1e13),
                time_on_deathbed: TimeDelta::MAX,
            },
        );
        let id = scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        assert!(scheduler.start_measurement(&id, &d1).await);

        let later = Utc::now() + TimeDelta::days(365);
        assert_eq!(scheduler.sweep_at(later).await, SweepReport::default());

        assert!(scheduler.complete_measurement(&id, &d1).await);
        assert_eq!(scheduler.sweep_at(later).await.completed, vec![id]);
    }

    #[tokio::test]
    async fn test_store_failure_reported_by_sweep() {
        let h = Harness::new();
        let not_a_dir = h.dir.path().join("data");
        std::fs::write(&not_a_dir, "").unwrap();
        let scheduler = h.scheduler_with(MeasurementStore::new(&not_a_dir), SchedulerTimings::default());

        let id = scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        let end = scheduler.get_measurement(id.as_str(), None).unwrap().end_time;
        let report = scheduler.sweep_at(end + TimeDelta::seconds(2)).await;

        assert_eq!(report.failed, vec![id.clone()]);
        assert_eq!(report.store_errors.len(), 1);
        assert!(report.store_errors[0].contains(id.as_str()));
        // still tracked in memory
        assert!(scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Failed))
            .is_some());
    }

    #[tokio::test]
    async fn test_all_failed_devices_fail_measurement() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let id = h.scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        assert!(h.scheduler.start_measurement(&id, &d1).await);
        assert!(h
            .scheduler
            .fail_measurement(&id, &d1, Some("sensor fault".into()))
            .await);

        let end = h.scheduler.get_measurement(id.as_str(), None).unwrap().end_time;
        assert!(h.scheduler.sweep_at(end).await.failed.is_empty());
        let report = h.scheduler.sweep_at(end + TimeDelta::seconds(2)).await;
        assert_eq!(report.failed, vec![id.clone()]);

        let failed = h
            .scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Failed))
            .unwrap();
        assert_eq!(failed.devices[&d1].reason.as_deref(), Some("sensor fault"));
        assert!(!h.registry.sink(&d1).unwrap().is_running());
    }

    #[tokio::test]
    async fn test_partially_failed_dies_after_deathbed_delay() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let d2 = h.idle_device("d2");
        let id = h.scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        assert!(h.scheduler.start_measurement(&id, &d1).await);
        assert!(h.scheduler.start_measurement(&id, &d2).await);
        assert!(h.scheduler.fail_measurement(&id, &d2, None).await);

        let end = h.scheduler.get_measurement(id.as_str(), None).unwrap().end_time;
        assert_eq!(h.scheduler.sweep_at(end + TimeDelta::seconds(10)).await, SweepReport::default());
        let report = h.scheduler.sweep_at(end + TimeDelta::seconds(31)).await;
        assert_eq!(report.failed, vec![id]);
        assert!(report.dying.is_empty());
    }

    #[tokio::test]
    async fn test_deathbed_entry_and_eviction() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let id = h.scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        assert!(h.scheduler.start_measurement(&id, &d1).await);
        let end = h.scheduler.get_measurement(id.as_str(), None).unwrap().end_time;

        let til = end + TimeDelta::seconds(30);
        assert_eq!(h.scheduler.sweep_at(til).await, SweepReport::default());

        let entered = til + TimeDelta::milliseconds(1);
        let report = h.scheduler.sweep_at(entered).await;
        assert_eq!(report.dying, vec![id.clone()]);
        let dying = h.scheduler.list_measurements(Some(MeasurementStatus::Dying));
        assert_eq!(dying.len(), 1);
        assert_eq!(dying[0].status, MeasurementStatus::Dying);

        // still within the time on the deathbed
        let on = entered + TimeDelta::seconds(120);
        assert_eq!(h.scheduler.sweep_at(on).await, SweepReport::default());

        let report = h.scheduler.sweep_at(on + TimeDelta::milliseconds(1)).await;
        assert_eq!(report.failed, vec![id.clone()]);
        assert!(h.scheduler.list_measurements(Some(MeasurementStatus::Dying)).is_empty());

        let failed = h
            .scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Failed))
            .unwrap();
        let record = &failed.devices[&d1];
        assert_eq!(record.state, RecordStatus::Failed);
        assert_eq!(record.reason.as_deref(), Some(DEATHBED_EVICTION_REASON));
        assert!(!h.registry.sink(&d1).unwrap().is_running());
    }

    #[tokio::test]
    async fn test_late_completion_rescues_dying_measurement() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let id = h.scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        assert!(h.scheduler.start_measurement(&id, &d1).await);
        let end = h.scheduler.get_measurement(id.as_str(), None).unwrap().end_time;

        let report = h.scheduler.sweep_at(end + TimeDelta::seconds(31)).await;
        assert_eq!(report.dying, vec![id.clone()]);

        assert!(h.scheduler.complete_measurement(&id, &d1).await);
        let report = h.scheduler.sweep_at(end + TimeDelta::seconds(32)).await;
        assert_eq!(report.completed, vec![id.clone()]);
        assert!(h.scheduler.list_measurements(Some(MeasurementStatus::Dying)).is_empty());
    }

    #[tokio::test]
    async fn test_never_started_device_goes_through_deathbed() {
        let h = Harness::new();
        h.idle_device("d1");
        let id = h.scheduler.schedule("m", 1.0, Utc::now(), None).await.unwrap();
        let end = h.scheduler.get_measurement(id.as_str(), None).unwrap().end_time;

        let entered = end + TimeDelta::seconds(31);
        assert_eq!(h.scheduler.sweep_at(entered).await.dying, vec![id.clone()]);
        let report = h.scheduler.sweep_at(entered + TimeDelta::seconds(121)).await;
        assert_eq!(report.failed, vec![id.clone()]);

        let failed = h
            .scheduler
            .get_measurement(id.as_str(), Some(MeasurementStatus::Failed))
            .unwrap();
        assert_eq!(
            failed.devices[&DeviceId::from("d1")].reason.as_deref(),
            Some(DEATHBED_EVICTION_REASON)
        );
    }

    #[tokio::test]
    async fn test_delete_and_edit() {
        let h = Harness::new();
        let d1 = h.idle_device("d1");
        let id = h.scheduler.schedule("first", 0.2, Utc::now(), None).await.unwrap();
        assert!(h.scheduler.start_measurement(&id, &d1).await);
        assert!(h.scheduler.record_data(&id, &d1, batch(&[0.0])));

        // active measurements cannot be deleted or edited
        assert!(matches!(
            h.scheduler.delete_measurement(id.as_str()),
            Err(SchedulerError::Invalid { .. })
        ));
        assert!(matches!(
            h.scheduler.edit_measurement(id.as_str(), MeasurementEdit::default()),
            Err(SchedulerError::NotFound { .. })
        ));

        assert!(h.scheduler.complete_measurement(&id, &d1).await);
        h.scheduler.sweep_at(Utc::now()).await;

        let edited = h
            .scheduler
            .edit_measurement(
                id.as_str(),
                MeasurementEdit {
                    name: Some("renamed".into()),
                    description: Some("after the fact".into()),
                    devices: vec![(d1.clone(), DeviceId::from("rpi-01"))],
                },
            )
            .unwrap();
        assert_ne!(edited.id, id);
        assert!(h.scheduler.get_measurement(id.as_str(), None).is_none());
        assert!(!h.scheduler.store().measurement_dir(&id).exists());
        let new_dir = h.scheduler.store().measurement_dir(&edited.id);
        assert!(new_dir.join("rpi-01/data.out").exists());
        let meta = h.scheduler.store().load(&new_dir).unwrap();
        assert_eq!(meta.description.as_deref(), Some("after the fact"));
        assert!(meta.recording_devices.contains_key("rpi-01"));

        let deleted = h.scheduler.delete_measurement(edited.id.as_str()).unwrap();
        assert_eq!(deleted.id, edited.id);
        assert!(!new_dir.exists());
        assert!(matches!(
            h.scheduler.delete_measurement(edited.id.as_str()),
            Err(SchedulerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let h = Harness::new();
        h.idle_device("d1");
        let now = Utc::now();
        let scheduled = h
            .scheduler
            .schedule("later", 1.0, now + TimeDelta::hours(1), None)
            .await
            .unwrap();
        let failing = h.scheduler.schedule("now", 1.0, now, None).await.unwrap();
        h.client.set_failing("http://d1", true);
        let unreachable = h
            .scheduler
            .schedule("unreachable", 1.0, now + TimeDelta::minutes(10), None)
            .await
            .unwrap();

        let report = h.scheduler.sweep_at(now + TimeDelta::minutes(15)).await;
        assert_eq!(report.dying, vec![failing.clone()]);
        assert_eq!(report.failed, vec![unreachable.clone()]);

        let ids = |status| -> Vec<MeasurementId> {
            h.scheduler
                .list_measurements(status)
                .into_iter()
                .map(|m| m.id)
                .collect()
        };
        assert_eq!(ids(None).len(), 3);
        assert_eq!(ids(Some(MeasurementStatus::Scheduled)), vec![scheduled]);
        assert_eq!(ids(Some(MeasurementStatus::Dying)), vec![failing]);
        assert_eq!(ids(Some(MeasurementStatus::Failed)), vec![unreachable]);
        assert!(ids(Some(MeasurementStatus::Complete)).is_empty());
    }
}
