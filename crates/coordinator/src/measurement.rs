//! In-memory measurement record

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use contracts::{
    DeviceId, DeviceRecord, MeasurementId, MeasurementMetadata, MeasurementStatus, RecordStatus,
    TargetState,
};
use tracing::info;

/// Seconds as a chrono delta, millisecond resolution, saturating
pub fn secs(seconds: f64) -> TimeDelta {
    let millis = (seconds * 1000.0).round() as i64;
    TimeDelta::try_milliseconds(millis).unwrap_or(if millis < 0 {
        TimeDelta::MIN
    } else {
        TimeDelta::MAX
    })
}

/// `time + delta`, saturating at the latest representable time
pub fn saturating_add(time: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    time.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One measurement, active or terminal
///
/// The per-device map is the source of truth for progress; `status` is the
/// overall state the sweep derives from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: MeasurementId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
    pub end_time: DateTime<Utc>,
    pub description: Option<String>,
    /// Target state at the time of scheduling
    pub parameters: TargetState,
    pub status: MeasurementStatus,
    pub devices: BTreeMap<DeviceId, DeviceRecord>,
}

impl Measurement {
    pub fn new(
        name: &str,
        start_time: DateTime<Utc>,
        duration: f64,
        parameters: TargetState,
        description: Option<String>,
    ) -> Self {
        Self {
            id: MeasurementId::new(&start_time, name),
            name: name.to_string(),
            start_time,
            duration,
            end_time: saturating_add(start_time, secs(duration)),
            description,
            parameters,
            status: MeasurementStatus::New,
            devices: BTreeMap::new(),
        }
    }

    /// True if `[start, start + duration]` intersects this measurement's window
    pub fn overlaps_with(&self, start: DateTime<Utc>, duration: f64) -> bool {
        let end = saturating_add(start, secs(duration));
        (self.start_time <= start && start <= self.end_time)
            || (start <= self.start_time && self.start_time <= end)
    }

    /// Set a device's state, keeping its sample count if it was recording
    pub fn update_device_status(
        &mut self,
        device: &DeviceId,
        state: RecordStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) {
        info!(
            measurement = %self.id,
            device = %device,
            state = %state,
            reason = ?reason,
            "Updating recording device state"
        );
        let (count, last) = match self.devices.get(device) {
            Some(current) if current.state == RecordStatus::Recording => {
                (current.count, current.last)
            }
            _ => (0, None),
        };
        self.devices.insert(
            device.clone(),
            DeviceRecord {
                state,
                reason,
                time: now,
                last,
                count,
            },
        );
    }

    /// Note a data batch from a recording device
    pub fn still_recording(&mut self, device: &DeviceId, samples: usize, now: DateTime<Utc>) {
        if let Some(record) = self.devices.get_mut(device) {
            if record.state == RecordStatus::Recording {
                record.last = Some(now);
                record.count += samples as u64;
            }
        }
    }

    pub fn device_state(&self, device: &DeviceId) -> Option<RecordStatus> {
        self.devices.get(device).map(|r| r.state)
    }

    pub fn all_devices(&self, state: RecordStatus) -> bool {
        self.devices.values().all(|r| r.state == state)
    }

    pub fn any_device(&self, state: RecordStatus) -> bool {
        self.devices.values().any(|r| r.state == state)
    }

    /// Devices not yet COMPLETE or FAILED
    pub fn unfinished_devices(&self) -> Vec<DeviceId> {
        self.devices
            .iter()
            .filter(|(_, r)| !r.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Rename, which also changes the id (the start time is kept)
    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
        self.id = MeasurementId::new(&self.start_time, name);
    }

    pub fn to_metadata(&self) -> MeasurementMetadata {
        MeasurementMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            start_time: self.start_time,
            duration: self.duration,
            description: self.description.clone(),
            measurement_parameters: self.parameters,
            status: self.status,
            recording_devices: self.devices.clone(),
        }
    }
}

impl From<MeasurementMetadata> for Measurement {
    fn from(meta: MeasurementMetadata) -> Self {
        Self {
            end_time: saturating_add(meta.start_time, secs(meta.duration)),
            id: meta.id,
            name: meta.name,
            start_time: meta.start_time,
            duration: meta.duration,
            description: meta.description,
            parameters: meta.measurement_parameters,
            status: meta.status,
            devices: meta.recording_devices,
        }
    }
}
