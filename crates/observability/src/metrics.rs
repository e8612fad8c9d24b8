//! Coordinator metrics
//!
//! Thin recording functions over the `metrics` facade. Nothing is exported
//! unless a recorder (the Prometheus exporter) has been installed.

use contracts::MeasurementStatus;
use metrics::{counter, gauge, histogram};

/// Record an accepted heartbeat
pub fn record_heartbeat(device: &str) {
    counter!(
        "vibe_coordinator_heartbeats_total",
        "device" => device.to_string()
    )
    .increment(1);
}

/// Record a device dropped for not heartbeating
pub fn record_device_evicted(device: &str) {
    counter!(
        "vibe_coordinator_devices_evicted_total",
        "device" => device.to_string()
    )
    .increment(1);
}

/// Record the current size of the device table
pub fn record_devices_known(count: usize) {
    gauge!("vibe_coordinator_devices").set(count as f64);
}

/// Record a measurement accepted by the scheduler
pub fn record_measurement_scheduled(devices: usize) {
    counter!("vibe_coordinator_measurements_scheduled_total").increment(1);
    histogram!("vibe_coordinator_measurement_devices").record(devices as f64);
}

/// Record a measurement reaching a terminal status
pub fn record_measurement_finished(status: MeasurementStatus) {
    match status {
        MeasurementStatus::Complete => {
            counter!("vibe_coordinator_measurements_completed_total").increment(1)
        }
        MeasurementStatus::Failed => {
            counter!("vibe_coordinator_measurements_failed_total").increment(1)
        }
        _ => {}
    }
}

/// Record the number of active measurements and deathbed members
pub fn record_active_measurements(active: usize, dying: usize) {
    gauge!("vibe_coordinator_measurements_active").set(active as f64);
    gauge!("vibe_coordinator_measurements_dying").set(dying as f64);
}

/// Record a target state push to a device
pub fn record_target_state_patch(device: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "vibe_coordinator_target_state_patches_total",
        "device" => device.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a dispatcher command outcome
pub fn record_command_processed(kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "vibe_coordinator_commands_processed_total",
        "command" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record one sample batch handed to a sink delegate
pub fn record_sink_batch(sink: &str, samples: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "vibe_coordinator_sink_batches_total",
        "sink" => sink.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    if success {
        counter!(
            "vibe_coordinator_samples_written_total",
            "sink" => sink.to_string()
        )
        .increment(samples as u64);
    }
}

/// Record how long one sweep pass took
pub fn record_sweep_duration_ms(duration_ms: f64) {
    histogram!("vibe_coordinator_sweep_duration_ms").record(duration_ms);
}
