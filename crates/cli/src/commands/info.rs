//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigFormat;
use contracts::{CoordinatorBlueprint, MeasurementStatus, TargetState};
use coordinator::MeasurementStore;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    data_dir: String,
    sink: String,
    registry: RegistryInfo,
    scheduler: SchedulerInfo,
    dispatcher_workers: usize,
    http_timeout_ms: u64,
    target_state: TargetState,
    #[serde(skip_serializing_if = "Option::is_none")]
    measurements: Option<Vec<MeasurementInfo>>,
}

#[derive(Serialize)]
struct RegistryInfo {
    max_age_secs: f64,
    eviction_interval_ms: u64,
}

#[derive(Serialize)]
struct SchedulerInfo {
    sweep_interval_ms: u64,
    time_til_deathbed_secs: f64,
    time_on_deathbed_secs: f64,
}

#[derive(Serialize)]
struct MeasurementInfo {
    id: String,
    status: MeasurementStatus,
    duration_secs: f64,
    devices: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;
    if args.effective {
        let rendered = config_loader::ConfigLoader::render(&blueprint, ConfigFormat::Toml)
            .context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    let info = build_config_info(&blueprint, args);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &CoordinatorBlueprint, args: &InfoArgs) -> ConfigInfo {
    let measurements = args.measurements.then(|| {
        MeasurementStore::new(&blueprint.storage.data_dir)
            .reload()
            .into_iter()
            .map(|meta| MeasurementInfo {
                id: meta.id.to_string(),
                status: meta.status,
                duration_secs: meta.duration,
                devices: meta.recording_devices.len(),
            })
            .collect()
    });

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        data_dir: blueprint.storage.data_dir.display().to_string(),
        sink: format!("{:?}", blueprint.sink.sink_type),
        registry: RegistryInfo {
            max_age_secs: blueprint.registry.max_age_secs,
            eviction_interval_ms: blueprint.registry.eviction_interval_ms,
        },
        scheduler: SchedulerInfo {
            sweep_interval_ms: blueprint.scheduler.sweep_interval_ms,
            time_til_deathbed_secs: blueprint.scheduler.time_til_deathbed_secs,
            time_on_deathbed_secs: blueprint.scheduler.time_on_deathbed_secs,
        },
        dispatcher_workers: blueprint.dispatcher.workers,
        http_timeout_ms: blueprint.http.timeout_ms,
        target_state: blueprint.target_state,
        measurements,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("\n=== Coordinator Configuration ===\n");
    println!("Version: {}", info.version);
    println!("Data dir: {}", info.data_dir);
    println!("Sink: {}", info.sink);

    println!("\nRegistry:");
    println!("  Device max age: {}s", info.registry.max_age_secs);
    println!("  Eviction interval: {}ms", info.registry.eviction_interval_ms);

    println!("\nScheduler:");
    println!("  Sweep interval: {}ms", info.scheduler.sweep_interval_ms);
    println!("  Time til deathbed: {}s", info.scheduler.time_til_deathbed_secs);
    println!("  Time on deathbed: {}s", info.scheduler.time_on_deathbed_secs);

    println!("\nDispatcher workers: {}", info.dispatcher_workers);
    println!("HTTP timeout: {}ms", info.http_timeout_ms);

    let t = &info.target_state;
    println!("\nTarget state:");
    println!("  fs: {} Hz, {} samples/batch", t.fs, t.samples_per_batch);
    println!(
        "  accelerometer: {} (sens {})",
        if t.accelerometer_enabled { "on" } else { "off" },
        t.accelerometer_sens
    );
    println!(
        "  gyro: {} (sens {})",
        if t.gyro_enabled { "on" } else { "off" },
        t.gyro_sens
    );

    if let Some(ref measurements) = info.measurements {
        println!("\nStored measurements ({}):", measurements.len());
        for m in measurements {
            println!(
                "  - {} [{}] {}s, {} devices",
                m.id, m.status, m.duration_secs, m.devices
            );
        }
    }

    println!();
}
