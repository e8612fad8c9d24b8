//! Config validation
//!
//! Rules:
//! - dispatcher.workers >= 1
//! - every interval / timeout / age > 0, delays and ages at most a year
//! - target state fs and samplesPerBatch > 0
//! - data_dir not empty

use contracts::{ContractError, CoordinatorBlueprint};

/// Validate a CoordinatorBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &CoordinatorBlueprint) -> Result<(), ContractError> {
    validate_storage(blueprint)?;
    validate_timings(blueprint)?;
    validate_dispatcher(blueprint)?;
    validate_target_state(blueprint)?;
    Ok(())
}

fn validate_storage(blueprint: &CoordinatorBlueprint) -> Result<(), ContractError> {
    if blueprint.storage.data_dir.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "storage.data_dir",
            "data_dir cannot be empty",
        ));
    }
    Ok(())
}

/// Upper bound for any configured delay or age (one year)
const MAX_SECS: f64 = 365.0 * 24.0 * 3600.0;

fn positive_secs(field: &str, value: f64) -> Result<(), ContractError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ContractError::config_validation(
            field,
            format!("must be > 0, got {value}"),
        ));
    }
    if value > MAX_SECS {
        return Err(ContractError::config_validation(
            field,
            format!("must be at most {MAX_SECS} seconds, got {value}"),
        ));
    }
    Ok(())
}

fn positive_ms(field: &str, value: u64) -> Result<(), ContractError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ContractError::config_validation(field, "must be > 0"))
    }
}

fn validate_timings(blueprint: &CoordinatorBlueprint) -> Result<(), ContractError> {
    positive_secs("registry.max_age_secs", blueprint.registry.max_age_secs)?;
    positive_ms(
        "registry.eviction_interval_ms",
        blueprint.registry.eviction_interval_ms,
    )?;
    positive_ms(
        "scheduler.sweep_interval_ms",
        blueprint.scheduler.sweep_interval_ms,
    )?;
    positive_secs(
        "scheduler.time_til_deathbed_secs",
        blueprint.scheduler.time_til_deathbed_secs,
    )?;
    positive_secs(
        "scheduler.time_on_deathbed_secs",
        blueprint.scheduler.time_on_deathbed_secs,
    )?;
    positive_ms("http.timeout_ms", blueprint.http.timeout_ms)?;
    Ok(())
}

fn validate_dispatcher(blueprint: &CoordinatorBlueprint) -> Result<(), ContractError> {
    if blueprint.dispatcher.workers == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.workers",
            "at least one worker is required",
        ));
    }
    Ok(())
}

fn validate_target_state(blueprint: &CoordinatorBlueprint) -> Result<(), ContractError> {
    let target = &blueprint.target_state;
    if target.fs == 0 {
        return Err(ContractError::config_validation(
            "target_state.fs",
            "fs must be > 0",
        ));
    }
    if target.samples_per_batch == 0 {
        return Err(ContractError::config_validation(
            "target_state.samplesPerBatch",
            "samplesPerBatch must be > 0",
        ));
    }
    Ok(())
}
