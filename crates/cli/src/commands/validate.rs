//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CoordinatorBlueprint, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    data_dir: String,
    sink: String,
    workers: usize,
    max_age_secs: f64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    data_dir: blueprint.storage.data_dir.display().to_string(),
                    sink: format!("{:?}", blueprint.sink.sink_type),
                    workers: blueprint.dispatcher.workers,
                    max_age_secs: blueprint.registry.max_age_secs,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &CoordinatorBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sink.sink_type == SinkType::Log {
        warnings.push("sink.sink_type is 'log' - samples will not be stored".to_string());
    }

    if blueprint.dispatcher.workers > 1 {
        warnings.push(format!(
            "dispatcher.workers = {} - commands may complete out of order",
            blueprint.dispatcher.workers
        ));
    }

    let sweep_secs = blueprint.scheduler.sweep_interval_ms as f64 / 1000.0;
    if sweep_secs > 1.0 {
        warnings.push(format!(
            "scheduler.sweep_interval_ms = {} - measurements may finish up to {:.1}s late",
            blueprint.scheduler.sweep_interval_ms, sweep_secs
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Data dir: {}", summary.data_dir);
            println!("  Sink: {}", summary.sink);
            println!("  Workers: {}", summary.workers);
            println!("  Device max age: {}s", summary.max_age_secs);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
