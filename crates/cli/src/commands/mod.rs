//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_coordinator;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::CoordinatorBlueprint;

use crate::error::CliError;

/// Load and validate the configuration file
pub(crate) fn load_blueprint(path: &Path) -> Result<CoordinatorBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
