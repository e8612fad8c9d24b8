//! # Config Loader
//!
//! Reads a [`CoordinatorBlueprint`] from TOML or JSON, checks it, and writes
//! it back out. Every section of the blueprint has defaults, so a missing
//! file can stand in for an empty one.
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let (blueprint, source) = ConfigLoader::load_or_default(Path::new("coordinator.toml")).unwrap();
//! println!("{source}: data in {}", blueprint.storage.data_dir.display());
//! ```

mod parser;
mod validator;

use std::fmt;
use std::path::{Path, PathBuf};

pub use contracts::CoordinatorBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;

/// Where a loaded blueprint came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file; built-in defaults
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Blueprint loading entry points
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a file, format chosen by extension (.toml / .json)
    pub fn load_from_path(path: &Path) -> Result<CoordinatorBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Like [`load_from_path`](Self::load_from_path), but a file that does not
    /// exist yields the (validated) defaults
    pub fn load_or_default(path: &Path) -> Result<(CoordinatorBlueprint, ConfigSource), ContractError> {
        if path.exists() {
            let blueprint = Self::load_from_path(path)?;
            return Ok((blueprint, ConfigSource::File(path.to_path_buf())));
        }
        let blueprint = CoordinatorBlueprint::default();
        validator::validate(&blueprint)?;
        Ok((blueprint, ConfigSource::Defaults))
    }

    /// Parse and validate a document
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<CoordinatorBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-check a blueprint, e.g. after command-line overrides
    pub fn validate(blueprint: &CoordinatorBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize the effective configuration
    pub fn render(
        blueprint: &CoordinatorBlueprint,
        format: ConfigFormat,
    ) -> Result<String, ContractError> {
        parser::render(blueprint, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET_TOML: &str = r#"
[storage]
data_dir = "./measurements"

[scheduler]
sweep_interval_ms = 50
time_til_deathbed_secs = 10.0
time_on_deathbed_secs = 20.0

[http]
timeout_ms = 750
"#;

    #[test]
    fn test_sections_override_defaults() {
        let bp = ConfigLoader::load_from_str(FLEET_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.scheduler.sweep_interval_ms, 50);
        assert_eq!(bp.scheduler.time_on_deathbed_secs, 20.0);
        assert_eq!(bp.http.timeout_ms, 750);
        assert_eq!(bp.registry.max_age_secs, 30.0);
    }

    #[test]
    fn test_rendered_config_reloads_in_both_formats() {
        let bp = ConfigLoader::load_from_str(FLEET_TOML, ConfigFormat::Toml).unwrap();
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let rendered = ConfigLoader::render(&bp, format).unwrap();
            let back = ConfigLoader::load_from_str(&rendered, format).unwrap();
            assert_eq!(back.storage.data_dir, bp.storage.data_dir);
            assert_eq!(back.target_state, bp.target_state);
            assert_eq!(back.http.timeout_ms, 750);
        }
    }

    #[test]
    fn test_invalid_values_rejected_after_parse() {
        let result = ConfigLoader::load_from_str("[dispatcher]\nworkers = 0\n", ConfigFormat::Toml);
        assert!(result.unwrap_err().to_string().contains("worker"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.toml");

        let (bp, source) = ConfigLoader::load_or_default(&path).unwrap();
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(bp.dispatcher.workers, 1);

        std::fs::write(&path, FLEET_TOML).unwrap();
        let (bp, source) = ConfigLoader::load_or_default(&path).unwrap();
        assert_eq!(source, ConfigSource::File(path.clone()));
        assert_eq!(bp.http.timeout_ms, 750);

        let unknown = dir.path().join("coordinator.yml");
        std::fs::write(&unknown, "").unwrap();
        assert!(ConfigLoader::load_from_path(&unknown).is_err());
    }
}
