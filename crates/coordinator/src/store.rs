//! MeasurementStore - terminal measurement metadata on disk
//!
//! Layout: `<data_dir>/<yyyymmdd>/<hhmmss>/<name>/metadata.json`, with one
//! sub-directory per device next to it holding that device's samples.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, DeviceId, MeasurementId, MeasurementMetadata};
use tracing::{debug, error, info, instrument, warn};

/// Metadata file name inside a measurement directory
pub const METADATA_FILE: &str = "metadata.json";

/// Filesystem store for measurement metadata
#[derive(Debug, Clone)]
pub struct MeasurementStore {
    data_dir: PathBuf,
}

impl MeasurementStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding a measurement's metadata and device data
    pub fn measurement_dir(&self, id: &MeasurementId) -> PathBuf {
        self.data_dir.join(id.as_path())
    }

    pub fn metadata_path(&self, id: &MeasurementId) -> PathBuf {
        self.measurement_dir(id).join(METADATA_FILE)
    }

    /// Write (or overwrite) a measurement's metadata record
    #[instrument(name = "store_measurement", skip(self, meta), fields(measurement = %meta.id))]
    pub fn store(&self, meta: &MeasurementMetadata) -> Result<(), ContractError> {
        let dir = self.measurement_dir(&meta.id);
        let persist = || -> Result<(), ContractError> {
            fs::create_dir_all(&dir)?;
            let mut writer = BufWriter::new(File::create(dir.join(METADATA_FILE))?);
            serde_json::to_writer_pretty(&mut writer, meta)?;
            writer.flush()?;
            Ok(())
        };
        persist().map_err(|e| ContractError::persistence(meta.id.as_str(), e.to_string()))?;
        debug!(status = %meta.status, "Metadata stored");
        Ok(())
    }

    /// Read the metadata record in `dir`
    pub fn load(&self, dir: &Path) -> Result<MeasurementMetadata, ContractError> {
        let path = dir.join(METADATA_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| ContractError::persistence(path.display().to_string(), e.to_string()))?;
        let meta = serde_json::from_str(&content)
            .map_err(|e| ContractError::persistence(path.display().to_string(), e.to_string()))?;
        Ok(meta)
    }

    /// Every readable record three levels below the data directory
    ///
    /// Unreadable records are logged and skipped.
    #[instrument(name = "store_reload", skip(self), fields(data_dir = %self.data_dir.display()))]
    pub fn reload(&self) -> Vec<MeasurementMetadata> {
        let mut found = Vec::new();
        for day in sub_dirs(&self.data_dir) {
            for time in sub_dirs(&day) {
                for dir in sub_dirs(&time) {
                    match self.load(&dir) {
                        Ok(meta) => found.push(meta),
                        Err(e) => warn!(dir = %dir.display(), error = %e, "Skipping unreadable measurement"),
                    }
                }
            }
        }
        found.sort_by(|a, b| a.id.cmp(&b.id));
        info!(count = found.len(), "Reloaded measurements");
        found
    }

    /// Remove a measurement directory and everything in it
    ///
    /// Keeps going past individual failures; the error lists every path that
    /// could not be removed.
    #[instrument(name = "store_delete", skip(self), fields(measurement = %id))]
    pub fn delete(&self, id: &MeasurementId) -> Result<(), Vec<String>> {
        let dir = self.measurement_dir(id);
        let mut errors = Vec::new();
        remove_tree(&dir, &mut errors);
        if errors.is_empty() {
            prune_empty_parents(&dir, &self.data_dir);
            info!("Measurement deleted");
            Ok(())
        } else {
            error!(errors = errors.len(), "Measurement deletion incomplete");
            Err(errors)
        }
    }

    /// Move a measurement directory to the location of a new id
    pub fn relocate(&self, from: &MeasurementId, to: &MeasurementId) -> Result<(), ContractError> {
        let source = self.measurement_dir(from);
        let target = self.measurement_dir(to);
        if target.exists() {
            return Err(ContractError::persistence(
                to.as_str(),
                "target directory already exists",
            ));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)
            .map_err(|e| ContractError::persistence(from.as_str(), e.to_string()))?;
        prune_empty_parents(&source, &self.data_dir);
        Ok(())
    }

    /// Rename one device's data directory inside a measurement
    pub fn rename_device(
        &self,
        id: &MeasurementId,
        from: &DeviceId,
        to: &DeviceId,
    ) -> Result<(), ContractError> {
        let dir = self.measurement_dir(id);
        let source = dir.join(from.as_ref());
        if !source.exists() {
            return Ok(());
        }
        fs::rename(source, dir.join(to.as_ref()))
            .map_err(|e| ContractError::persistence(id.as_str(), e.to_string()))
    }
}

fn sub_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn remove_tree(path: &Path, errors: &mut Vec<String>) {
    if path.is_dir() {
        match fs::read_dir(path) {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        Ok(entry) => remove_tree(&entry.path(), errors),
                        Err(e) => errors.push(format!("{}: {e}", path.display())),
                    }
                }
            }
            Err(e) => {
                errors.push(format!("{}: {e}", path.display()));
                return;
            }
        }
        if let Err(e) = fs::remove_dir(path) {
            errors.push(format!("{}: {e}", path.display()));
        }
    } else if let Err(e) = fs::remove_file(path) {
        errors.push(format!("{}: {e}", path.display()));
    }
}

/// Remove now-empty date/time directories up to (not including) `root`
fn prune_empty_parents(dir: &Path, root: &Path) {
    let mut current = dir.parent();
    while let Some(parent) = current {
        if parent == root || !parent.starts_with(root) {
            break;
        }
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
}
