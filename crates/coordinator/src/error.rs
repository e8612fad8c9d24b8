//! Scheduler / coordinator error types

use contracts::{ContractError, MeasurementId};
use thiserror::Error;

/// Errors returned by scheduling and measurement management
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Requested window overlaps an active measurement
    #[error("measurement times clash with '{existing}'")]
    Clash { existing: MeasurementId },

    /// Unknown measurement (or not in the state the operation needs)
    #[error("measurement '{id}' not found")]
    NotFound { id: String },

    /// Request rejected before anything was mutated
    #[error("invalid request: {message}")]
    Invalid { message: String },

    /// Disk write/delete failed; every failing path is listed
    #[error("persistence failed for '{id}': {}", errors.join("; "))]
    Persistence { id: String, errors: Vec<String> },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl SchedulerError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn persistence(id: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Persistence {
            id: id.into(),
            errors,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SchedulerError>;
