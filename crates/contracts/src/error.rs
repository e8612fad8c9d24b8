//! Layered error definitions
//!
//! Categorized by source: config / transport / persistence / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Transport Errors =====
    /// Outbound call to a device failed or timed out
    #[error("transport error talking to '{url}': {message}")]
    Transport { url: String, message: String },

    // ===== Persistence Errors =====
    /// Measurement metadata could not be written or read
    #[error("persistence error for '{measurement_id}': {message}")]
    Persistence {
        measurement_id: String,
        message: String,
    },

    /// Invalid measurement time or id encoding
    #[error("invalid measurement time '{value}': {message}")]
    InvalidTime { value: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink used outside of an open session
    #[error("sink '{sink_name}' is not open")]
    SinkNotOpen { sink_name: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create persistence error
    pub fn persistence(measurement_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            measurement_id: measurement_id.into(),
            message: message.into(),
        }
    }

    /// Create invalid time error
    pub fn invalid_time(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTime {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
