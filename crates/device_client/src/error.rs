//! Device client error types

use contracts::ContractError;
use thiserror::Error;

/// Outbound call failure
#[derive(Debug, Error)]
pub enum DeviceClientError {
    /// No response within the client timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection refused, DNS failure, malformed response...
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Service URL the device advertised cannot be used
    #[error("invalid device url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// HTTP client could not be constructed
    #[error("failed to build http client: {message}")]
    Build { message: String },
}

impl DeviceClientError {
    /// Create transport error
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }
}

impl From<DeviceClientError> for ContractError {
    fn from(err: DeviceClientError) -> Self {
        match err {
            DeviceClientError::Timeout { url } => ContractError::transport(url, "timed out"),
            DeviceClientError::Transport { url, message } => {
                ContractError::transport(url, message)
            }
            DeviceClientError::InvalidUrl { url, message } => {
                ContractError::transport(url, message)
            }
            DeviceClientError::Build { message } => ContractError::Other(message),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, DeviceClientError>;
