//! Error types for the raster service client.

use castor_core::BackendError;
use thiserror::Error;

/// Errors produced by the raster service client.
#[derive(Error, Debug)]
pub enum CloudError {
    /// The service refused the request as too large or too slow.
    #[error("service capacity exceeded (HTTP {status}): {message}")]
    Capacity { status: u16, message: String },

    /// Authentication or quota failure.
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Any other non-success status.
    #[error("service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid service response: {0}")]
    InvalidResponse(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("core error: {0}")]
    Core(#[from] castor_core::Error),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, CloudError>;

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CloudError::InvalidResponse(e.to_string())
        } else {
            CloudError::Network(e.to_string())
        }
    }
}

impl From<CloudError> for BackendError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Capacity { .. } => BackendError::Capacity(e.to_string()),
            CloudError::Rejected { .. } | CloudError::Auth(_) => BackendError::Fatal(e.to_string()),
            CloudError::Network(_) => BackendError::Transport(e.to_string()),
            CloudError::Status { status, .. } if status >= 500 => {
                BackendError::Transport(e.to_string())
            }
            CloudError::Status { .. } | CloudError::InvalidResponse(_) | CloudError::Core(_) => {
                BackendError::Protocol(e.to_string())
            }
        }
    }
}
