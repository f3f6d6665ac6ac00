//! Error types for the castor pipeline

use chrono::NaiveDate;
use thiserror::Error;

/// Failure reported by a remote backend call.
///
/// The variant decides what the batch orchestrator does with the chunk that
/// produced it: capacity and transport failures are retried on a smaller
/// chunk, fatal failures abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request exceeded an (undocumented) computation or memory ceiling.
    #[error("backend capacity exceeded: {0}")]
    Capacity(String),

    /// Authentication or quota failure; retrying cannot help.
    #[error("fatal backend error: {0}")]
    Fatal(String),

    /// Connection reset, timeout or other network-level failure.
    #[error("backend transport error: {0}")]
    Transport(String),

    /// The backend answered with something we could not interpret.
    #[error("malformed backend response: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Whether the orchestrator should retry this failure on a smaller chunk.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Capacity(_) | Self::Transport(_))
    }

    /// Whether this failure must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Main error type for castor operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid {field} in record {index}: {value} ({reason})")]
    Validation {
        index: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("no elevation coverage at point {point_id}")]
    ElevationUnavailable { point_id: String },

    #[error("zone around point {point_id} has no pixels inside the elevation band")]
    EmptyZone { point_id: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("sampling shortfall: {missing} of {requested} negatives could not be drawn")]
    SamplingShortfall { requested: usize, missing: usize },

    #[error("duplicate metric record for zone {zone_id} on {date}")]
    DuplicateRecord { zone_id: String, date: NaiveDate },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Coverage errors exclude a single point and never stop the run.
    pub fn is_coverage(&self) -> bool {
        matches!(self, Self::ElevationUnavailable { .. } | Self::EmptyZone { .. })
    }
}

/// Result type alias for castor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for backend calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(BackendError::Capacity("memory limit".into()).is_retryable());
        assert!(BackendError::Transport("reset".into()).is_retryable());
        assert!(!BackendError::Fatal("expired token".into()).is_retryable());
        assert!(BackendError::Fatal("expired token".into()).is_fatal());
        assert!(!BackendError::Protocol("bad json".into()).is_retryable());
    }

    #[test]
    fn coverage_errors_are_flagged() {
        let e = Error::ElevationUnavailable {
            point_id: "P4".into(),
        };
        assert!(e.is_coverage());
        assert_eq!(e.to_string(), "no elevation coverage at point P4");

        let e: Error = BackendError::Capacity("too many pixels".into()).into();
        assert!(!e.is_coverage());
        assert_eq!(e.to_string(), "backend capacity exceeded: too many pixels");
    }
}
