//! Common error types for the cine engine

use std::time::Duration;
use thiserror::Error;

/// Common result type for cine engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Opaque error surfaced by a host-provided slice loader
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error taxonomy shared by the engine and host crates
#[derive(Error, Debug)]
pub enum Error {
    /// The injected loader rejected a slice load
    #[error("slice {index} load failed: {source}")]
    SliceLoad {
        index: usize,
        #[source]
        source: BoxError,
    },

    /// The load gate deadline elapsed before the loader resolved
    #[error("slice {index} load timed out after {timeout:?}")]
    LoadTimeout { index: usize, timeout: Duration },

    /// Navigation target outside the study range
    #[error("slice index {index} out of range (total {total})")]
    OutOfRange { index: usize, total: usize },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that degrade to a buffer miss rather than
    /// aborting the operation that observed them.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Error::SliceLoad { .. } | Error::LoadTimeout { .. })
    }
}
