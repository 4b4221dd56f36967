//! Errors surfaced by the session cache.

use tether_abstraction::BackendError;
use thiserror::Error;

/// Errors returned by [`crate::cache::SessionCache`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The requested backend does not exist.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// The requested backend exists but could not be built.
    #[error("Invalid backend '{name}': {reason}")]
    BackendInvalid {
        /// Requested backend name.
        name: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The backend failed while answering.
    #[error("Backend execution failed for session '{process_id}': {message}")]
    BackendExecution {
        /// Session whose backend failed.
        process_id: String,
        /// The underlying failure message.
        message: String,
    },
}

impl CacheError {
    /// Maps a failed resolution of `name`.
    #[must_use]
    pub fn resolution(name: &str, err: BackendError) -> Self {
        match err {
            BackendError::NotFound(_) => Self::BackendNotFound(name.to_string()),
            BackendError::Invalid { reason, .. } => Self::BackendInvalid { name: name.to_string(), reason },
            other => Self::BackendInvalid { name: name.to_string(), reason: other.to_string() },
        }
    }

    /// Maps a failed backend call for `process_id`.
    #[must_use]
    pub fn execution(process_id: &str, err: &BackendError) -> Self {
        Self::BackendExecution { process_id: process_id.to_string(), message: err.to_string() }
    }

    /// The message shown to callers: the underlying failure for execution
    /// errors, the full description otherwise.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::BackendExecution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
