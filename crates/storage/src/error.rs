//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt state file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job already exists: {0}")]
    JobExists(String),

    #[error(transparent)]
    Core(#[from] photosync_core::Error),
}

impl StorageError {
    /// Whether this error is a rejected state transition, i.e. the job
    /// already reached a terminal state.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::Core(photosync_core::Error::InvalidTransition { .. })
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
