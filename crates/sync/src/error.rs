//! Error types for sync runs, per-item pipelines and transfers.

use photosync_client::ClientError;
use photosync_storage::StorageError;
use thiserror::Error;

/// Run-level failures. Each one ends the run with a status string.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote API not configured")]
    ConfigurationMissing,

    #[error("source access denied")]
    SourceAccessDenied,

    #[error("failed to scan source: {0}")]
    Scan(#[source] std::io::Error),

    #[error("failed to read transfer jobs: {0}")]
    Jobs(#[from] TransferError),
}

/// Failures scoped to a single item. The run continues with the next item.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("export failed: {0}")]
    ExportFailed(#[source] std::io::Error),

    #[error("hashing failed: {0}")]
    HashFailed(#[source] std::io::Error),

    #[error("exists check failed: {0}")]
    ExistsCheckFailed(#[source] ClientError),

    #[error("presign failed: {0}")]
    PresignFailed(#[source] ClientError),

    #[error("enqueue rejected: {0}")]
    EnqueueRejected(#[source] TransferError),

    #[error("index update failed: {0}")]
    IndexUpdateFailed(#[source] StorageError),
}

impl ItemError {
    /// Pipeline stage label, used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ExportFailed(_) => "export",
            Self::HashFailed(_) => "hash",
            Self::ExistsCheckFailed(_) => "exists",
            Self::PresignFailed(_) => "presign",
            Self::EnqueueRejected(_) => "enqueue",
            Self::IndexUpdateFailed(_) => "index",
        }
    }
}

/// Transfer engine errors.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("job rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
