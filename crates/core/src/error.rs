//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::upload::TransferState,
        to: crate::upload::TransferState,
    },

    #[error("invalid trigger kind: {0}")]
    InvalidTrigger(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
