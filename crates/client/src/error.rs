//! Client error types.

use thiserror::Error;

/// Errors talking to the remote API.
///
/// Every variant means "cannot determine". Callers must never read an
/// error from `exists` as "does not exist".
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    Decode(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// HTTP status code, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
