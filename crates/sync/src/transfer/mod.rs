//! Background transfer engine.
//!
//! Jobs accepted by [`TransferEngine::enqueue`] are persisted in the job
//! table and uploaded by worker tasks owned by the engine, independently of
//! the sync run that created them. Every accepted job produces exactly one
//! [`TransferEvent::Completed`].

mod engine;
mod transport;

pub use engine::TransferEngine;
pub use transport::{HttpTransport, Transport, TransportError};

use photosync_core::{ItemId, JobId, ObjectKey, TransferState};

/// Terminal result of a transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded { status: u16 },
    Failed { error: String },
    Cancelled,
}

impl TransferOutcome {
    pub fn state(&self) -> TransferState {
        match self {
            Self::Succeeded { .. } => TransferState::Succeeded,
            Self::Failed { .. } => TransferState::Failed,
            Self::Cancelled => TransferState::Cancelled,
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Completion of one job.
#[derive(Clone, Debug)]
pub struct Completion {
    pub job_id: JobId,
    pub item_id: ItemId,
    pub key: ObjectKey,
    pub outcome: TransferOutcome,
}

/// Event broadcast by the engine.
#[derive(Clone, Debug)]
pub enum TransferEvent {
    Completed(Completion),
    /// No accepted job is outstanding.
    Drained,
}
