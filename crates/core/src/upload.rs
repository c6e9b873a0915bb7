//! Upload job types and transfer lifecycle.

use crate::item::ItemId;
use crate::key::ObjectKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload job.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidJobId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer state of an upload job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Accepted and waiting for a transfer slot.
    Queued,
    /// Bytes are on the wire.
    Transferring,
    /// The remote store accepted the PUT.
    Succeeded,
    /// The PUT failed for good.
    Failed,
    /// The transfer engine's window expired before completion.
    Cancelled,
}

impl TransferState {
    /// Check if the job still needs work.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Transferring)
    }

    /// Check if the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `to` is allowed.
    ///
    /// `Transferring -> Queued` is the restart and retry path.
    pub fn can_transition_to(&self, to: TransferState) -> bool {
        match (self, to) {
            (Self::Queued, Self::Transferring) => true,
            (Self::Transferring, Self::Queued) => true,
            (from, to) if from.is_pending() && to.is_terminal() => true,
            _ => false,
        }
    }
}

/// A write capability issued by the remote API.
///
/// Used for exactly one PUT; every header must be attached verbatim or the
/// remote signature check fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedTarget {
    /// Destination URL, including the signature query.
    pub url: String,
    /// Headers that were part of the signature.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// An upload handed to the transfer engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Item the payload was exported from.
    pub item_id: ItemId,
    /// Destination key.
    pub key: ObjectKey,
    /// Local temporary copy of the item bytes. Owned by the job.
    pub payload_path: PathBuf,
    /// Where and how to PUT.
    pub target: PresignedTarget,
    /// Content type sent with the PUT.
    pub content_type: String,
    /// Current transfer state.
    pub state: TransferState,
    /// Number of PUT attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    /// Last failure message, if any.
    #[serde(default)]
    pub last_error: Option<String>,
    /// When the job was accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the job last changed state.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadJob {
    /// Create a new queued job.
    pub fn new(
        item_id: ItemId,
        key: ObjectKey,
        payload_path: PathBuf,
        target: PresignedTarget,
        content_type: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: JobId::new(),
            item_id,
            key,
            payload_path,
            target,
            content_type: content_type.into(),
            state: TransferState::Queued,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the job to a new state, rejecting illegal transitions.
    pub fn transition(&mut self, to: TransferState) -> crate::Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(crate::Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}
