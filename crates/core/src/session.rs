//! Sync session aggregate and trigger kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Status shown when no remote API base URL is configured.
pub const STATUS_NOT_CONFIGURED: &str = "Remote API not configured";
/// Status shown when the item source refuses access.
pub const STATUS_NO_ACCESS: &str = "No full access";
/// Status shown while a run enumerates the source.
pub const STATUS_SCANNING: &str = "Scanning library...";
/// Status shown when a run queued nothing and nothing failed.
pub const STATUS_NOTHING: &str = "Nothing to sync";
/// Status shown when the run was cancelled before it finished.
pub const STATUS_CANCELLED: &str = "Sync cancelled";
/// Prefix of the status of a run aborted by an unexpected error.
pub const STATUS_FAILED_PREFIX: &str = "Sync failed";

/// What started a sync run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Explicit user request.
    Manual,
    /// Short periodic window.
    BackgroundRefresh,
    /// Long periodic window.
    BackgroundProcessing,
    /// The item source reported new or changed items.
    LibraryChange,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        Self::Manual,
        Self::BackgroundRefresh,
        Self::BackgroundProcessing,
        Self::LibraryChange,
    ];

    /// Stable string form, used in logs, metrics labels and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::BackgroundRefresh => "background_refresh",
            Self::BackgroundProcessing => "background_processing",
            Self::LibraryChange => "library_change",
        }
    }

    /// Whether this trigger comes from a periodic platform window.
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::BackgroundRefresh | Self::BackgroundProcessing)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidTrigger(s.to_string()))
    }
}

/// Aggregate for one orchestrator run.
///
/// Counters reset at the start of every run. `uploaded` keeps moving after
/// the run returns, as transfer completions arrive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSession {
    pub trigger: TriggerKind,
    /// Jobs accepted by the transfer engine during this run.
    pub queued: u64,
    /// Transfers of this run's jobs that finished successfully.
    pub uploaded: u64,
    /// Items whose content was already present remotely.
    pub already_exists: u64,
    /// Items skipped because of a per-item failure.
    pub failed: u64,
    /// Whether the run is still scanning items.
    pub running: bool,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_run_at: Option<OffsetDateTime>,
}

impl SyncSession {
    /// Start a fresh session for a trigger.
    pub fn begin(trigger: TriggerKind) -> Self {
        Self {
            trigger,
            queued: 0,
            uploaded: 0,
            already_exists: 0,
            failed: 0,
            running: true,
            status: STATUS_SCANNING.to_string(),
            started_at: OffsetDateTime::now_utc(),
            last_run_at: None,
        }
    }

    /// Close the run with a fixed status string (early exits).
    pub fn finish_with(&mut self, status: impl Into<String>) {
        self.running = false;
        self.status = status.into();
        self.last_run_at = Some(OffsetDateTime::now_utc());
    }

    /// Whether the run stopped before processing items: missing
    /// configuration, refused access or a run-level error.
    pub fn aborted(&self) -> bool {
        !self.running
            && (self.status == STATUS_NOT_CONFIGURED
                || self.status == STATUS_NO_ACCESS
                || self.status.starts_with(STATUS_FAILED_PREFIX))
    }

    /// Close the run, deriving the status from the counters.
    pub fn finish(&mut self, cancelled: bool) {
        let status = if cancelled {
            STATUS_CANCELLED.to_string()
        } else {
            summary_status(self.queued, self.failed)
        };
        self.finish_with(status);
    }
}

impl Default for SyncSession {
    fn default() -> Self {
        let mut session = Self::begin(TriggerKind::Manual);
        session.running = false;
        session.status = String::new();
        session
    }
}

/// Status string for a run aborted by `error`.
pub fn failed_status(error: impl fmt::Display) -> String {
    format!("{STATUS_FAILED_PREFIX}: {error}")
}

/// Status string for a finished, uncancelled run.
pub fn summary_status(queued: u64, failed: u64) -> String {
    if queued > 0 {
        format!("Queued {queued} upload(s)")
    } else if failed > 0 {
        format!("Sync incomplete: {failed} item(s) failed")
    } else {
        STATUS_NOTHING.to_string()
    }
}
