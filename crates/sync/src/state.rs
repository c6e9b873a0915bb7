//! Shared, observable sync session state.

use photosync_core::{SyncSession, TriggerKind};
use std::sync::Arc;
use tokio::sync::watch;

/// Latest sync session, observable through snapshots or a `watch` receiver.
///
/// Only the orchestrator and its completion listener mutate it; everyone
/// else reads.
#[derive(Clone)]
pub struct SyncState {
    tx: Arc<watch::Sender<SyncSession>>,
}

impl SyncState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncSession::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> SyncSession {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSession> {
        self.tx.subscribe()
    }

    /// Reset counters for a new run.
    pub(crate) fn begin(&self, trigger: TriggerKind) {
        let previous_run = self.tx.borrow().last_run_at;
        self.tx.send_modify(|session| {
            *session = SyncSession::begin(trigger);
            session.last_run_at = previous_run;
        });
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SyncSession)) {
        self.tx.send_modify(f);
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}
