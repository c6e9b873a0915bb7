//! Upload orchestrator: one sync run from enumeration to enqueue.

use crate::error::{ItemError, SyncError};
use crate::hasher;
use crate::metrics;
use crate::source::{ItemSource, SourceAccess};
use crate::state::SyncState;
use crate::transfer::{TransferEngine, TransferEvent};
use futures::StreamExt;
use futures::stream;
use photosync_client::{PresignRequest, RemoteObjectStore};
use photosync_core::config::SyncConfig;
use photosync_core::key::DEFAULT_EXTENSION;
use photosync_core::mime::content_type_for_extension;
use photosync_core::session::{STATUS_NO_ACCESS, STATUS_NOT_CONFIGURED, failed_status};
use photosync_core::{Item, ObjectKey, SyncSession, TriggerKind, UploadJob};
use photosync_storage::DedupIndex;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Result of one item's pipeline.
#[derive(Debug)]
enum ItemOutcome {
    Queued,
    AlreadyExists,
    Cancelled,
    Failed(ItemError),
}

/// Runs sync passes: enumerate, dedup, hash, check, presign, enqueue.
pub struct UploadOrchestrator {
    remote: Option<Arc<dyn RemoteObjectStore>>,
    source: Arc<dyn ItemSource>,
    index: Arc<dyn DedupIndex>,
    engine: TransferEngine,
    state: SyncState,
    payload_dir: PathBuf,
    config: SyncConfig,
    run_lock: Mutex<()>,
}

impl UploadOrchestrator {
    /// `remote` is `None` when no remote API is configured; runs then stop
    /// before any network call.
    pub fn new(
        remote: Option<Arc<dyn RemoteObjectStore>>,
        source: Arc<dyn ItemSource>,
        index: Arc<dyn DedupIndex>,
        engine: TransferEngine,
        payload_dir: impl Into<PathBuf>,
        config: SyncConfig,
    ) -> Self {
        metrics::register_metrics();
        Self {
            remote,
            source,
            index,
            engine,
            state: SyncState::new(),
            payload_dir: payload_dir.into(),
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Observable session state.
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    /// Listen for transfer completions: mark the index and count uploads.
    ///
    /// Subscribes before returning, so no completion of a job enqueued
    /// afterwards is missed.
    pub fn spawn_completion_listener(&self) -> JoinHandle<()> {
        let mut events = self.engine.subscribe();
        let index = self.index.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TransferEvent::Completed(completion)) => {
                        if !completion.outcome.is_success() {
                            debug!(
                                item_id = %completion.item_id,
                                outcome = completion.outcome.label(),
                                "transfer did not succeed, item stays unmarked"
                            );
                            continue;
                        }
                        if let Err(e) = index.mark(&completion.item_id).await {
                            // Unmarked items are re-checked remotely next run.
                            warn!(item_id = %completion.item_id, error = %e, "failed to mark uploaded item");
                        }
                        state.update(|session| session.uploaded += 1);
                    }
                    Ok(TransferEvent::Drained) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The skipped items stay unmarked; the next run's
                        // exists check marks them without re-uploading.
                        warn!(skipped, "completion listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Run one sync pass over at most `limit` of the newest items.
    ///
    /// Returns the session as of the end of the synchronous portion; the
    /// `uploaded` counter keeps moving in [`Self::state`] as transfers
    /// complete. Runs never overlap.
    #[instrument(skip(self, cancel))]
    pub async fn run(
        &self,
        limit: usize,
        trigger: TriggerKind,
        cancel: &CancellationToken,
    ) -> SyncSession {
        let _guard = self.run_lock.lock().await;
        self.state.begin(trigger);
        if let Err(e) = self.reclaim_orphaned_payloads().await {
            warn!(error = %e, "failed to reclaim orphaned payloads");
        }
        metrics::SYNC_RUNS
            .with_label_values(&[trigger.as_str()])
            .inc();

        match self.run_inner(limit, cancel).await {
            Ok(cancelled) => {
                self.state.update(|session| session.finish(cancelled));
                let session = self.state.snapshot();
                info!(
                    queued = session.queued,
                    already_exists = session.already_exists,
                    failed = session.failed,
                    status = %session.status,
                    "sync run finished"
                );
            }
            Err(e) => {
                let status = match &e {
                    SyncError::ConfigurationMissing => STATUS_NOT_CONFIGURED.to_string(),
                    SyncError::SourceAccessDenied => STATUS_NO_ACCESS.to_string(),
                    other => failed_status(other),
                };
                error!(error = %e, "sync run aborted");
                self.state.update(|session| session.finish_with(status));
            }
        }

        self.state.snapshot()
    }

    /// Delete payload files that no pending transfer owns.
    ///
    /// Exports left behind by an aborted run or a killed process are
    /// reclaimed here. Callers must hold the run lock so no export is in
    /// progress.
    async fn reclaim_orphaned_payloads(&self) -> Result<usize, SyncError> {
        let mut entries = match tokio::fs::read_dir(&self.payload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SyncError::Scan(e)),
        };
        let owned = self.engine.pending_payloads().await?;

        let mut reclaimed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(SyncError::Scan)? {
            let path = entry.path();
            if owned.contains(&path) || !entry.file_type().await.is_ok_and(|t| t.is_file()) {
                continue;
            }
            remove_payload(&path).await;
            reclaimed += 1;
        }
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed orphaned payloads");
        }
        Ok(reclaimed)
    }

    /// Returns whether the run was cancelled.
    async fn run_inner(&self, limit: usize, cancel: &CancellationToken) -> Result<bool, SyncError> {
        let Some(remote) = self.remote.clone() else {
            return Err(SyncError::ConfigurationMissing);
        };

        match self.source.access().await {
            SourceAccess::Full => {}
            SourceAccess::Limited | SourceAccess::Denied => {
                return Err(SyncError::SourceAccessDenied);
            }
        }
        if cancel.is_cancelled() {
            return Ok(true);
        }

        let items = self.source.newest(limit).await.map_err(SyncError::Scan)?;
        let mut candidates = Vec::with_capacity(items.len());
        for item in items.into_iter().take(limit) {
            if self.index.is_marked(&item.id).await {
                debug!(item_id = %item.id, "already uploaded, skipping");
                continue;
            }
            candidates.push(item);
        }
        info!(candidates = candidates.len(), "scanned source");
        if candidates.is_empty() {
            return Ok(cancel.is_cancelled());
        }

        tokio::fs::create_dir_all(&self.payload_dir)
            .await
            .map_err(SyncError::Scan)?;

        let remote = &remote;
        let mut outcomes = stream::iter(candidates)
            .map(|item| self.process_item(remote, item, cancel))
            .buffer_unordered(self.config.max_concurrent_items.max(1));

        while let Some(outcome) = outcomes.next().await {
            self.state.update(|session| match outcome {
                ItemOutcome::Queued => session.queued += 1,
                ItemOutcome::AlreadyExists => session.already_exists += 1,
                ItemOutcome::Failed(_) => session.failed += 1,
                ItemOutcome::Cancelled => {}
            });
        }

        Ok(cancel.is_cancelled())
    }

    #[instrument(skip(self, remote, item, cancel), fields(item_id = %item.id))]
    async fn process_item(
        &self,
        remote: &Arc<dyn RemoteObjectStore>,
        item: Item,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::Cancelled;
        }

        let payload = self.payload_path(&item);
        let outcome = match self.pipeline(remote.as_ref(), &item, &payload, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(stage = e.stage(), error = %e, "item skipped");
                metrics::ITEM_FAILURES
                    .with_label_values(&[e.stage()])
                    .inc();
                ItemOutcome::Failed(e)
            }
        };

        // Once queued, the payload belongs to the transfer engine.
        if !matches!(outcome, ItemOutcome::Queued) {
            remove_payload(&payload).await;
        }
        outcome
    }

    async fn pipeline(
        &self,
        remote: &dyn RemoteObjectStore,
        item: &Item,
        payload: &Path,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, ItemError> {
        let Some(exported) = cancellable(cancel, self.source.export(item, payload)).await else {
            return Ok(ItemOutcome::Cancelled);
        };
        exported.map_err(ItemError::ExportFailed)?;

        let Some(digest) = cancellable(cancel, hasher::digest_file(payload)).await else {
            return Ok(ItemOutcome::Cancelled);
        };
        let digest = digest.map_err(ItemError::HashFailed)?;
        let key = ObjectKey::for_digest(&digest, item.extension());

        let Some(exists) = cancellable(cancel, remote.exists(&key)).await else {
            return Ok(ItemOutcome::Cancelled);
        };
        if exists.map_err(ItemError::ExistsCheckFailed)? {
            debug!(key = %key, "content already stored remotely");
            self.index
                .mark(&item.id)
                .await
                .map_err(ItemError::IndexUpdateFailed)?;
            metrics::ITEMS_ALREADY_PRESENT.inc();
            return Ok(ItemOutcome::AlreadyExists);
        }

        let content_type = content_type_for_extension(key.extension());
        let request = PresignRequest {
            key: key.clone(),
            content_type: content_type.clone(),
            created_ms: Some(item.created_epoch_ms()),
            filename: Some(item.filename.clone()),
        };
        let Some(target) = cancellable(cancel, remote.presign(&request)).await else {
            return Ok(ItemOutcome::Cancelled);
        };
        let target = target.map_err(ItemError::PresignFailed)?;

        let job = UploadJob::new(
            item.id.clone(),
            key,
            payload.to_path_buf(),
            target,
            content_type,
        );
        self.engine
            .enqueue(job)
            .await
            .map_err(ItemError::EnqueueRejected)?;
        metrics::ITEMS_QUEUED.inc();
        Ok(ItemOutcome::Queued)
    }

    fn payload_path(&self, item: &Item) -> PathBuf {
        let ext = match item.extension() {
            "" => DEFAULT_EXTENSION.to_string(),
            ext => ext.to_ascii_lowercase(),
        };
        self.payload_dir.join(format!("{}.{ext}", Uuid::new_v4()))
    }
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn remove_payload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove payload"),
    }
}
