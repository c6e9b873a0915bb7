use super::transport::Transport;
use super::{Completion, TransferEvent, TransferOutcome};
use crate::error::TransferError;
use crate::metrics;
use photosync_core::config::TransferConfig;
use photosync_core::{JobId, TransferState, UploadJob};
use photosync_storage::JobStore;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Uploads accepted jobs on its own tasks, outliving the sync run that
/// enqueued them.
///
/// Cloning is cheap; clones share the same workers and job table.
#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: Arc<dyn JobStore>,
    transport: Arc<dyn Transport>,
    config: TransferConfig,
    permits: Arc<Semaphore>,
    events: broadcast::Sender<TransferEvent>,
    in_flight: watch::Sender<usize>,
    expiry: Mutex<CancellationToken>,
}

impl TransferEngine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        config: TransferConfig,
    ) -> Self {
        metrics::register_metrics();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (in_flight, _) = watch::channel(0usize);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_transfers.max(1)));
        Self {
            inner: Arc::new(Inner {
                jobs,
                transport,
                config,
                permits,
                events,
                in_flight,
                expiry: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Subscribe to completion and drain events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.inner.events.subscribe()
    }

    /// Number of accepted jobs not yet completed.
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Resume every non-terminal job in the job table.
    ///
    /// Jobs interrupted mid-transfer go back to `Queued`. Jobs that reached a
    /// terminal state but were never pruned are dropped with their payload.
    /// Emits [`TransferEvent::Drained`] when there is nothing to resume.
    pub async fn start(&self) -> Result<usize, TransferError> {
        let mut pending = Vec::new();
        for job in self.inner.jobs.list().await? {
            if job.state.is_pending() {
                pending.push(job);
                continue;
            }
            debug!(job_id = %job.id, state = ?job.state, "pruning finished job");
            remove_payload(&job).await;
            self.inner.jobs.remove(&job.id).await?;
        }

        let mut resumed = 0;
        for job in pending {
            let job = if job.state == TransferState::Transferring {
                self.inner
                    .jobs
                    .transition(&job.id, TransferState::Queued, None)
                    .await?
            } else {
                job
            };
            debug!(job_id = %job.id, key = %job.key, "resuming transfer");
            self.spawn(job).await;
            resumed += 1;
        }

        if resumed == 0 {
            let _ = self.inner.events.send(TransferEvent::Drained);
        } else {
            info!(resumed, "resumed pending transfers");
        }
        Ok(resumed)
    }

    /// Accept a job. It is durable in the job table before this returns.
    ///
    /// Rejected only on malformed input; the caller keeps ownership of the
    /// payload in that case.
    pub async fn enqueue(&self, job: UploadJob) -> Result<JobId, TransferError> {
        if job.state != TransferState::Queued {
            return Err(TransferError::Rejected(format!(
                "job must be queued, found {:?}",
                job.state
            )));
        }
        if job.target.url.trim().is_empty() {
            return Err(TransferError::Rejected("empty target url".to_string()));
        }
        match tokio::fs::metadata(&job.payload_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(TransferError::Rejected(format!(
                    "payload is not a file: {}",
                    job.payload_path.display()
                )));
            }
            Err(e) => {
                return Err(TransferError::Rejected(format!(
                    "payload missing: {}: {e}",
                    job.payload_path.display()
                )));
            }
        }

        self.inner.jobs.insert(&job).await?;
        let id = job.id;
        info!(job_id = %id, key = %job.key, item_id = %job.item_id, "transfer queued");
        self.spawn(job).await;
        Ok(id)
    }

    /// Cancel every accepted job that has not completed.
    ///
    /// Cancelled jobs lose their payload and are not retried. Jobs accepted
    /// afterwards run normally.
    pub async fn expire(&self) {
        let mut token = self.inner.expiry.lock().await;
        info!(in_flight = self.in_flight(), "expiring transfers");
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Payload files still owned by a pending job.
    pub async fn pending_payloads(&self) -> Result<HashSet<PathBuf>, TransferError> {
        Ok(self
            .inner
            .jobs
            .list_pending()
            .await?
            .into_iter()
            .map(|job| job.payload_path)
            .collect())
    }

    /// Wait until no accepted job is outstanding.
    pub async fn wait_drained(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    async fn spawn(&self, job: UploadJob) {
        let token = self.inner.expiry.lock().await.clone();
        self.inner.in_flight.send_modify(|n| *n += 1);
        metrics::TRANSFERS_IN_FLIGHT.inc();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => TransferOutcome::Cancelled,
                outcome = inner.transfer(&job) => outcome,
            };
            inner.finish(&job, outcome).await;

            metrics::TRANSFERS_IN_FLIGHT.dec();
            let mut drained = false;
            inner.in_flight.send_modify(|n| {
                *n = n.saturating_sub(1);
                drained = *n == 0;
            });
            if drained {
                debug!("transfer engine drained");
                let _ = inner.events.send(TransferEvent::Drained);
            }
        });
    }
}

impl Inner {
    async fn transfer(&self, job: &UploadJob) -> TransferOutcome {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return TransferOutcome::Failed {
                error: "transfer engine shut down".to_string(),
            };
        };

        let mut retries = 0;
        loop {
            if let Err(e) = self
                .jobs
                .transition(&job.id, TransferState::Transferring, None)
                .await
            {
                return TransferOutcome::Failed {
                    error: e.to_string(),
                };
            }

            let started = Instant::now();
            let result = self.transport.put(job).await;
            metrics::TRANSFER_DURATION.observe(started.elapsed().as_secs_f64());

            match result {
                Ok(status) => return TransferOutcome::Succeeded { status },
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let delay = self.config.retry_delay(retries);
                    warn!(
                        job_id = %job.id,
                        error = %e,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "transfer attempt failed, retrying"
                    );
                    if let Err(e) = self
                        .jobs
                        .transition(&job.id, TransferState::Queued, Some(e.to_string()))
                        .await
                    {
                        return TransferOutcome::Failed {
                            error: e.to_string(),
                        };
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return TransferOutcome::Failed {
                        error: e.to_string(),
                    };
                }
            }
        }
    }

    /// Record the terminal state, reclaim the payload, emit the event and
    /// prune the job. The state transition guards against double completion.
    async fn finish(&self, job: &UploadJob, outcome: TransferOutcome) {
        let error = match &outcome {
            TransferOutcome::Succeeded { .. } => None,
            TransferOutcome::Failed { error } => Some(error.clone()),
            TransferOutcome::Cancelled => Some("cancelled".to_string()),
        };

        match self.jobs.transition(&job.id, outcome.state(), error).await {
            Ok(_) => {}
            Err(e) if e.is_invalid_transition() => {
                debug!(job_id = %job.id, "job already completed");
                return;
            }
            Err(e) => {
                // Left pending; the next start resumes it.
                error!(job_id = %job.id, error = %e, "failed to record transfer completion");
                return;
            }
        }

        remove_payload(job).await;

        match &outcome {
            TransferOutcome::Succeeded { status } => {
                info!(job_id = %job.id, key = %job.key, status, "transfer succeeded");
            }
            TransferOutcome::Failed { error } => {
                warn!(job_id = %job.id, key = %job.key, error = %error, "transfer failed");
            }
            TransferOutcome::Cancelled => {
                info!(job_id = %job.id, key = %job.key, "transfer cancelled");
            }
        }
        metrics::TRANSFERS
            .with_label_values(&[outcome.label()])
            .inc();

        let _ = self.events.send(TransferEvent::Completed(Completion {
            job_id: job.id,
            item_id: job.item_id.clone(),
            key: job.key.clone(),
            outcome,
        }));

        if let Err(e) = self.jobs.remove(&job.id).await {
            warn!(job_id = %job.id, error = %e, "failed to prune completed job");
        }
    }
}

async fn remove_payload(job: &UploadJob) {
    match tokio::fs::remove_file(&job.payload_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(job_id = %job.id, path = %job.payload_path.display(), error = %e, "failed to remove payload");
        }
    }
}
