//! Execution windows: time-boxed slots in which sync runs may execute.
//!
//! A platform grants [`ExecutionWindow`]s; the [`ExecutionScheduler`] runs
//! the orchestrator inside each one, asks for the next window of the same
//! kind as soon as a periodic window begins, and cancels the run when the
//! window expires.

use crate::orchestrator::UploadOrchestrator;
use async_trait::async_trait;
use photosync_core::config::{SchedulerConfig, SyncConfig};
use photosync_core::session::STATUS_CANCELLED;
use photosync_core::{SyncSession, TriggerKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One granted execution slot.
///
/// The holder must call [`ExecutionWindow::complete`] once; dropping the
/// window reports failure.
pub struct ExecutionWindow {
    trigger: TriggerKind,
    deadline: Instant,
    expired: CancellationToken,
    done: Option<oneshot::Sender<bool>>,
}

impl ExecutionWindow {
    /// New window lasting `budget` from now, plus the receiver for its
    /// completion report.
    pub fn new(trigger: TriggerKind, budget: Duration) -> (Self, oneshot::Receiver<bool>) {
        let (done, report) = oneshot::channel();
        let window = Self {
            trigger,
            deadline: Instant::now() + budget,
            expired: CancellationToken::new(),
            done: Some(done),
        };
        (window, report)
    }

    pub fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Token the granting platform cancels when the window expires.
    pub fn expiry_handle(&self) -> CancellationToken {
        self.expired.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.expired.is_cancelled()
    }

    /// Resolves when the platform expires the window.
    pub async fn on_expire(&self) {
        self.expired.cancelled().await
    }

    /// Report the outcome to the platform.
    pub fn complete(mut self, success: bool) {
        if let Some(done) = self.done.take() {
            let _ = done.send(success);
        }
    }
}

/// Source of execution windows.
#[async_trait]
pub trait ExecutionPlatform: Send + Sync {
    /// Ask for a window of `trigger`'s kind. Replaces any pending request of
    /// the same kind.
    async fn request_window(&self, trigger: TriggerKind);

    /// Next granted window, or `None` once the platform has shut down.
    async fn next_window(&self) -> Option<ExecutionWindow>;
}

/// Platform backed by tokio timers.
///
/// Periodic kinds are granted after their configured interval; manual and
/// library-change windows are granted immediately. Each granted window
/// expires after the budget configured for its kind.
pub struct TimedPlatform {
    config: SchedulerConfig,
    granted_tx: mpsc::UnboundedSender<ExecutionWindow>,
    granted_rx: Mutex<mpsc::UnboundedReceiver<ExecutionWindow>>,
    pending: Mutex<HashMap<TriggerKind, JoinHandle<()>>>,
}

impl TimedPlatform {
    pub fn new(config: SchedulerConfig) -> Self {
        let (granted_tx, granted_rx) = mpsc::unbounded_channel();
        Self {
            config,
            granted_tx,
            granted_rx: Mutex::new(granted_rx),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The item source changed; request an immediate window.
    pub async fn notify_change(&self) {
        self.request_window(TriggerKind::LibraryChange).await;
    }

    fn grant(tx: &mpsc::UnboundedSender<ExecutionWindow>, trigger: TriggerKind, budget: Duration) {
        let (window, report) = ExecutionWindow::new(trigger, budget);
        let expiry = window.expiry_handle();
        let deadline = window.deadline();
        if tx.send(window).is_err() {
            debug!(%trigger, "platform shut down, window dropped");
            return;
        }
        info!(%trigger, budget_ms = budget.as_millis() as u64, "execution window granted");

        // Lives apart from the pending request so a re-request cannot stop
        // the expiry of a window already handed out.
        tokio::spawn(async move {
            let mut report = report;
            let early = tokio::select! {
                biased;
                result = &mut report => Some(result),
                () = tokio::time::sleep_until(deadline) => None,
            };
            let result = match early {
                Some(result) => result,
                None => {
                    info!(%trigger, "execution window expired");
                    expiry.cancel();
                    report.await
                }
            };
            match result {
                Ok(success) => info!(%trigger, success, "execution window completed"),
                Err(_) => warn!(%trigger, "execution window dropped without completion"),
            }
        });
    }
}

#[async_trait]
impl ExecutionPlatform for TimedPlatform {
    async fn request_window(&self, trigger: TriggerKind) {
        let delay = self.config.interval_for(trigger);
        let budget = self.config.budget_for(trigger);
        let tx = self.granted_tx.clone();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Self::grant(&tx, trigger, budget);
        });

        if let Some(previous) = self.pending.lock().await.insert(trigger, handle) {
            previous.abort();
        }
        debug!(%trigger, delay_ms = delay.as_millis() as u64, "window requested");
    }

    async fn next_window(&self) -> Option<ExecutionWindow> {
        self.granted_rx.lock().await.recv().await
    }
}

impl Drop for TimedPlatform {
    fn drop(&mut self) {
        for (_, handle) in self.pending.get_mut().drain() {
            handle.abort();
        }
    }
}

/// Runs the orchestrator inside platform windows.
pub struct ExecutionScheduler<P> {
    platform: Arc<P>,
    orchestrator: Arc<UploadOrchestrator>,
    sync: SyncConfig,
    grace: Duration,
}

impl<P: ExecutionPlatform + 'static> ExecutionScheduler<P> {
    pub fn new(
        platform: Arc<P>,
        orchestrator: Arc<UploadOrchestrator>,
        sync: SyncConfig,
        grace: Duration,
    ) -> Self {
        Self {
            platform,
            orchestrator,
            sync,
            grace,
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Request the periodic windows, then serve granted windows until
    /// `shutdown` fires or the platform stops granting.
    pub async fn run(&self, shutdown: CancellationToken) {
        for trigger in TriggerKind::ALL.into_iter().filter(TriggerKind::is_periodic) {
            self.platform.request_window(trigger).await;
        }

        loop {
            let window = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                window = self.platform.next_window() => window,
            };
            let Some(window) = window else {
                break;
            };
            self.handle_window(window).await;
        }
        info!("scheduler stopped");
    }

    /// Run one window to completion or expiry and report to the platform.
    ///
    /// Returns the success flag that was reported.
    #[instrument(skip_all, fields(trigger = %window.trigger()))]
    pub async fn handle_window(&self, window: ExecutionWindow) -> bool {
        let trigger = window.trigger();
        if trigger.is_periodic() {
            self.platform.request_window(trigger).await;
        }

        let limit = self.sync.limit_for(trigger);
        let cancel = CancellationToken::new();
        let mut task = {
            let orchestrator = self.orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.run(limit, trigger, &cancel).await })
        };

        let finished = tokio::select! {
            biased;
            joined = &mut task => Some(joined),
            () = window.on_expire() => None,
        };

        let success = match finished {
            Some(joined) => run_succeeded(joined),
            None => {
                warn!("execution window expired, cancelling run");
                cancel.cancel();
                match tokio::time::timeout(self.grace, &mut task).await {
                    Ok(joined) => {
                        let _ = run_succeeded(joined);
                    }
                    Err(_) => {
                        warn!(grace_ms = self.grace.as_millis() as u64, "run outlived grace period, aborting");
                        task.abort();
                    }
                }
                false
            }
        };

        window.complete(success);
        success
    }
}

fn run_succeeded(joined: Result<SyncSession, JoinError>) -> bool {
    match joined {
        Ok(session) => {
            debug!(status = %session.status, "run finished inside window");
            !session.aborted() && session.status != STATUS_CANCELLED
        }
        Err(e) => {
            warn!(error = %e, "sync run task failed");
            false
        }
    }
}
