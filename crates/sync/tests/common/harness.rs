use photosync_client::RemoteObjectStore;
use photosync_core::config::{SyncConfig, TransferConfig};
use photosync_storage::{DedupIndex, JobStore, MemoryDedupIndex, MemoryJobStore};
use photosync_sync::{ItemSource, TransferEngine, Transport, UploadOrchestrator};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Orchestrator wired to in-memory stores and a temp payload directory.
pub struct Harness {
    pub temp: TempDir,
    pub index: Arc<dyn DedupIndex>,
    pub jobs: Arc<dyn JobStore>,
    pub engine: TransferEngine,
    pub orchestrator: Arc<UploadOrchestrator>,
    _listener: JoinHandle<()>,
}

impl Harness {
    pub fn new(
        remote: Option<Arc<dyn RemoteObjectStore>>,
        source: Arc<dyn ItemSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_index(remote, source, transport, Arc::new(MemoryDedupIndex::new()))
    }

    pub fn with_index(
        remote: Option<Arc<dyn RemoteObjectStore>>,
        source: Arc<dyn ItemSource>,
        transport: Arc<dyn Transport>,
        index: Arc<dyn DedupIndex>,
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let engine = TransferEngine::new(
            jobs.clone(),
            transport,
            TransferConfig {
                max_concurrent_transfers: 2,
                max_retries: 0,
                retry_base_delay_ms: 1,
            },
        );
        let orchestrator = Arc::new(UploadOrchestrator::new(
            remote,
            source,
            index.clone(),
            engine.clone(),
            temp.path().join("payloads"),
            SyncConfig::default(),
        ));
        let listener = orchestrator.spawn_completion_listener();
        Self {
            temp,
            index,
            jobs,
            engine,
            orchestrator,
            _listener: listener,
        }
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.temp.path().join("payloads")
    }

    /// Files left in the payload directory.
    pub fn payload_count(&self) -> usize {
        std::fs::read_dir(self.payload_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Wait for the engine to drain and the completion listener to catch up.
pub async fn drain(harness: &Harness) {
    tokio::time::timeout(Duration::from_secs(10), harness.engine.wait_drained())
        .await
        .expect("transfers did not drain");
    // Completion events are handled on the listener task.
    tokio::time::sleep(Duration::from_millis(50)).await;
}
