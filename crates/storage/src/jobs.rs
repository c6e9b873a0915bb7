//! Transfer job table: upload jobs owned by the transfer engine.

use crate::atomic;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use photosync_core::{JobId, TransferState, UploadJob};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

type JobTable = BTreeMap<JobId, UploadJob>;

/// Persistent table of upload jobs.
///
/// State changes go through [`JobStore::transition`], which rejects moves
/// out of a terminal state. That check is what makes completion happen at
/// most once per job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a new job. Durable before returning.
    async fn insert(&self, job: &UploadJob) -> StorageResult<()>;

    /// Get a job by ID.
    async fn get(&self, id: &JobId) -> StorageResult<Option<UploadJob>>;

    /// Move a job to `to`, recording `error` as its last error.
    ///
    /// Entering `Transferring` counts as a new attempt.
    async fn transition(
        &self,
        id: &JobId,
        to: TransferState,
        error: Option<String>,
    ) -> StorageResult<UploadJob>;

    /// Drop a job from the table.
    async fn remove(&self, id: &JobId) -> StorageResult<()>;

    /// All jobs, oldest first.
    async fn list(&self) -> StorageResult<Vec<UploadJob>>;

    /// Jobs that still need work, oldest first.
    async fn list_pending(&self) -> StorageResult<Vec<UploadJob>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|job| job.state.is_pending())
            .collect())
    }
}

fn apply_transition(
    table: &mut JobTable,
    id: &JobId,
    to: TransferState,
    error: Option<String>,
) -> StorageResult<UploadJob> {
    let job = table
        .get_mut(id)
        .ok_or_else(|| StorageError::JobNotFound(id.to_string()))?;
    job.transition(to)?;
    if to == TransferState::Transferring {
        job.attempts += 1;
    }
    if error.is_some() {
        job.last_error = error;
    }
    Ok(job.clone())
}

fn apply_insert(table: &mut JobTable, job: &UploadJob) -> StorageResult<()> {
    if table.contains_key(&job.id) {
        return Err(StorageError::JobExists(job.id.to_string()));
    }
    table.insert(job.id, job.clone());
    Ok(())
}

fn sorted(table: &JobTable) -> Vec<UploadJob> {
    let mut jobs: Vec<UploadJob> = table.values().cloned().collect();
    jobs.sort_by_key(|job| job.created_at);
    jobs
}

/// Job table persisted as a JSON object keyed by job ID.
pub struct FileJobStore {
    path: PathBuf,
    jobs: Mutex<JobTable>,
}

impl FileJobStore {
    /// Load the table from `path`. A missing file is an empty table.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let jobs: JobTable = atomic::read_json(&path).await?.unwrap_or_default();
        debug!(count = jobs.len(), "loaded job table");
        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mutate the table and persist it; on a failed write the table is
    /// restored to its previous contents.
    async fn update<T>(
        &self,
        f: impl FnOnce(&mut JobTable) -> StorageResult<T> + Send,
    ) -> StorageResult<T> {
        let mut jobs = self.jobs.lock().await;
        let previous = jobs.clone();
        let out = f(&mut *jobs)?;
        if let Err(e) = atomic::write_json(&self.path, &*jobs).await {
            *jobs = previous;
            return Err(e);
        }
        Ok(out)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, key = %job.key))]
    async fn insert(&self, job: &UploadJob) -> StorageResult<()> {
        self.update(|jobs| apply_insert(jobs, job)).await
    }

    async fn get(&self, id: &JobId) -> StorageResult<Option<UploadJob>> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    #[instrument(skip(self, error), fields(job_id = %id))]
    async fn transition(
        &self,
        id: &JobId,
        to: TransferState,
        error: Option<String>,
    ) -> StorageResult<UploadJob> {
        self.update(|jobs| apply_transition(jobs, id, to, error))
            .await
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn remove(&self, id: &JobId) -> StorageResult<()> {
        self.update(|jobs| {
            jobs.remove(id);
            Ok(())
        })
        .await
    }

    async fn list(&self) -> StorageResult<Vec<UploadJob>> {
        Ok(sorted(&*self.jobs.lock().await))
    }
}

/// In-memory job table for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<JobTable>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &UploadJob) -> StorageResult<()> {
        apply_insert(&mut *self.jobs.lock().await, job)
    }

    async fn get(&self, id: &JobId) -> StorageResult<Option<UploadJob>> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn transition(
        &self,
        id: &JobId,
        to: TransferState,
        error: Option<String>,
    ) -> StorageResult<UploadJob> {
        apply_transition(&mut *self.jobs.lock().await, id, to, error)
    }

    async fn remove(&self, id: &JobId) -> StorageResult<()> {
        self.jobs.lock().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<UploadJob>> {
        Ok(sorted(&*self.jobs.lock().await))
    }
}
