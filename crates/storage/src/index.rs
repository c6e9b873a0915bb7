//! Dedup index: the durable set of item identifiers already uploaded.

use crate::atomic;
use crate::error::StorageResult;
use async_trait::async_trait;
use photosync_core::ItemId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Set of item identifiers whose content is known to be stored remotely.
///
/// Marks are append-only: once marked, an item stays marked.
#[async_trait]
pub trait DedupIndex: Send + Sync {
    /// Check whether an item was marked. Never touches the network or disk.
    async fn is_marked(&self, id: &ItemId) -> bool;

    /// Mark an item. Returns after the mark is durable. Idempotent.
    async fn mark(&self, id: &ItemId) -> StorageResult<()>;

    /// Number of marked items.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Dedup index persisted as a JSON array of identifiers.
///
/// The whole set is rewritten atomically on every new mark. The lock is
/// held across the write so concurrent marks serialize.
pub struct FileDedupIndex {
    path: PathBuf,
    marked: Mutex<HashSet<ItemId>>,
}

impl FileDedupIndex {
    /// Load the index from `path`. A missing file is an empty index.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let ids: Vec<ItemId> = atomic::read_json(&path).await?.unwrap_or_default();
        debug!(count = ids.len(), "loaded dedup index");
        Ok(Self {
            path,
            marked: Mutex::new(ids.into_iter().collect()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DedupIndex for FileDedupIndex {
    async fn is_marked(&self, id: &ItemId) -> bool {
        self.marked.lock().await.contains(id)
    }

    #[instrument(skip(self), fields(item_id = %id))]
    async fn mark(&self, id: &ItemId) -> StorageResult<()> {
        let mut marked = self.marked.lock().await;
        if !marked.insert(id.clone()) {
            return Ok(());
        }

        let mut ids: Vec<&ItemId> = marked.iter().collect();
        ids.sort();
        if let Err(e) = atomic::write_json(&self.path, &ids).await {
            // Memory must never claim a mark the disk lacks.
            marked.remove(id);
            return Err(e);
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        self.marked.lock().await.len()
    }
}

/// In-memory dedup index for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryDedupIndex {
    marked: Mutex<HashSet<ItemId>>,
}

impl MemoryDedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index with items already marked.
    pub fn with_marked<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = ItemId>,
    {
        Self {
            marked: Mutex::new(ids.into_iter().collect()),
        }
    }
}

#[async_trait]
impl DedupIndex for MemoryDedupIndex {
    async fn is_marked(&self, id: &ItemId) -> bool {
        self.marked.lock().await.contains(id)
    }

    async fn mark(&self, id: &ItemId) -> StorageResult<()> {
        self.marked.lock().await.insert(id.clone());
        Ok(())
    }

    async fn len(&self) -> usize {
        self.marked.lock().await.len()
    }
}
