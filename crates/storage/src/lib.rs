//! Durable local state for PhotoSync.
//!
//! This crate provides:
//! - The dedup index: the set of item identifiers already uploaded
//! - The transfer job table: upload jobs owned by the transfer engine
//! - File-backed implementations with atomic writes, plus in-memory ones

pub mod atomic;
pub mod error;
pub mod index;
pub mod jobs;

pub use error::{StorageError, StorageResult};
pub use index::{DedupIndex, FileDedupIndex, MemoryDedupIndex};
pub use jobs::{FileJobStore, JobStore, MemoryJobStore};

use photosync_core::config::StateConfig;
use std::sync::Arc;

/// Open the file-backed dedup index and job table under the state directory.
pub async fn from_config(
    config: &StateConfig,
) -> StorageResult<(Arc<dyn DedupIndex>, Arc<dyn JobStore>)> {
    let index = FileDedupIndex::open(config.index_path()).await?;
    let jobs = FileJobStore::open(config.jobs_path()).await?;
    Ok((Arc::new(index), Arc::new(jobs)))
}
