use async_trait::async_trait;
use photosync_client::{ClientError, ClientResult, LatestItem, PresignRequest, RemoteObjectStore};
use photosync_core::{
    ContentDigest, Item, ItemId, MediaKind, ObjectKey, PresignedTarget, UploadJob,
};
use photosync_storage::{DedupIndex, MemoryDedupIndex, StorageResult};
use photosync_sync::{ItemSource, SourceAccess, Transport, TransportError};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::{Duration as TimeDuration, OffsetDateTime};

/// In-memory item source. Items are listed in insertion order, which the
/// constructors keep newest first.
pub struct MemorySource {
    items: Vec<(Item, Vec<u8>)>,
    access: SourceAccess,
    hang_scan: bool,
    hang_export: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            access: SourceAccess::Full,
            hang_scan: false,
            hang_export: false,
        }
    }

    /// Add a JPEG named `<name>.JPG` whose bytes are `name` itself.
    pub fn with_photo(mut self, name: &str) -> Self {
        let age = TimeDuration::minutes(self.items.len() as i64);
        let item = Item {
            id: ItemId::new(name),
            created_at: OffsetDateTime::now_utc() - age,
            filename: format!("{name}.JPG"),
            kind: MediaKind::Image,
        };
        self.items.push((item, name.as_bytes().to_vec()));
        self
    }

    pub fn with_access(mut self, access: SourceAccess) -> Self {
        self.access = access;
        self
    }

    /// `newest` never returns.
    pub fn hanging_scan(mut self) -> Self {
        self.hang_scan = true;
        self
    }

    /// `export` never returns.
    pub fn hanging_export(mut self) -> Self {
        self.hang_export = true;
        self
    }

    pub fn item(&self, name: &str) -> Item {
        self.items
            .iter()
            .find(|(item, _)| item.id.as_str() == name)
            .map(|(item, _)| item.clone())
            .unwrap()
    }
}

#[async_trait]
impl ItemSource for MemorySource {
    async fn access(&self) -> SourceAccess {
        self.access
    }

    async fn newest(&self, limit: usize) -> io::Result<Vec<Item>> {
        if self.hang_scan {
            std::future::pending::<()>().await;
        }
        Ok(self
            .items
            .iter()
            .take(limit)
            .map(|(item, _)| item.clone())
            .collect())
    }

    async fn export(&self, item: &Item, dest: &Path) -> io::Result<u64> {
        if self.hang_export {
            std::future::pending::<()>().await;
        }
        let (_, bytes) = self
            .items
            .iter()
            .find(|(candidate, _)| candidate.id == item.id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, item.id.to_string()))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// Remote API double recording every call.
pub struct FakeRemote {
    upload_base: String,
    stored: Mutex<HashSet<ObjectKey>>,
    presign_failures: HashSet<String>,
    exists_failures: HashSet<ObjectKey>,
    exists_calls: AtomicUsize,
    presign_calls: AtomicUsize,
    presigned: Mutex<Vec<PresignRequest>>,
}

impl FakeRemote {
    /// Presigned URLs point below `upload_base`.
    pub fn new(upload_base: &str) -> Self {
        Self {
            upload_base: upload_base.trim_end_matches('/').to_string(),
            stored: Mutex::new(HashSet::new()),
            presign_failures: HashSet::new(),
            exists_failures: HashSet::new(),
            exists_calls: AtomicUsize::new(0),
            presign_calls: AtomicUsize::new(0),
            presigned: Mutex::new(Vec::new()),
        }
    }

    /// Treat the content `bytes` (as a JPEG) as already stored.
    pub fn with_stored(self, bytes: &[u8]) -> Self {
        self.stored.lock().unwrap().insert(key_for(bytes));
        self
    }

    /// Fail presign for items with this filename.
    pub fn failing_presign_for(mut self, filename: &str) -> Self {
        self.presign_failures.insert(filename.to_string());
        self
    }

    /// Fail the exists check for the content `bytes`.
    pub fn failing_exists_for(mut self, bytes: &[u8]) -> Self {
        self.exists_failures.insert(key_for(bytes));
        self
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn presign_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.exists_calls() + self.presign_calls()
    }

    pub fn presigned(&self) -> Vec<PresignRequest> {
        self.presigned.lock().unwrap().clone()
    }
}

pub fn key_for(bytes: &[u8]) -> ObjectKey {
    ObjectKey::for_digest(&ContentDigest::compute(bytes), "jpg")
}

#[async_trait]
impl RemoteObjectStore for FakeRemote {
    async fn exists(&self, key: &ObjectKey) -> ClientResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.exists_failures.contains(key) {
            return Err(ClientError::Status {
                status: 503,
                body: "exists unavailable".to_string(),
            });
        }
        Ok(self.stored.lock().unwrap().contains(key))
    }

    async fn presign(&self, request: &PresignRequest) -> ClientResult<PresignedTarget> {
        self.presign_calls.fetch_add(1, Ordering::SeqCst);
        self.presigned.lock().unwrap().push(request.clone());
        if let Some(filename) = &request.filename
            && self.presign_failures.contains(filename)
        {
            return Err(ClientError::Status {
                status: 500,
                body: "presign exploded".to_string(),
            });
        }

        let mut headers = BTreeMap::new();
        if let Some(created) = request.created_ms {
            headers.insert("x-amz-meta-created".to_string(), created.to_string());
        }
        if let Some(filename) = &request.filename {
            headers.insert("x-amz-meta-filename".to_string(), filename.clone());
        }
        Ok(PresignedTarget {
            url: format!("{}/{}", self.upload_base, request.key.as_str()),
            headers,
        })
    }

    async fn list_latest(&self, _limit: u32) -> ClientResult<Vec<LatestItem>> {
        Ok(Vec::new())
    }

    async fn health(&self) -> ClientResult<bool> {
        Ok(true)
    }
}

/// Transport answering every PUT with the same status.
pub struct FixedTransport {
    status: u16,
    calls: AtomicUsize,
}

impl FixedTransport {
    pub fn ok() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FixedTransport {
    async fn put(&self, _job: &UploadJob) -> Result<u16, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.status < 300 {
            Ok(self.status)
        } else {
            Err(TransportError::Status {
                status: self.status,
                body: "rejected".to_string(),
            })
        }
    }
}

/// Transport whose PUTs never finish.
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn put(&self, _job: &UploadJob) -> Result<u16, TransportError> {
        std::future::pending().await
    }
}

/// In-memory index whose first `mark` never returns.
pub struct StallingIndex {
    inner: MemoryDedupIndex,
    stalled: AtomicBool,
}

impl StallingIndex {
    pub fn new() -> Self {
        Self {
            inner: MemoryDedupIndex::new(),
            stalled: AtomicBool::new(false),
        }
    }

    /// Whether the stalling `mark` has been entered.
    pub fn has_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DedupIndex for StallingIndex {
    async fn is_marked(&self, id: &ItemId) -> bool {
        self.inner.is_marked(id).await
    }

    async fn mark(&self, id: &ItemId) -> StorageResult<()> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.mark(id).await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}
