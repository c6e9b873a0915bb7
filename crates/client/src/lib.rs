//! Client for the remote object store API.
//!
//! The API never sees item bytes: it answers existence checks, issues
//! presigned PUT targets, and lists recent uploads. The PUT itself is done
//! by the transfer engine.

pub mod error;
pub mod http;
pub mod types;

pub use error::{ClientError, ClientResult};
pub use http::HttpRemoteStore;
pub use types::{LatestItem, PresignRequest};

use async_trait::async_trait;
use photosync_core::{ObjectKey, PresignedTarget};

/// Operations offered by the remote object store API.
#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Whether an object is already stored under `key`.
    async fn exists(&self, key: &ObjectKey) -> ClientResult<bool>;

    /// Obtain a one-shot write capability for `request.key`.
    ///
    /// Metadata supplied in the request is echoed back among the headers
    /// the PUT must carry.
    async fn presign(&self, request: &PresignRequest) -> ClientResult<PresignedTarget>;

    /// Most recently modified objects, newest first. `limit` is clamped to
    /// `1..=20`.
    async fn list_latest(&self, limit: u32) -> ClientResult<Vec<LatestItem>>;

    /// Liveness probe.
    async fn health(&self) -> ClientResult<bool>;
}
