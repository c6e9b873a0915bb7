//! Core domain types and shared logic for PhotoSync.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content digests and the incremental hasher
//! - Content-addressed object keys
//! - Media items as seen from the local source
//! - Upload jobs and their transfer lifecycle
//! - Sync session aggregates
//! - Configuration shared by the library crates and the CLI

pub mod config;
pub mod error;
pub mod hash;
pub mod item;
pub mod key;
pub mod mime;
pub mod session;
pub mod upload;

pub use error::{Error, Result};
pub use hash::{ContentDigest, DigestHasher};
pub use item::{Item, ItemId, MediaKind};
pub use key::ObjectKey;
pub use session::{SyncSession, TriggerKind};
pub use upload::{JobId, PresignedTarget, TransferState, UploadJob};

/// Block size used when streaming item bytes through the hasher: 1 MiB
pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Maximum number of entries the remote `/latest` endpoint accepts.
pub const MAX_LATEST_LIMIT: u32 = 20;
