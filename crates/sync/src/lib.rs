//! PhotoSync pipeline: upload orchestration, background transfers and
//! execution windows.
//!
//! A sync run enumerates the newest items of an [`ItemSource`], skips the
//! ones recorded in the dedup index, hashes the rest, asks the remote API
//! whether the content already exists and, if not, presigns an upload and
//! hands it to the [`TransferEngine`]. The engine uploads on its own tasks;
//! its completion events are what mark items as uploaded.

pub mod error;
pub mod hasher;
pub mod metrics;
pub mod orchestrator;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod transfer;
pub mod watcher;

pub use error::{ItemError, Result, SyncError, TransferError};
pub use orchestrator::UploadOrchestrator;
pub use scheduler::{ExecutionPlatform, ExecutionScheduler, ExecutionWindow, TimedPlatform};
pub use source::{DirectorySource, ItemSource, SourceAccess};
pub use state::SyncState;
pub use transfer::{
    Completion, HttpTransport, TransferEngine, TransferEvent, TransferOutcome, Transport,
    TransportError,
};
pub use watcher::LibraryWatcher;
