//! Library watcher: turns file system events under the source directory
//! into library-change windows.

use crate::scheduler::TimedPlatform;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Watches a directory tree and calls [`TimedPlatform::notify_change`] once
/// events have been quiet for the debounce period.
///
/// Dropping the watcher stops both the OS watch and the debounce task.
pub struct LibraryWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    handle: JoinHandle<()>,
}

impl LibraryWatcher {
    pub fn start(
        path: impl AsRef<Path>,
        platform: Arc<TimedPlatform>,
        debounce: Duration,
    ) -> notify::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                if events_tx.send(result).is_err() {
                    trace!("library watcher channel closed, dropping event");
                }
            },
            Config::default(),
        )?;
        watcher.watch(&path, RecursiveMode::Recursive)?;
        info!(path = %path.display(), debounce_ms = debounce.as_millis() as u64, "watching library");

        let handle = tokio::spawn(debounce_changes(events_rx, platform, debounce));
        Ok(Self {
            path,
            _watcher: watcher,
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn is_library_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

async fn debounce_changes(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    platform: Arc<TimedPlatform>,
    debounce: Duration,
) {
    while let Some(result) = events.recv().await {
        match result {
            Ok(event) if is_library_change(&event) => {
                debug!(kind = ?event.kind, paths = ?event.paths, "library changed");
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "library watcher error");
                continue;
            }
        }

        // Swallow the burst that usually follows a single import.
        let mut closed = false;
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        platform.notify_change().await;
        if closed {
            break;
        }
    }
    debug!("library watcher stopped");
}
