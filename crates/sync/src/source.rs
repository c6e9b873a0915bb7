//! Local item sources.

use async_trait::async_trait;
use photosync_core::{Item, ItemId, MediaKind};
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Access level the source granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceAccess {
    /// Every item is visible.
    Full,
    /// Only a subset is visible; syncing would silently miss items.
    Limited,
    /// Nothing is visible.
    Denied,
}

/// Where items come from. Items are read-only to the pipeline.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Current access level.
    async fn access(&self) -> SourceAccess;

    /// Up to `limit` items, newest capture time first.
    async fn newest(&self, limit: usize) -> io::Result<Vec<Item>>;

    /// Copy the item's bytes to `dest`. Returns the number of bytes written.
    async fn export(&self, item: &Item, dest: &Path) -> io::Result<u64>;
}

/// Item source backed by a directory tree.
///
/// Item IDs are paths relative to the root, `/`-separated. Hidden files and
/// files that are neither images nor videos are ignored.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, id: &ItemId) -> io::Result<PathBuf> {
        let relative = Path::new(id.as_str());
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("item id escapes source root: {id}"),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn scan(root: &Path) -> io::Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut dirs = vec![root.to_path_buf()];

        while let Some(dir) = dirs.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    dirs.push(entry.path());
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
                let kind = MediaKind::from_extension(extension);
                if kind == MediaKind::Other {
                    continue;
                }

                let path = entry.path();
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let id = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                let metadata = entry.metadata()?;
                let captured = metadata.modified().or_else(|_| metadata.created())?;

                items.push(Item {
                    id: ItemId::new(id),
                    created_at: OffsetDateTime::from(captured),
                    filename: name,
                    kind,
                });
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl ItemSource for DirectorySource {
    async fn access(&self) -> SourceAccess {
        match tokio::fs::read_dir(&self.root).await {
            Ok(_) => SourceAccess::Full,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "source not readable");
                SourceAccess::Denied
            }
        }
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn newest(&self, limit: usize) -> io::Result<Vec<Item>> {
        let root = self.root.clone();
        let mut items = tokio::task::spawn_blocking(move || Self::scan(&root))
            .await
            .map_err(|e| io::Error::other(format!("spawn_blocking failed: {e}")))??;

        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(limit);
        debug!(count = items.len(), "scanned source");
        Ok(items)
    }

    async fn export(&self, item: &Item, dest: &Path) -> io::Result<u64> {
        let src = self.item_path(&item.id)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest).await
    }
}
