//! Media items as exposed by a local item source.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Opaque identifier of an item within its source.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Declared media kind of an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    /// Classify a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "heic" | "heif" | "png" | "gif" | "tif" | "tiff" | "webp" | "dng" => {
                Self::Image
            }
            "mov" | "mp4" | "m4v" | "avi" => Self::Video,
            _ => Self::Other,
        }
    }
}

/// A local media item.
///
/// Items are owned by their source; the pipeline only reads them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Source-specific identifier.
    pub id: ItemId,
    /// When the item was captured.
    pub created_at: OffsetDateTime,
    /// Original filename, including extension.
    pub filename: String,
    /// Declared media kind.
    pub kind: MediaKind,
}

impl Item {
    /// Extension of the original filename, without the dot.
    pub fn extension(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }

    /// Capture time as milliseconds since the Unix epoch.
    pub fn created_epoch_ms(&self) -> i64 {
        i64::try_from(self.created_at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }
}
