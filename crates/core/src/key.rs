//! Content-addressed object keys.

use crate::hash::ContentDigest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix under which all content-addressed photos live.
pub const KEY_PREFIX: &str = "photos/by-hash";

/// Extension used when the original filename has none.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// A remote object key derived from a content digest.
///
/// Format: `photos/by-hash/<hex[0:2]>/<hex[2:4]>/<hex>.<ext>`. The two shard
/// levels bound the fan-out of any single remote "directory".
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey {
    key: String,
    digest: ContentDigest,
}

impl ObjectKey {
    /// Derive the key for a digest and a file extension.
    ///
    /// The extension is lower-cased and stripped of a leading dot; an empty
    /// extension falls back to [`DEFAULT_EXTENSION`].
    pub fn for_digest(digest: &ContentDigest, extension: &str) -> Self {
        let ext = normalize_extension(extension);
        let hex = digest.to_hex();
        let key = format!("{KEY_PREFIX}/{}/{}/{hex}.{ext}", &hex[0..2], &hex[2..4]);
        Self {
            key,
            digest: *digest,
        }
    }

    /// Parse and validate an existing key.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let rest = s
            .strip_prefix(KEY_PREFIX)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| crate::Error::InvalidKey(format!("missing {KEY_PREFIX}/ prefix: {s}")))?;

        let parts: Vec<&str> = rest.split('/').collect();
        let [shard1, shard2, file] = parts.as_slice() else {
            return Err(crate::Error::InvalidKey(format!(
                "expected two shard levels and a file name: {s}"
            )));
        };

        let (hex, ext) = file
            .rsplit_once('.')
            .ok_or_else(|| crate::Error::InvalidKey(format!("missing extension: {s}")))?;
        if ext.is_empty() || ext.chars().any(|c| !c.is_ascii_alphanumeric()) {
            return Err(crate::Error::InvalidKey(format!("invalid extension: {s}")));
        }

        let digest = ContentDigest::from_hex(hex)
            .map_err(|e| crate::Error::InvalidKey(format!("{s}: {e}")))?;
        let expected = Self::for_digest(&digest, ext);
        if *shard1 != &expected.digest_hex()[0..2]
            || *shard2 != &expected.digest_hex()[2..4]
            || expected.key != s
        {
            return Err(crate::Error::InvalidKey(format!(
                "shards do not match digest: {s}"
            )));
        }
        Ok(expected)
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the digest this key was derived from.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// Get the hex form of the digest.
    pub fn digest_hex(&self) -> String {
        self.digest.to_hex()
    }

    /// Get the file extension of the key.
    pub fn extension(&self) -> &str {
        self.key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
    }
}

fn normalize_extension(extension: &str) -> String {
    let ext = extension.trim().trim_start_matches('.');
    if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        ext.to_ascii_lowercase()
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.key
    }
}
