//! Streaming content hashing.

use photosync_core::{ContentDigest, HASH_CHUNK_SIZE};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Digest everything `reader` yields, one bounded block at a time.
pub async fn digest_reader<R>(mut reader: R) -> std::io::Result<ContentDigest>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = ContentDigest::hasher();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Digest a file on disk.
pub async fn digest_file(path: &Path) -> std::io::Result<ContentDigest> {
    let file = tokio::fs::File::open(path).await?;
    digest_reader(file).await
}
