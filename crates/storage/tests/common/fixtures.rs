use photosync_core::config::StateConfig;
use photosync_core::{ContentDigest, ItemId, ObjectKey, PresignedTarget, UploadJob};
use std::collections::BTreeMap;
use tempfile::TempDir;

/// State directory rooted in a fresh temp dir. Keep the `TempDir` alive.
pub fn state_dir() -> (TempDir, StateConfig) {
    let temp = TempDir::new().unwrap();
    let config = StateConfig {
        dir: temp.path().join("state"),
    };
    (temp, config)
}

/// A queued job for `item`, with a payload path under `config`.
pub fn sample_job(config: &StateConfig, item: &str) -> UploadJob {
    let digest = ContentDigest::compute(item.as_bytes());
    UploadJob::new(
        ItemId::new(item),
        ObjectKey::for_digest(&digest, "heic"),
        config.payloads_dir().join(format!("{item}.heic")),
        PresignedTarget {
            url: format!("https://bucket.example.com/{}", digest.to_hex()),
            headers: BTreeMap::from([(
                "x-amz-meta-filename".to_string(),
                format!("{item}.HEIC"),
            )]),
        },
        "image/heic",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_job_is_queued() {
        let (_temp, config) = state_dir();
        let job = sample_job(&config, "IMG_0001");
        assert!(job.state.is_pending());
        assert!(job.payload_path.starts_with(config.payloads_dir()));
    }
}
