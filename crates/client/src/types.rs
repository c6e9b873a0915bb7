//! Request and response types of the remote API.

use photosync_core::ObjectKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of a presign call.
#[derive(Clone, Debug)]
pub struct PresignRequest {
    pub key: ObjectKey,
    pub content_type: String,
    /// Capture time, milliseconds since the Unix epoch.
    pub created_ms: Option<i64>,
    /// Original filename.
    pub filename: Option<String>,
}

/// One entry of the `/latest` listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestItem {
    pub key: String,
    pub url: String,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PresignResponse {
    pub url: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LatestResponse {
    #[serde(default)]
    pub items: Vec<LatestItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HealthResponse {
    #[serde(default)]
    pub ok: bool,
}
