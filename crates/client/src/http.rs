//! reqwest implementation of [`RemoteObjectStore`].

use crate::error::{ClientError, ClientResult};
use crate::types::{
    ExistsResponse, HealthResponse, LatestItem, LatestResponse, PresignRequest, PresignResponse,
};
use crate::RemoteObjectStore;
use async_trait::async_trait;
use photosync_core::config::RemoteConfig;
use photosync_core::{MAX_LATEST_LIMIT, ObjectKey, PresignedTarget};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Remote API client over HTTP.
#[derive(Clone)]
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        // A trailing slash keeps any path prefix when joining endpoints.
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Build a client from configuration. `None` when no base URL is set.
    pub fn from_config(config: &RemoteConfig) -> ClientResult<Option<Self>> {
        config
            .base_url()
            .map(|url| Self::new(url, config.timeout()))
            .transpose()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Check that every supplied metadata value is among the returned headers.
fn verify_echo(request: &PresignRequest, target: &PresignedTarget) -> ClientResult<()> {
    let created = request.created_ms.map(|ms| ms.to_string());
    let expected = created.iter().chain(request.filename.iter());
    for value in expected {
        if !target.headers.values().any(|v| v == value) {
            return Err(ClientError::InvalidResponse(format!(
                "presign response does not echo metadata value {value:?}"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl RemoteObjectStore for HttpRemoteStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn exists(&self, key: &ObjectKey) -> ClientResult<bool> {
        let mut url = self.url("exists")?;
        url.query_pairs_mut().append_pair("key", key.as_str());
        let response: ExistsResponse = self.send_json(self.http.get(url)).await?;
        debug!(exists = response.exists, "exists check");
        Ok(response.exists)
    }

    #[instrument(skip(self, request), fields(key = %request.key))]
    async fn presign(&self, request: &PresignRequest) -> ClientResult<PresignedTarget> {
        let mut url = self.url("presign")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("key", request.key.as_str())
                .append_pair("contentType", &request.content_type);
            if let Some(created) = request.created_ms {
                query.append_pair("created", &created.to_string());
            }
            if let Some(filename) = &request.filename {
                query.append_pair("filename", filename);
            }
        }

        let response: PresignResponse = self.send_json(self.http.get(url)).await?;
        if response.url.trim().is_empty() {
            return Err(ClientError::InvalidResponse(
                "presign response has an empty url".to_string(),
            ));
        }
        let target = PresignedTarget {
            url: response.url,
            headers: response.headers.unwrap_or_default(),
        };
        verify_echo(request, &target)?;
        Ok(target)
    }

    #[instrument(skip(self))]
    async fn list_latest(&self, limit: u32) -> ClientResult<Vec<LatestItem>> {
        let limit = limit.clamp(1, MAX_LATEST_LIMIT);
        let mut url = self.url("latest")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response: LatestResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.items)
    }

    #[instrument(skip(self))]
    async fn health(&self) -> ClientResult<bool> {
        let url = self.url("healthz")?;
        let response: HealthResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.ok)
    }
}
