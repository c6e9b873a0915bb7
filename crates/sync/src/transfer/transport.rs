//! Wire transport for presigned PUTs.

use async_trait::async_trait;
use photosync_core::UploadJob;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// A single failed PUT attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("payload unreadable: {0}")]
    Payload(#[source] std::io::Error),

    #[error("request failed: {0}")]
    Network(String),

    #[error("upload rejected ({status}): {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Transport errors and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Payload(_) => false,
        }
    }
}

/// Performs the PUT of a job's payload to its presigned target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload the payload. Returns the HTTP status on success.
    async fn put(&self, job: &UploadJob) -> Result<u16, TransportError>;
}

/// reqwest transport streaming the payload file as the request body.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, job), fields(job_id = %job.id, key = %job.key))]
    async fn put(&self, job: &UploadJob) -> Result<u16, TransportError> {
        let file = tokio::fs::File::open(&job.payload_path)
            .await
            .map_err(TransportError::Payload)?;
        let len = file
            .metadata()
            .await
            .map_err(TransportError::Payload)?
            .len();

        let mut req = self
            .http
            .put(&job.target.url)
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)));

        let signed_content_type = job
            .target
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
        if !signed_content_type {
            req = req.header(CONTENT_TYPE, &job.content_type);
        }
        for (name, value) in &job.target.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
