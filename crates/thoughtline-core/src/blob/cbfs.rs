//! CBFS blob store client
//!
//! CBFS exposes blobs directly under its base URL: `PUT`, `GET` and
//! `DELETE` on `<base>/<path>`. Bodies are streamed in both directions.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use super::{BlobError, BlobReader, BlobStore, Result};

/// HTTP client for a CBFS cluster.
#[derive(Debug, Clone)]
pub struct CbfsBlobStore {
    base_url: String,
    http: reqwest::Client,
}

impl CbfsBlobStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let http = reqwest::Client::builder()
            .user_agent(concat!("thoughtline-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BlobError::http(&base_url, e))?;
        Ok(Self { base_url, http })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    fn check(resp: &reqwest::Response, operation: &'static str, path: &str) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(BlobError::NotFound {
                path: path.to_string(),
            })
        } else {
            Err(BlobError::Status {
                operation,
                path: path.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl BlobStore for CbfsBlobStore {
    async fn put(&self, path: &str, content_type: &str, body: BlobReader) -> Result<()> {
        let body = reqwest::Body::wrap_stream(ReaderStream::new(body));
        let resp = self
            .http
            .put(self.url(path))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| BlobError::http(path, e))?;
        Self::check(&resp, "put", path)?;
        debug!(path, "cbfs put");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<BlobReader> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| BlobError::http(path, e))?;
        Self::check(&resp, "get", path)?;
        debug!(path, "cbfs get");
        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .map_err(|e| BlobError::http(path, e))?;
        Self::check(&resp, "remove", path)?;
        debug!(path, "cbfs remove");
        Ok(())
    }
}
