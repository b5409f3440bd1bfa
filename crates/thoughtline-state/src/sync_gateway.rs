//! Sync Gateway / CouchDB document store
//!
//! Talks the CouchDB document API over HTTP:
//! - `POST <db>/` inserts and answers `{"id", "rev"}`
//! - `PUT <db>/<id>` edits; `409 Conflict` when `_rev` is stale
//! - `GET <db>/<id>` retrieves the latest revision

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::storage_traits::{DocRef, DocumentStore, StorageResult};

/// Connection settings for the document store
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Database URL, e.g. "http://localhost:4984/thoughtline"
    pub db_url: String,
    /// Basic-auth username (optional)
    pub username: Option<String>,
    /// Basic-auth password (optional)
    pub password: Option<String>,
}

impl GatewayConfig {
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            username: None,
            password: None,
        }
    }

    /// Set basic-auth credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - THOUGHTLINE_DB_URL (required)
    /// - THOUGHTLINE_DB_USERNAME (optional)
    /// - THOUGHTLINE_DB_PASSWORD (optional)
    pub fn from_env() -> std::result::Result<Self, String> {
        let db_url =
            std::env::var("THOUGHTLINE_DB_URL").map_err(|_| "THOUGHTLINE_DB_URL not set")?;
        Ok(Self {
            db_url,
            username: std::env::var("THOUGHTLINE_DB_USERNAME").ok(),
            password: std::env::var("THOUGHTLINE_DB_PASSWORD").ok(),
        })
    }
}

/// HTTP-backed [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct SyncGatewayStore {
    config: GatewayConfig,
    http: reqwest::Client,
}

#[derive(serde::Deserialize)]
struct WriteResponse {
    id: String,
    rev: String,
}

impl SyncGatewayStore {
    pub fn new(config: GatewayConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("thoughtline-state/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn from_env() -> StorageResult<Self> {
        let config = GatewayConfig::from_env().map_err(StorageError::Configuration)?;
        Self::new(config)
    }

    pub fn db_url(&self) -> &str {
        self.config.db_url.trim_end_matches('/')
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}", self.db_url(), id)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(user) => req.basic_auth(user, self.config.password.as_deref()),
            None => req,
        }
    }

    /// Map a non-success status to the storage error taxonomy.
    async fn check(
        resp: reqwest::Response,
        operation: &'static str,
        id: &str,
    ) -> StorageResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match status {
            StatusCode::CONFLICT => Err(StorageError::Conflict { id: id.to_string() }),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound { id: id.to_string() }),
            _ => Err(StorageError::Backend {
                operation,
                id: id.to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl DocumentStore for SyncGatewayStore {
    #[instrument(skip(self, doc))]
    async fn insert(&self, doc: Value) -> StorageResult<DocRef> {
        let url = format!("{}/", self.db_url());
        let resp = self.authorize(self.http.post(&url).json(&doc)).send().await?;
        let resp = Self::check(resp, "insert", "").await?;
        let written: WriteResponse = resp.json().await?;
        debug!(id = %written.id, rev = %written.rev, "document inserted");
        Ok(DocRef {
            id: written.id,
            revision: written.rev,
        })
    }

    #[instrument(skip(self, doc))]
    async fn edit(&self, id: &str, doc: Value) -> StorageResult<String> {
        let resp = self
            .authorize(self.http.put(self.doc_url(id)).json(&doc))
            .send()
            .await?;
        let resp = Self::check(resp, "edit", id).await?;
        let written: WriteResponse = resp.json().await?;
        debug!(rev = %written.rev, "document edited");
        Ok(written.rev)
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, id: &str) -> StorageResult<Value> {
        let resp = self.authorize(self.http.get(self.doc_url(id))).send().await?;
        let resp = Self::check(resp, "retrieve", id).await?;
        Ok(resp.json().await?)
    }
}
