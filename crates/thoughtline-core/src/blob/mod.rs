pub mod cbfs;
pub mod fs;
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Prefix marking a string as a blob-store path rather than an external URL.
pub const BLOB_URI_PREFIX: &str = "cbfs://";

/// Streaming body read from or written to a blob store.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// `cbfs://<path>` for a blob-store path.
pub fn blob_uri(path: &str) -> String {
    format!("{BLOB_URI_PREFIX}{path}")
}

/// Strip the blob-store prefix; `None` if `uri` is not an internal URI.
///
/// `cbfs://foo/bar.txt` -> `foo/bar.txt`
pub fn blob_path_from_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix(BLOB_URI_PREFIX)
}

/// Wrap in-memory bytes as a [`BlobReader`].
pub fn reader_from_bytes(bytes: impl Into<Vec<u8>>) -> BlobReader {
    Box::pin(std::io::Cursor::new(bytes.into()))
}

/// Errors from blob store operations.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {path}")]
    NotFound { path: String },

    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob store returned {status} for {operation} {path}")]
    Status {
        operation: &'static str,
        path: String,
        status: u16,
    },

    #[error("http error on {path}: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl BlobError {
    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        BlobError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn http(path: &str, source: reqwest::Error) -> Self {
        BlobError::Http {
            path: path.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BlobError>;

/// Path-addressed blob store.
///
/// Paths are hierarchical, `/`-separated and relative (`<id>/spec.prototxt`).
/// Writing the same bytes to the same path twice is idempotent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `body` into `path`, replacing any existing blob.
    async fn put(&self, path: &str, content_type: &str, body: BlobReader) -> Result<()>;

    /// Open a read stream on `path`. `BlobError::NotFound` if absent.
    async fn get(&self, path: &str) -> Result<BlobReader>;

    /// Delete the blob at `path`.
    async fn remove(&self, path: &str) -> Result<()>;
}

/// Reject empty, absolute and parent-relative paths.
pub fn validate_path(path: &str) -> Result<()> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    Ok(())
}
