//! Blob store selection.
//!
//! `THOUGHTLINE_BLOB_URL` picks the backend by scheme:
//! - `http://` / `https://` -> [`CbfsBlobStore`]
//! - `file:///some/dir` or a bare path -> [`FsBlobStore`]

use std::path::PathBuf;
use std::sync::Arc;

use crate::blob::cbfs::CbfsBlobStore;
use crate::blob::fs::FsBlobStore;
use crate::blob::{BlobError, BlobStore};

/// Environment variable holding the blob store location.
pub const BLOB_URL_ENV: &str = "THOUGHTLINE_BLOB_URL";

/// Where blobs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobStoreConfig {
    /// CBFS-style HTTP blob server rooted at `base_url`
    Cbfs { base_url: String },
    /// Local directory
    Filesystem { root: PathBuf },
}

impl BlobStoreConfig {
    /// Parse a blob store location.
    pub fn parse(location: &str) -> Result<Self, String> {
        let location = location.trim();
        if location.is_empty() {
            return Err("blob store location is empty".to_string());
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(Self::Cbfs {
                base_url: location.to_string(),
            });
        }
        if let Some(path) = location.strip_prefix("file://") {
            if path.is_empty() {
                return Err(format!("{location:?} names no directory"));
            }
            return Ok(Self::Filesystem { root: path.into() });
        }
        if location.contains("://") {
            return Err(format!("unsupported blob store scheme in {location:?}"));
        }
        Ok(Self::Filesystem {
            root: location.into(),
        })
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - THOUGHTLINE_BLOB_URL (required)
    pub fn from_env() -> Result<Self, String> {
        let location =
            std::env::var(BLOB_URL_ENV).map_err(|_| format!("{BLOB_URL_ENV} not set"))?;
        Self::parse(&location)
    }

    /// Build the configured store.
    pub fn connect(&self) -> Result<Arc<dyn BlobStore>, BlobError> {
        Ok(match self {
            Self::Cbfs { base_url } => Arc::new(CbfsBlobStore::new(base_url.clone())?),
            Self::Filesystem { root } => Arc::new(FsBlobStore::new(root)?),
        })
    }
}
