//! Error types for thoughtline-state

use thiserror::Error;

/// Errors that can occur in the document persistence layer.
///
/// `Conflict` is the only recoverable class: it means the revision token the
/// writer presented is stale. Everything else is surfaced to the caller as-is.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store rejected a write because the presented revision is stale
    #[error("revision conflict on document {id}")]
    Conflict { id: String },

    /// Document does not exist
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// Document is missing a field the store needs (id, revision, type)
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Stored document has a different `type` than the caller asked for
    #[error("document {id} has type {actual}, expected {expected}")]
    TypeMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// Store connection settings are missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure talking to the store
    #[error("HTTP error: {0}")]
    Http(String),

    /// Store answered with an unexpected status
    #[error("store returned {status} for {operation} {id}: {body}")]
    Backend {
        operation: &'static str,
        id: String,
        status: u16,
        body: String,
    },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// True for the revision-mismatch class that `cas_update` retries on.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Http(err.to_string())
    }
}
