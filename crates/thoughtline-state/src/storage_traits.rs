//! Storage trait definitions for Thoughtline
//!
//! `DocumentStore` is the contract of a versioned, replicated document
//! database (CouchDB / Sync Gateway semantics):
//! - `insert` assigns an id and a first revision
//! - `edit` must present the current revision; a stale one is a
//!   `StorageError::Conflict`, distinct from every other failure
//! - `retrieve` returns the latest revision
//!
//! The trait works on raw JSON so it stays object-safe. The typed helpers
//! below convert to and from [`Document`] types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::document::Document;
use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Identifier and revision the store assigned to a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    pub id: String,
    #[serde(rename = "rev")]
    pub revision: String,
}

/// Versioned document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document, returning the assigned id and revision.
    async fn insert(&self, doc: Value) -> StorageResult<DocRef>;

    /// Replace document `id`. `doc` must carry the `_rev` last read by the
    /// writer. Returns the new revision.
    async fn edit(&self, id: &str, doc: Value) -> StorageResult<String>;

    /// Fetch the latest revision of document `id`.
    async fn retrieve(&self, id: &str) -> StorageResult<Value>;
}

/// Insert `doc` and load it back so the returned value carries id and revision.
///
/// Only call this for documents that do not exist yet, otherwise the store
/// ends up with duplicates.
pub async fn insert_document<D: Document>(store: &dyn DocumentStore, doc: &D) -> StorageResult<D> {
    let value = serde_json::to_value(doc)?;
    let doc_ref = store.insert(value).await?;
    debug!(id = %doc_ref.id, doc_type = D::DOC_TYPE, "inserted document");
    retrieve_document(store, &doc_ref.id).await
}

/// Persist `doc` at its current revision and adopt the revision the store
/// assigned, so `doc` can be edited again without a refresh.
pub async fn edit_document<D: Document>(store: &dyn DocumentStore, doc: &mut D) -> StorageResult<()> {
    if doc.id().is_empty() {
        return Err(StorageError::InvalidDocument(format!(
            "{} has no id, insert it first",
            D::DOC_TYPE
        )));
    }
    let id = doc.id().to_string();
    let value = serde_json::to_value(&*doc)?;
    let revision = store.edit(&id, value).await?;
    doc.meta_mut().revision = revision;
    Ok(())
}

/// Load the latest revision of document `id`, checking its `type` tag.
pub async fn retrieve_document<D: Document>(store: &dyn DocumentStore, id: &str) -> StorageResult<D> {
    let value = store.retrieve(id).await?;
    let actual = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if actual != D::DOC_TYPE {
        return Err(StorageError::TypeMismatch {
            id: id.to_string(),
            expected: D::DOC_TYPE.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(serde_json::from_value(value)?)
}

/// Reload `doc` in place (id, revision and fields) from the store.
pub async fn refresh_document<D: Document>(store: &dyn DocumentStore, doc: &mut D) -> StorageResult<()> {
    let id = doc.id().to_string();
    *doc = retrieve_document(store, &id).await?;
    Ok(())
}
