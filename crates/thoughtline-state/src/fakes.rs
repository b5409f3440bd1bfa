//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryDocumentStore` enforces the same revision rules as a real store and
//! lets tests inject conflicts and failures and count calls.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<String, Value>,
    generations: HashMap<String, u64>,
    pending_conflicts: usize,
    pending_failure: Option<u16>,
    edits: usize,
    successful_edits: usize,
    retrieves: usize,
}

/// In-memory document store backed by a `HashMap<id, json>`.
///
/// Revisions look like CouchDB's: `<generation>-<random>`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` edits fail with `StorageError::Conflict` without
    /// touching the stored document.
    pub fn inject_conflicts(&self, n: usize) {
        self.inner.lock().unwrap().pending_conflicts = n;
    }

    /// The next edit fails with a non-conflict backend error.
    pub fn fail_next_edit(&self, status: u16) {
        self.inner.lock().unwrap().pending_failure = Some(status);
    }

    /// Apply `mutate` to the stored document and bump its revision, as a
    /// concurrent writer would.
    pub fn concurrent_edit(&self, id: &str, mutate: impl FnOnce(&mut Value)) -> StorageResult<String> {
        let mut inner = self.inner.lock().unwrap();
        let mut doc = inner
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        mutate(&mut doc);
        Ok(Self::store_new_revision(&mut inner, id, doc))
    }

    /// Number of `edit` calls, successful or not.
    pub fn edit_count(&self) -> usize {
        self.inner.lock().unwrap().edits
    }

    pub fn successful_edit_count(&self) -> usize {
        self.inner.lock().unwrap().successful_edits
    }

    pub fn retrieve_count(&self) -> usize {
        self.inner.lock().unwrap().retrieves
    }

    fn store_new_revision(inner: &mut Inner, id: &str, mut doc: Value) -> String {
        let generation = inner.generations.entry(id.to_string()).or_insert(0);
        *generation += 1;
        let revision = format!("{}-{}", generation, uuid::Uuid::new_v4().simple());
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("_id".to_string(), Value::String(id.to_string()));
            obj.insert("_rev".to_string(), Value::String(revision.clone()));
        }
        inner.docs.insert(id.to_string(), doc);
        revision
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, doc: Value) -> StorageResult<DocRef> {
        if !doc.is_object() {
            return Err(StorageError::InvalidDocument(
                "document must be a JSON object".to_string(),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if inner.docs.contains_key(&id) {
            return Err(StorageError::Conflict { id });
        }
        let revision = Self::store_new_revision(&mut inner, &id, doc);
        Ok(DocRef { id, revision })
    }

    async fn edit(&self, id: &str, doc: Value) -> StorageResult<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.edits += 1;

        if inner.pending_conflicts > 0 {
            inner.pending_conflicts -= 1;
            return Err(StorageError::Conflict { id: id.to_string() });
        }
        if let Some(status) = inner.pending_failure.take() {
            return Err(StorageError::Backend {
                operation: "edit",
                id: id.to_string(),
                status,
                body: "injected failure".to_string(),
            });
        }

        let current = inner
            .docs
            .get(id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        let presented = doc.get("_rev").and_then(Value::as_str);
        let stored = current.get("_rev").and_then(Value::as_str);
        if presented != stored {
            return Err(StorageError::Conflict { id: id.to_string() });
        }

        let revision = Self::store_new_revision(&mut inner, id, doc);
        inner.successful_edits += 1;
        Ok(revision)
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Value> {
        let mut inner = self.inner.lock().unwrap();
        inner.retrieves += 1;
        inner
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }
}
