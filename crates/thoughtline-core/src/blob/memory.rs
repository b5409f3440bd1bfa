//! In-memory blob store (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{reader_from_bytes, BlobError, BlobReader, BlobStore, Result};

/// Blob store backed by a `HashMap<path, (content type, bytes)>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob directly.
    pub fn insert(&self, path: &str, content_type: &str, data: impl Into<Vec<u8>>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), (content_type.to_string(), data.into()));
    }

    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(path).map(|(_, b)| b.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.blobs.lock().unwrap().get(path).map(|(ct, _)| ct.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, content_type: &str, mut body: BlobReader) -> Result<()> {
        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .await
            .map_err(|e| BlobError::io(path, e))?;
        self.insert(path, content_type, data);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<BlobReader> {
        self.bytes(path)
            .map(reader_from_bytes)
            .ok_or_else(|| BlobError::NotFound {
                path: path.to_string(),
            })
    }

    async fn remove(&self, path: &str) -> Result<()> {
        match self.blobs.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}
