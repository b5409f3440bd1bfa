use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::{validate_path, BlobError, BlobReader, BlobStore, Result};

/// Filesystem-backed blob store for local development and tests.
///
/// Layout: `<root>/<blob path>`, one file per blob.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a new `FsBlobStore` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| BlobError::io(&root.to_string_lossy(), e))?;
        Ok(Self { root })
    }

    fn blob_path(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, _content_type: &str, mut body: BlobReader) -> Result<()> {
        let dest = self.blob_path(path)?;
        let parent = dest
            .parent()
            .ok_or_else(|| BlobError::InvalidPath(path.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| BlobError::io(path, e))?;

        // Atomic write: stream into a temp file in the same directory, then rename.
        let tmp = NamedTempFile::new_in(&parent).map_err(|e| BlobError::io(path, e))?;
        let std_file = tmp.reopen().map_err(|e| BlobError::io(path, e))?;
        let mut file = tokio::fs::File::from_std(std_file);
        tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| BlobError::io(path, e))?;
        file.flush().await.map_err(|e| BlobError::io(path, e))?;
        drop(file);
        tmp.persist(&dest).map_err(|e| BlobError::io(path, e.error))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<BlobReader> {
        let src = self.blob_path(path)?;
        match tokio::fs::File::open(&src).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(BlobError::io(path, e)),
        }
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let target = self.blob_path(path)?;
        tokio::fs::remove_file(&target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound {
                    path: path.to_string(),
                }
            } else {
                BlobError::io(path, e)
            }
        })
    }
}
