//! Streaming extraction of `.tar.gz` archives.
//!
//! The archive is decompressed and unpacked one entry at a time; nothing
//! holds the whole archive in memory. The result is the ordered list of
//! regular files extracted, relative to the destination, exactly in archive
//! order. That order drives label assignment downstream.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flate2::read::GzDecoder;
use thiserror::Error;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, trace};

use crate::blob::BlobReader;

/// Errors from archive extraction. All are fatal to the extraction.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Corrupt gzip or tar stream, or the source stream failed mid-read
    #[error("malformed archive: {0}")]
    Malformed(#[source] io::Error),

    /// Entry path is absolute or climbs out of the destination
    #[error("unsafe path in archive: {0}")]
    UnsafePath(String),

    /// Writing an entry to disk failed
    #[error("failed to extract {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The blocking extraction task panicked or was cancelled
    #[error("extraction task failed: {0}")]
    Task(String),

    /// The caller stopped waiting; extraction halted between entries
    #[error("extraction cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Extract a gzip-compressed tar stream into `dest`.
///
/// Runs on the blocking pool; `reader` is bridged into a synchronous
/// `Read` so decompression pulls bytes from the network as it goes.
/// Returns the relative paths of extracted regular files, in archive order.
///
/// A blocking task cannot be aborted, so dropping the returned future only
/// asks it to stop before the next entry. Callers that need the destination
/// to be quiescent must await this to completion.
pub async fn extract_tar_gz(reader: BlobReader, dest: &Path) -> Result<Vec<String>> {
    let bridge = SyncIoBridge::new(reader);
    let dest = dest.to_path_buf();
    let stop = Arc::new(AtomicBool::new(false));
    let _stop_on_drop = StopOnDrop(stop.clone());
    tokio::task::spawn_blocking(move || unpack_entries(bridge, &dest, &stop))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Synchronous core of [`extract_tar_gz`].
pub fn unpack_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<Vec<String>> {
    unpack_entries(reader, dest, &AtomicBool::new(false))
}

fn unpack_entries<R: Read>(reader: R, dest: &Path, stop: &AtomicBool) -> Result<Vec<String>> {
    create_dir(dest)?;

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut toc = Vec::new();

    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        if stop.load(Ordering::Relaxed) {
            debug!(dest = %dest.display(), files = toc.len(), "extraction stopped");
            return Err(ArchiveError::Cancelled);
        }
        let mut entry = entry.map_err(ArchiveError::Malformed)?;
        let raw_path = entry.path().map_err(ArchiveError::Malformed)?.into_owned();
        let Some(rel) = normalize_entry_path(&raw_path)? else {
            // "./" or an empty name: the destination root itself
            continue;
        };
        let target = dest.join(&rel);
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            create_dir(&target)?;
        } else if kind.is_file() || kind.is_contiguous() {
            if let Some(parent) = target.parent() {
                create_dir(parent)?;
            }
            let mut file = fs::File::create(&target).map_err(|source| ArchiveError::Extract {
                path: target.clone(),
                source,
            })?;
            io::copy(&mut entry, &mut file).map_err(|source| ArchiveError::Extract {
                path: target.clone(),
                source,
            })?;
            trace!(path = %rel, "extracted file");
            toc.push(rel);
        } else {
            // Links and special files are not materialized, but the
            // directory they live in still is.
            if let Some(parent) = target.parent() {
                create_dir(parent)?;
            }
            debug!(path = %rel, kind = ?kind, "skipping non-regular entry");
        }
    }

    debug!(dest = %dest.display(), files = toc.len(), "archive extracted");
    Ok(toc)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| ArchiveError::Extract {
        path: path.to_path_buf(),
        source,
    })
}

/// `/`-joined relative path with `.` segments removed; `None` for the root.
fn normalize_entry_path(path: &Path) -> Result<Option<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(path.display().to_string()));
            }
        }
    }
    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join("/")))
    }
}
