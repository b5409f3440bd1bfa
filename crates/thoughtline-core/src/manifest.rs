//! Labeled training manifests (TOC files).
//!
//! A manifest lists `(path, label)` pairs, one per line as
//! `<path> <label>\n`. Labels come from directory grouping over the
//! extraction order:
//!
//! ```text
//! Q/Verdana-5-0.png      Q/Verdana-5-0.png 0
//! Q/Arial-5-0.png   ->   Q/Arial-5-0.png 0
//! R/Arial-5-0.png        R/Arial-5-0.png 1
//! ```
//!
//! The label increments whenever an entry's parent directory differs from
//! the previous entry's, so a directory that reappears later gets a new
//! label. Archives are expected to keep each class contiguous.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// One line of a training manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub label: u32,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, label: u32) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.label)
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest line {line} is malformed: {content:?}")]
    MalformedLine { line: usize, content: String },

    /// The path would split its manifest line in two
    #[error("path {path:?} contains a line break and cannot be listed in a manifest")]
    UnrepresentablePath { path: String },

    #[error("io error on manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// Parent directory in `path.Dir` terms: `A/B/x.png` -> `A/B`, `x.png` -> `.`.
fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => ".",
    }
}

/// Assign class labels by adjacent directory grouping, preserving order.
pub fn label_by_directory<I, S>(paths: I) -> Vec<ManifestEntry>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut current_dir: Option<String> = None;
    let mut label = 0u32;

    paths
        .into_iter()
        .map(|path| {
            let path = path.into();
            let dir = parent_dir(&path);
            let changed = current_dir.as_deref().is_some_and(|prev| prev != dir);
            if changed {
                label += 1;
            }
            if changed || current_dir.is_none() {
                current_dir = Some(dir.to_string());
            }
            ManifestEntry { path, label }
        })
        .collect()
}

/// Prefix every entry's path with `dir`, keeping labels.
///
/// `("Q/a.png", 27)` with `training-data` -> `("training-data/Q/a.png", 27)`
pub fn with_parent_dir(entries: &[ManifestEntry], dir: &str) -> Vec<ManifestEntry> {
    let dir = dir.trim_end_matches('/');
    entries
        .iter()
        .map(|entry| {
            let path = if dir.is_empty() {
                entry.path.clone()
            } else {
                format!("{dir}/{}", entry.path)
            };
            ManifestEntry {
                path,
                label: entry.label,
            }
        })
        .collect()
}

/// Render entries in manifest file format.
pub fn render_manifest(entries: &[ManifestEntry]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

/// Parse manifest text. Each line splits on its last space.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(idx, line)| {
            let malformed = || ManifestError::MalformedLine {
                line: idx + 1,
                content: line.to_string(),
            };
            let (path, label) = line.rsplit_once(' ').ok_or_else(malformed)?;
            if path.is_empty() {
                return Err(malformed());
            }
            let label = label.parse::<u32>().map_err(|_| malformed())?;
            Ok(ManifestEntry::new(path, label))
        })
        .collect()
}

/// Write a manifest file at `dest`, replacing any existing file.
///
/// Paths containing a newline are rejected before anything is written.
pub async fn write_manifest(entries: &[ManifestEntry], dest: &Path) -> Result<()> {
    if let Some(entry) = entries.iter().find(|e| e.path.contains('\n')) {
        return Err(ManifestError::UnrepresentablePath {
            path: entry.path.clone(),
        });
    }

    let io_err = |source| ManifestError::Io {
        path: dest.to_path_buf(),
        source,
    };
    let file = tokio::fs::File::create(dest).await.map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for entry in entries {
        debug!(entry = %entry, "manifest entry");
        writer
            .write_all(format!("{entry}\n").as_bytes())
            .await
            .map_err(io_err)?;
    }
    writer.flush().await.map_err(io_err)?;
    writer.into_inner().sync_all().await.map_err(io_err)?;
    Ok(())
}

/// Read and parse the manifest file at `path`.
pub async fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_manifest(&text)
}
