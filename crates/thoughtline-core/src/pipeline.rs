//! Artifact retrieval for training jobs.
//!
//! [`SolverArtifacts`] moves a solver's artifacts between the outside world,
//! the blob store and a local working directory:
//! - `mirror_specification`: external http(s) spec -> `cbfs://<solver-id>/spec.prototxt`
//! - `materialize_train_test_data`: dataset archives -> extracted trees + `training`/`test` manifests
//! - `materialize_specification`: mirrored spec -> `<work-dir>/<spec filename>`
//!
//! Blob paths are keyed by entity id, so two workers doing the same step
//! write identical bytes to the same path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use serde::Serialize;
use thiserror::Error;
use thoughtline_state::{
    retrieve_document, testing_artifact_path, training_artifact_path, Document, DocumentStore,
    Solver, StorageError,
};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};

use crate::archive::{self, ArchiveError};
use crate::blob::{blob_path_from_uri, blob_uri, BlobError, BlobReader, BlobStore};
use crate::manifest::{self, label_by_directory, with_parent_dir, ManifestEntry, ManifestError};
use crate::obs;

/// Content type used when storing solver specifications.
pub const SPEC_CONTENT_TYPE: &str = "text/plain";

/// Blob path of a solver's mirrored specification: `<solver-id>/spec.prototxt`.
pub fn specification_path(solver_id: &str) -> String {
    format!("{solver_id}/spec.prototxt")
}

/// Blob path behind a mirrored solver's specification URL.
///
/// `cbfs://foo/bar.txt` -> `foo/bar.txt`; anything else means the
/// specification was never mirrored.
pub fn specification_blob_path(solver: &Solver) -> Result<&str> {
    blob_path_from_uri(&solver.specification_url).ok_or_else(|| {
        PipelineError::SpecificationNotMirrored {
            solver_id: solver.id().to_string(),
            url: solver.specification_url.clone(),
        }
    })
}

/// One half of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSplit {
    Training,
    Test,
}

impl DataSplit {
    pub const ALL: [DataSplit; 2] = [DataSplit::Training, DataSplit::Test];

    /// Blob path of this split's archive for `dataset_id`.
    pub fn artifact_path(self, dataset_id: &str) -> String {
        match self {
            DataSplit::Training => training_artifact_path(dataset_id),
            DataSplit::Test => testing_artifact_path(dataset_id),
        }
    }

    /// Directory under the working directory the archive is extracted into,
    /// and the prefix of every manifest path.
    pub fn subdirectory(self) -> &'static str {
        match self {
            DataSplit::Training => "training-data",
            DataSplit::Test => "test-data",
        }
    }

    /// Manifest filename in the working directory.
    pub fn manifest_name(self) -> &'static str {
        match self {
            DataSplit::Training => "training",
            DataSplit::Test => "test",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("solver {solver_id}: specification url {url:?} is not a cbfs:// uri; mirror it first")]
    SpecificationNotMirrored { solver_id: String, url: String },

    #[error("solver {solver_id}: specification url {url:?} is neither http(s) nor cbfs://")]
    UnsupportedSpecificationUrl { solver_id: String, url: String },

    #[error("solver {solver_id} has no dataset")]
    MissingDataset { solver_id: String },

    #[error("could not build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("downloading {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("downloading {url}: server returned {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("blob store: {0}")]
    Blob(#[from] BlobError),

    #[error("extracting {artifact}: {source}")]
    Archive {
        artifact: String,
        #[source]
        source: ArchiveError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("document store: {0}")]
    Storage(#[from] StorageError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A split extracted into the working directory with its manifest written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedSplit {
    pub split: DataSplit,
    pub data_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub entries: Vec<ManifestEntry>,
}

impl MaterializedSplit {
    /// Distinct labels in the manifest.
    pub fn class_count(&self) -> usize {
        self.entries.last().map_or(0, |e| e.label as usize + 1)
    }
}

/// Everything a trainer needs in its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedWorkspace {
    pub specification: PathBuf,
    pub training: MaterializedSplit,
    pub test: MaterializedSplit,
}

/// Retrieval operations for solver artifacts.
#[derive(Clone)]
pub struct SolverArtifacts {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    http: reqwest::Client,
}

impl SolverArtifacts {
    pub fn new(docs: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("thoughtline-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PipelineError::HttpClient)?;
        Ok(Self { docs, blobs, http })
    }

    /// Use a preconfigured HTTP client for specification downloads.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub async fn load_solver(&self, solver_id: &str) -> Result<Solver> {
        Ok(retrieve_document(&*self.docs, solver_id).await?)
    }

    /// Copy the solver's external specification into the blob store and
    /// point the solver at the internal copy.
    ///
    /// Returns the updated solver. On failure the stored solver is untouched.
    /// A solver that is already mirrored is returned as is.
    #[instrument(skip(self, solver), fields(solver_id = %solver.id()))]
    pub async fn mirror_specification(&self, solver: &Solver) -> Result<Solver> {
        let source = solver.specification_url.as_str();
        if blob_path_from_uri(source).is_some() {
            debug!(url = %source, "specification already mirrored");
            return Ok(solver.clone());
        }
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(PipelineError::UnsupportedSpecificationUrl {
                solver_id: solver.id().to_string(),
                url: source.to_string(),
            });
        }

        let body = self.download(source).await?;
        let dest = specification_path(solver.id());
        self.blobs.put(&dest, SPEC_CONTENT_TYPE, body).await?;
        obs::emit_spec_mirrored(solver.id(), source, &dest);

        let mut updated = solver.clone();
        updated
            .set_specification_url(&*self.docs, &blob_uri(&dest))
            .await?;
        Ok(updated)
    }

    /// Fetch, extract and label both dataset archives of `solver` under
    /// `work_dir`, writing the `training` and `test` manifests.
    ///
    /// On failure the first error (training before test) is returned; files
    /// already extracted stay on disk.
    #[instrument(skip(self, solver, work_dir), fields(solver_id = %solver.id()))]
    pub async fn materialize_train_test_data(
        &self,
        solver: &Solver,
        work_dir: &Path,
    ) -> Result<(MaterializedSplit, MaterializedSplit)> {
        if solver.dataset_id.is_empty() {
            return Err(PipelineError::MissingDataset {
                solver_id: solver.id().to_string(),
            });
        }
        let dataset_id = solver.dataset_id.as_str();
        // Both legs run to completion before either error is reported, so no
        // extraction is still writing under `work_dir` once this returns.
        let (training, test) = tokio::join!(
            self.materialize_split(dataset_id, DataSplit::Training, work_dir),
            self.materialize_split(dataset_id, DataSplit::Test, work_dir),
        );
        Ok((training?, test?))
    }

    /// Extract one dataset archive and write its manifest.
    pub async fn materialize_split(
        &self,
        dataset_id: &str,
        split: DataSplit,
        work_dir: &Path,
    ) -> Result<MaterializedSplit> {
        let artifact = split.artifact_path(dataset_id);
        debug!(artifact = %artifact, "fetching dataset archive");
        let reader = self.blobs.get(&artifact).await?;

        let data_dir = work_dir.join(split.subdirectory());
        let toc = archive::extract_tar_gz(reader, &data_dir)
            .await
            .map_err(|source| PipelineError::Archive {
                artifact: artifact.clone(),
                source,
            })?;

        let entries = with_parent_dir(&label_by_directory(toc), split.subdirectory());
        let manifest_path = work_dir.join(split.manifest_name());
        manifest::write_manifest(&entries, &manifest_path).await?;

        let materialized = MaterializedSplit {
            split,
            data_dir,
            manifest_path,
            entries,
        };
        obs::emit_manifest_written(
            &artifact,
            &materialized.manifest_path,
            materialized.entries.len(),
            materialized.class_count(),
        );
        Ok(materialized)
    }

    /// Copy the mirrored specification into `work_dir`, keeping its filename.
    #[instrument(skip(self, solver, work_dir), fields(solver_id = %solver.id()))]
    pub async fn materialize_specification(&self, solver: &Solver, work_dir: &Path) -> Result<PathBuf> {
        let blob_path = specification_blob_path(solver)?;
        let filename = blob_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PipelineError::SpecificationNotMirrored {
                solver_id: solver.id().to_string(),
                url: solver.specification_url.clone(),
            })?;

        let mut reader = self.blobs.get(blob_path).await?;
        let dest = work_dir.join(filename);
        let io_err = |source| PipelineError::Io {
            path: dest.clone(),
            source,
        };

        let file = tokio::fs::File::create(&dest).await.map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(io_err)?;
        writer.flush().await.map_err(io_err)?;

        obs::emit_spec_materialized(solver.id(), &dest);
        Ok(dest)
    }

    /// Load solver `solver_id` and lay out its specification, data and
    /// manifests under `work_dir`.
    pub async fn prepare_workspace(&self, solver_id: &str, work_dir: &Path) -> Result<PreparedWorkspace> {
        let solver = self.load_solver(solver_id).await?;
        let specification = self.materialize_specification(&solver, work_dir).await?;
        let (training, test) = self.materialize_train_test_data(&solver, work_dir).await?;
        Ok(PreparedWorkspace {
            specification,
            training,
            test,
        })
    }

    async fn download(&self, url: &str) -> Result<BlobReader> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| PipelineError::Download {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::DownloadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}
