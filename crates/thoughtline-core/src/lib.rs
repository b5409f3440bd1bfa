//! Thoughtline Core Library
//!
//! Worker-side building blocks for the training pipeline: blob store
//! clients, the startup health probe, dataset archive extraction, manifest
//! labeling and the solver artifact pipeline that ties them together.

pub mod archive;
pub mod blob;
pub mod config;
pub mod environment;
pub mod manifest;
pub mod obs;
pub mod pipeline;
pub mod telemetry;

pub use archive::{extract_tar_gz, unpack_tar_gz, ArchiveError};
pub use blob::cbfs::CbfsBlobStore;
pub use blob::fs::FsBlobStore;
pub use blob::memory::MemoryBlobStore;
pub use blob::{blob_path_from_uri, blob_uri, BlobError, BlobReader, BlobStore, BLOB_URI_PREFIX};
pub use config::BlobStoreConfig;
pub use environment::{
    environment_sanity_check, probe_blob_store, round_trip, ProbeError, ProbePolicy,
};
pub use manifest::{
    label_by_directory, parse_manifest, read_manifest, render_manifest, with_parent_dir,
    write_manifest, ManifestEntry, ManifestError,
};
pub use obs::{
    emit_manifest_written, emit_probe_attempt_failed, emit_probe_exhausted, emit_probe_passed,
    emit_spec_materialized, emit_spec_mirrored,
};
pub use pipeline::{
    specification_blob_path, specification_path, DataSplit, MaterializedSplit, PipelineError,
    PreparedWorkspace, SolverArtifacts,
};
pub use telemetry::init_tracing;

pub use thoughtline_state::{
    Classifier, ClassifyJob, Dataset, DocumentStore, ProcessingState, Solver, StorageError,
    TrainingJob,
};
