//! Thoughtline-State: Versioned Document Persistence
//!
//! This crate provides the persistence layer for training-pipeline metadata.
//! Solvers, datasets, jobs and classifiers live in a replicated document
//! store that enforces single-writer-wins on revision tokens.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: revision-checked writes and safe convergence under racing workers.
//!
//! ## Key Components
//!
//! - `DocumentStore`: backend-agnostic store contract (insert / edit / retrieve)
//! - `SyncGatewayStore`: CouchDB-style HTTP backend
//! - `cas_update`: refresh-and-retry protocol for revision conflicts
//! - `Solver`, `Dataset`, `TrainingJob`, ...: document schemas

pub mod cas_update;
pub mod document;
mod error;
pub mod fakes;
pub mod storage_traits;
mod sync_gateway;

pub use cas_update::{cas_update, UpdateOutcome};
pub use document::{
    testing_artifact_path, training_artifact_path, Classifier, ClassifyJob, Dataset, DatasetSplit,
    DocMeta, Document, ProcessingState, Solver, TrainingJob,
};
pub use error::StorageError;
pub use storage_traits::{
    edit_document, insert_document, refresh_document, retrieve_document, DocRef, DocumentStore,
    StorageResult,
};
pub use sync_gateway::{GatewayConfig, SyncGatewayStore};
