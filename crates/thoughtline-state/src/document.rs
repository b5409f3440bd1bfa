//! Document definitions for the Thoughtline document store
//!
//! Every persisted record carries the store metadata (`_id`, `_rev`) and a
//! `type` discriminant:
//! - solver: a trainable model specification plus the dataset it trains on
//! - dataset: training/testing split of a datafile, archived in the blob store
//! - training-job: one training run of a solver
//! - classifier / classify-job: a trained model and its prediction requests

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DOC_TYPE_USER: &str = "user";
pub const DOC_TYPE_DATAFILE: &str = "datafile";
pub const DOC_TYPE_DATASET: &str = "dataset";
pub const DOC_TYPE_SOLVER: &str = "solver";
pub const DOC_TYPE_TRAINING_JOB: &str = "training-job";
pub const DOC_TYPE_CLASSIFIER: &str = "classifier";
pub const DOC_TYPE_CLASSIFY_JOB: &str = "classify-job";

/// Store metadata embedded (flattened) into every document.
///
/// `id` and `revision` are empty until the store assigns them on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

impl DocMeta {
    pub fn new(doc_type: &str) -> Self {
        Self {
            id: String::new(),
            revision: String::new(),
            doc_type: doc_type.to_string(),
        }
    }
}

/// Capability set shared by all versioned documents: a revision token,
/// in-place field mutation, and a fixed type tag.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Value of the `type` field for this document kind.
    const DOC_TYPE: &'static str;

    fn meta(&self) -> &DocMeta;

    fn meta_mut(&mut self) -> &mut DocMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn revision(&self) -> &str {
        &self.meta().revision
    }
}

macro_rules! impl_document {
    ($ty:ty, $tag:expr) => {
        impl Document for $ty {
            const DOC_TYPE: &'static str = $tag;

            fn meta(&self) -> &DocMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut DocMeta {
                &mut self.meta
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// A solver can generate trained models, which can be used to make predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solver {
    #[serde(flatten)]
    pub meta: DocMeta,
    #[serde(rename = "dataset-id", default)]
    pub dataset_id: String,
    /// Either an external http(s) URL or, once mirrored, a `cbfs://` path
    #[serde(rename = "specification-url", default)]
    pub specification_url: String,
}

impl Solver {
    pub fn new(dataset_id: impl Into<String>, specification_url: impl Into<String>) -> Self {
        Self {
            meta: DocMeta::new(DOC_TYPE_SOLVER),
            dataset_id: dataset_id.into(),
            specification_url: specification_url.into(),
        }
    }
}

impl_document!(Solver, DOC_TYPE_SOLVER);

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Blob-store path of a dataset's training archive: `<dataset-id>/training.tar.gz`.
pub fn training_artifact_path(dataset_id: &str) -> String {
    format!("{dataset_id}/training.tar.gz")
}

/// Blob-store path of a dataset's testing archive: `<dataset-id>/testing.tar.gz`.
pub fn testing_artifact_path(dataset_id: &str) -> String {
    format!("{dataset_id}/testing.tar.gz")
}

/// One side of a dataset split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    #[serde(rename = "split-percentage", default)]
    pub split_percentage: f64,
}

/// A datafile split into training and testing archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(flatten)]
    pub meta: DocMeta,
    #[serde(rename = "datafile-id", default)]
    pub datafile_id: String,
    #[serde(default)]
    pub training: DatasetSplit,
    #[serde(default)]
    pub testing: DatasetSplit,
}

impl Dataset {
    pub fn new(datafile_id: impl Into<String>, training_pct: f64, testing_pct: f64) -> Self {
        Self {
            meta: DocMeta::new(DOC_TYPE_DATASET),
            datafile_id: datafile_id.into(),
            training: DatasetSplit {
                split_percentage: training_pct,
            },
            testing: DatasetSplit {
                split_percentage: testing_pct,
            },
        }
    }

    pub fn training_artifact_path(&self) -> String {
        training_artifact_path(&self.meta.id)
    }

    pub fn testing_artifact_path(&self) -> String {
        testing_artifact_path(&self.meta.id)
    }
}

impl_document!(Dataset, DOC_TYPE_DATASET);

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Processing state of a job document.
///
/// States only move forward; `rank` orders them so "has the job reached X"
/// is a monotonic predicate. Both terminal states share the top rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingState {
    #[default]
    Pending,
    Processing,
    FinishedSuccessfully,
    Failed,
}

impl ProcessingState {
    pub fn rank(self) -> u8 {
        match self {
            ProcessingState::Pending => 0,
            ProcessingState::Processing => 1,
            ProcessingState::FinishedSuccessfully | ProcessingState::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// True once this state is at or past `target`.
    pub fn has_reached(self, target: ProcessingState) -> bool {
        self == target || self.rank() > target.rank() || (self.is_terminal() && target.is_terminal())
    }
}

/// A single training run of a solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    #[serde(flatten)]
    pub meta: DocMeta,
    #[serde(rename = "solver-id", default)]
    pub solver_id: String,
    #[serde(rename = "processing-state", default)]
    pub processing_state: ProcessingState,
    #[serde(rename = "processing-log", default, skip_serializing_if = "String::is_empty")]
    pub processing_log: String,
    #[serde(rename = "updated-at", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TrainingJob {
    pub fn new(solver_id: impl Into<String>) -> Self {
        Self {
            meta: DocMeta::new(DOC_TYPE_TRAINING_JOB),
            solver_id: solver_id.into(),
            processing_state: ProcessingState::Pending,
            processing_log: String::new(),
            updated_at: None,
        }
    }
}

impl_document!(TrainingJob, DOC_TYPE_TRAINING_JOB);

/// A trained model produced by a training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    #[serde(flatten)]
    pub meta: DocMeta,
    #[serde(rename = "training-job-id", default)]
    pub training_job_id: String,
    #[serde(rename = "specification-url", default)]
    pub specification_url: String,
}

impl Classifier {
    pub fn new(training_job_id: impl Into<String>, specification_url: impl Into<String>) -> Self {
        Self {
            meta: DocMeta::new(DOC_TYPE_CLASSIFIER),
            training_job_id: training_job_id.into(),
            specification_url: specification_url.into(),
        }
    }
}

impl_document!(Classifier, DOC_TYPE_CLASSIFIER);

/// A batch prediction request against a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyJob {
    #[serde(flatten)]
    pub meta: DocMeta,
    #[serde(rename = "classifier-id", default)]
    pub classifier_id: String,
    #[serde(rename = "processing-state", default)]
    pub processing_state: ProcessingState,
    /// Image URL -> predicted label
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, String>,
}

impl ClassifyJob {
    pub fn new(classifier_id: impl Into<String>) -> Self {
        Self {
            meta: DocMeta::new(DOC_TYPE_CLASSIFY_JOB),
            classifier_id: classifier_id.into(),
            processing_state: ProcessingState::Pending,
            results: BTreeMap::new(),
        }
    }
}

impl_document!(ClassifyJob, DOC_TYPE_CLASSIFY_JOB);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_serializes_with_store_field_names() {
        let mut solver = Solver::new("dataset-1", "http://example.com/spec.prototxt");
        solver.meta.id = "solver-1".into();
        solver.meta.revision = "2-abc".into();

        let value = serde_json::to_value(&solver).unwrap();
        assert_eq!(value["_id"], "solver-1");
        assert_eq!(value["_rev"], "2-abc");
        assert_eq!(value["type"], "solver");
        assert_eq!(value["dataset-id"], "dataset-1");
        assert_eq!(value["specification-url"], "http://example.com/spec.prototxt");
    }

    #[test]
    fn new_document_omits_unassigned_id_and_revision() {
        let value = serde_json::to_value(Solver::new("d", "s")).unwrap();
        assert!(value.get("_id").is_none());
        assert!(value.get("_rev").is_none());
    }

    #[test]
    fn dataset_artifact_paths_follow_naming_convention() {
        assert_eq!(training_artifact_path("ds-42"), "ds-42/training.tar.gz");
        assert_eq!(testing_artifact_path("ds-42"), "ds-42/testing.tar.gz");

        let mut dataset = Dataset::new("datafile-1", 0.8, 0.2);
        dataset.meta.id = "ds-42".into();
        assert_eq!(dataset.training_artifact_path(), "ds-42/training.tar.gz");
        assert_eq!(dataset.testing_artifact_path(), "ds-42/testing.tar.gz");
    }

    #[test]
    fn processing_state_uses_kebab_case() {
        let json = serde_json::to_string(&ProcessingState::FinishedSuccessfully).unwrap();
        assert_eq!(json, "\"finished-successfully\"");
    }

    #[test]
    fn processing_state_progress_is_monotonic() {
        use ProcessingState::*;
        assert!(Processing.has_reached(Pending));
        assert!(Processing.has_reached(Processing));
        assert!(!Processing.has_reached(FinishedSuccessfully));
        assert!(Failed.has_reached(FinishedSuccessfully));
        assert!(FinishedSuccessfully.has_reached(Failed));
        assert!(!Pending.has_reached(Processing));
    }

    #[test]
    fn training_job_round_trips_through_json() {
        let mut job = TrainingJob::new("solver-1");
        job.meta.id = "job-1".into();
        job.processing_state = ProcessingState::Processing;

        let json = serde_json::to_string(&job).unwrap();
        let back: TrainingJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
