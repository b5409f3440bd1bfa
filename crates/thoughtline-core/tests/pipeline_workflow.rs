//! Solver artifact pipeline against in-memory document and blob stores.

mod common;

use std::sync::Arc;

use common::{loopback_client, serve_once, tar_gz};
use thoughtline_core::blob::memory::MemoryBlobStore;
use thoughtline_core::blob::BlobError;
use thoughtline_core::manifest::{read_manifest, ManifestEntry};
use thoughtline_core::pipeline::{specification_path, DataSplit, PipelineError, SolverArtifacts};
use thoughtline_state::fakes::MemoryDocumentStore;
use thoughtline_state::{insert_document, retrieve_document, Document, Solver};

const SPEC_TEXT: &str = "net: \"train_val.prototxt\"\nbase_lr: 0.01\n";

struct Fixture {
    docs: Arc<MemoryDocumentStore>,
    blobs: Arc<MemoryBlobStore>,
    artifacts: SolverArtifacts,
}

fn fixture() -> Fixture {
    let docs = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let artifacts = SolverArtifacts::new(docs.clone(), blobs.clone())
        .unwrap()
        .with_http_client(loopback_client());
    Fixture {
        docs,
        blobs,
        artifacts,
    }
}

fn seed_dataset(blobs: &MemoryBlobStore, dataset_id: &str) {
    blobs.insert(
        &DataSplit::Training.artifact_path(dataset_id),
        "application/gzip",
        tar_gz(&[
            ("Q/a.png", &b"qa"[..]),
            ("Q/b.png", &b"qb"[..]),
            ("R/c.png", &b"rc"[..]),
        ]),
    );
    blobs.insert(
        &DataSplit::Test.artifact_path(dataset_id),
        "application/gzip",
        tar_gz(&[("Q/d.png", &b"qd"[..]), ("R/e.png", &b"re"[..])]),
    );
}

#[tokio::test]
async fn prepare_workspace_lays_out_spec_data_and_manifests() {
    let fx = fixture();
    seed_dataset(&fx.blobs, "ds-1");
    fx.blobs
        .insert("fixtures/solver.prototxt", "text/plain", SPEC_TEXT);
    let solver = insert_document(
        &*fx.docs,
        &Solver::new("ds-1", "cbfs://fixtures/solver.prototxt"),
    )
    .await
    .unwrap();
    let work = tempfile::tempdir().unwrap();

    let prepared = fx
        .artifacts
        .prepare_workspace(solver.id(), work.path())
        .await
        .unwrap();

    assert_eq!(prepared.specification, work.path().join("solver.prototxt"));
    assert_eq!(
        std::fs::read_to_string(&prepared.specification).unwrap(),
        SPEC_TEXT
    );

    assert_eq!(
        std::fs::read(work.path().join("training-data/Q/a.png")).unwrap(),
        b"qa"
    );
    assert!(work.path().join("test-data/R/e.png").exists());

    let training = read_manifest(&work.path().join("training")).await.unwrap();
    assert_eq!(
        training,
        vec![
            ManifestEntry::new("training-data/Q/a.png", 0),
            ManifestEntry::new("training-data/Q/b.png", 0),
            ManifestEntry::new("training-data/R/c.png", 1),
        ]
    );
    assert_eq!(prepared.training.entries, training);
    assert_eq!(prepared.training.class_count(), 2);

    let test = std::fs::read_to_string(work.path().join("test")).unwrap();
    assert_eq!(test, "test-data/Q/d.png 0\ntest-data/R/e.png 1\n");
}

#[tokio::test]
async fn labels_follow_adjacency_not_directory_identity() {
    let fx = fixture();
    fx.blobs.insert(
        &DataSplit::Training.artifact_path("ds-adj"),
        "application/gzip",
        tar_gz(&[
            ("Q/a.png", &b"1"[..]),
            ("R/b.png", &b"2"[..]),
            ("Q/c.png", &b"3"[..]),
        ]),
    );
    let work = tempfile::tempdir().unwrap();

    let split = fx
        .artifacts
        .materialize_split("ds-adj", DataSplit::Training, work.path())
        .await
        .unwrap();

    let labels: Vec<u32> = split.entries.iter().map(|e| e.label).collect();
    assert_eq!(labels, vec![0, 1, 2]);
}

#[tokio::test]
async fn materialize_specification_requires_mirrored_url() {
    let fx = fixture();
    let solver = insert_document(
        &*fx.docs,
        &Solver::new("ds-1", "http://example.com/solver.prototxt"),
    )
    .await
    .unwrap();
    let work = tempfile::tempdir().unwrap();

    let err = fx
        .artifacts
        .materialize_specification(&solver, work.path())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SpecificationNotMirrored { .. }));
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_archive_is_reported_as_blob_not_found() {
    let fx = fixture();
    let solver = Solver::new("ds-missing", "cbfs://fixtures/solver.prototxt");
    let work = tempfile::tempdir().unwrap();

    let err = fx
        .artifacts
        .materialize_train_test_data(&solver, work.path())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Blob(BlobError::NotFound { .. })
    ));
}

fn count_files(dir: &std::path::Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().path())
            .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
            .sum(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn failing_leg_waits_for_the_other_extraction_to_finish() {
    let fx = fixture();
    let names: Vec<String> = (0..400).map(|i| format!("Q/f{i:04}.png")).collect();
    let payload = vec![0x5au8; 16 * 1024];
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &payload[..])).collect();
    fx.blobs.insert(
        &DataSplit::Training.artifact_path("ds-half"),
        "application/gzip",
        tar_gz(&files),
    );
    // No test archive: that leg fails immediately.
    let solver = Solver::new("ds-half", "cbfs://fixtures/solver.prototxt");
    let work = tempfile::tempdir().unwrap();

    let err = fx
        .artifacts
        .materialize_train_test_data(&solver, work.path())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Blob(BlobError::NotFound { .. })
    ));
    let training_dir = work.path().join("training-data");
    let at_return = count_files(&training_dir);
    assert_eq!(at_return, 400);
    assert!(work.path().join("training").exists());

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(count_files(&training_dir), at_return);
}

#[tokio::test]
async fn solver_without_dataset_is_rejected() {
    let fx = fixture();
    let solver = Solver::new("", "cbfs://fixtures/solver.prototxt");
    let work = tempfile::tempdir().unwrap();

    let err = fx
        .artifacts
        .materialize_train_test_data(&solver, work.path())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::MissingDataset { .. }));
}

#[tokio::test]
async fn corrupt_archive_is_reported_with_artifact_path() {
    let fx = fixture();
    fx.blobs.insert(
        &DataSplit::Test.artifact_path("ds-bad"),
        "application/gzip",
        &b"definitely not gzip"[..],
    );
    let work = tempfile::tempdir().unwrap();

    let err = fx
        .artifacts
        .materialize_split("ds-bad", DataSplit::Test, work.path())
        .await
        .unwrap_err();

    match err {
        PipelineError::Archive { artifact, .. } => assert_eq!(artifact, "ds-bad/testing.tar.gz"),
        other => panic!("expected Archive error, got {other:?}"),
    }
}

#[tokio::test]
async fn mirror_specification_copies_download_and_repoints_solver() {
    let fx = fixture();
    let url = serve_once(200, SPEC_TEXT).await;
    let solver = insert_document(&*fx.docs, &Solver::new("ds-1", url.as_str()))
        .await
        .unwrap();

    let mirrored = fx.artifacts.mirror_specification(&solver).await.unwrap();

    let blob_path = specification_path(solver.id());
    assert_eq!(mirrored.specification_url, format!("cbfs://{blob_path}"));
    assert_eq!(fx.blobs.bytes(&blob_path).unwrap(), SPEC_TEXT.as_bytes());
    assert_eq!(fx.blobs.content_type(&blob_path).as_deref(), Some("text/plain"));

    let stored: Solver = retrieve_document(&*fx.docs, solver.id()).await.unwrap();
    assert_eq!(stored.specification_url, mirrored.specification_url);
    assert_eq!(stored.dataset_id, "ds-1");
}

#[tokio::test]
async fn mirror_specification_skips_already_mirrored_solver() {
    let fx = fixture();
    let solver = insert_document(
        &*fx.docs,
        &Solver::new("ds-1", "cbfs://abc/spec.prototxt"),
    )
    .await
    .unwrap();

    let mirrored = fx.artifacts.mirror_specification(&solver).await.unwrap();

    assert_eq!(mirrored, solver);
    assert_eq!(fx.docs.edit_count(), 0);
    assert!(fx.blobs.is_empty());
}

#[tokio::test]
async fn failed_download_leaves_solver_untouched() {
    let fx = fixture();
    let url = serve_once(404, "").await;
    let solver = insert_document(&*fx.docs, &Solver::new("ds-1", url.as_str()))
        .await
        .unwrap();

    let err = fx.artifacts.mirror_specification(&solver).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::DownloadStatus { status: 404, .. }
    ));
    assert_eq!(fx.docs.edit_count(), 0);
    assert!(fx.blobs.is_empty());
}

#[tokio::test]
async fn unsupported_specification_scheme_is_rejected() {
    let fx = fixture();
    let solver = Solver::new("ds-1", "ftp://example.com/solver.prototxt");

    let err = fx.artifacts.mirror_specification(&solver).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UnsupportedSpecificationUrl { .. }
    ));
}
