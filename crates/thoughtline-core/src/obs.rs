//! Structured observability hooks for Thoughtline pipeline events.
//!
//! Each function emits one event with a stable `event` field so log
//! pipelines can filter on it:
//! - `probe.attempt_failed` / `probe.passed` / `probe.exhausted`
//! - `spec.mirrored` / `spec.materialized`
//! - `manifest.written`
//!
//! For JSON output, start the binary with `--json` (see [`crate::telemetry`]).

use std::path::Path;

use tracing::{info, warn};

/// Emit event: one blob-store round trip failed; the probe will retry.
pub fn emit_probe_attempt_failed(attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "probe.attempt_failed", attempt = attempt, error = %error);
}

/// Emit event: blob-store probe succeeded after `attempts` round trips.
pub fn emit_probe_passed(attempts: u32) {
    info!(event = "probe.passed", attempts = attempts);
}

/// Emit event: blob-store probe gave up.
pub fn emit_probe_exhausted(attempts: u32, error: &dyn std::fmt::Display) {
    warn!(event = "probe.exhausted", attempts = attempts, error = %error);
}

/// Emit event: solver specification copied from `source` into the blob store.
pub fn emit_spec_mirrored(solver_id: &str, source: &str, blob_path: &str) {
    info!(
        event = "spec.mirrored",
        solver_id = %solver_id,
        source = %source,
        blob_path = %blob_path,
    );
}

/// Emit event: solver specification written to the working directory.
pub fn emit_spec_materialized(solver_id: &str, dest: &Path) {
    info!(event = "spec.materialized", solver_id = %solver_id, dest = %dest.display());
}

/// Emit event: a labeled manifest was written.
pub fn emit_manifest_written(artifact: &str, dest: &Path, entries: usize, classes: usize) {
    info!(
        event = "manifest.written",
        artifact = %artifact,
        dest = %dest.display(),
        entries = entries,
        classes = classes,
    );
}
