//! Startup sanity checks for external services.
//!
//! The blob-store probe writes a uniquely named scratch object, reads it
//! back, compares the bytes and deletes it. Scratch names carry a fresh
//! UUID so probes running on several nodes of a cluster never collide.
//! A failing round trip is retried with linear backoff (attempt `i` sleeps
//! `i * backoff_step`); the first success ends the probe.

use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::blob::{reader_from_bytes, BlobError, BlobStore};
use crate::obs;

/// Round trips attempted before the probe gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Retry policy for [`probe_blob_store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub max_attempts: u32,
    /// Sleep after failed attempt `i` is `i * backoff_step`
    pub backoff_step: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("content read back from {path} did not match what was written")]
    ContentMismatch { path: String },

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("blob store probe exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ProbeError>,
    },
}

/// Write `content` to `path`, read it back, verify it and delete it.
///
/// Once the write succeeded the object is removed on every path; a failed
/// cleanup after a failed check is logged and the check's error returned.
pub async fn round_trip(store: &dyn BlobStore, path: &str, content: &str) -> Result<(), ProbeError> {
    store
        .put(path, "text/plain", reader_from_bytes(content))
        .await?;

    if let Err(err) = read_back_matches(store, path, content).await {
        if let Err(cleanup) = store.remove(path).await {
            debug!(path = %path, error = %cleanup, "could not remove scratch object");
        }
        return Err(err);
    }

    store.remove(path).await?;
    Ok(())
}

async fn read_back_matches(store: &dyn BlobStore, path: &str, content: &str) -> Result<(), ProbeError> {
    let mut reader = store.get(path).await?;
    let mut read_back = Vec::new();
    reader
        .read_to_end(&mut read_back)
        .await
        .map_err(|e| BlobError::io(path, e))?;

    if read_back != content.as_bytes() {
        return Err(ProbeError::ContentMismatch {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Probe blob-store read/write/delete correctness with bounded retries.
///
/// Returns the number of attempts it took.
pub async fn probe_blob_store(store: &dyn BlobStore, policy: ProbePolicy) -> Result<u32, ProbeError> {
    let probe_id = Uuid::new_v4();
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0u32;
    loop {
        let path = format!("env_check_{probe_id}_{attempt}");
        let content = format!("Hello {probe_id}_{attempt}");
        debug!(path = %path, attempt, "blob store round trip");

        match round_trip(store, &path, &content).await {
            Ok(()) => {
                obs::emit_probe_passed(attempt + 1);
                return Ok(attempt + 1);
            }
            Err(err) => {
                obs::emit_probe_attempt_failed(attempt, &err);
                if attempt + 1 >= max_attempts {
                    obs::emit_probe_exhausted(attempt + 1, &err);
                    return Err(ProbeError::Exhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                tokio::time::sleep(policy.backoff_step * attempt).await;
                attempt += 1;
            }
        }
    }
}

/// Run every environment check needed before the worker starts.
pub async fn environment_sanity_check(store: &dyn BlobStore, policy: ProbePolicy) -> Result<(), ProbeError> {
    probe_blob_store(store, policy).await?;
    info!("blob store sanity check passed");
    Ok(())
}
