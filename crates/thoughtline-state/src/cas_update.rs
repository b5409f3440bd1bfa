//! Compare-and-swap updates of versioned documents
//!
//! Several workers may race to move the same document toward a target
//! state. [`cas_update`] applies a mutation and saves it at the document's
//! revision; on a revision conflict it reloads the document and either
//! stops (someone else already got there) or re-applies and tries again.
//!
//! Conflict retries are unbounded. Termination relies on `is_done` being
//! monotonic: once it holds for a document it holds for every later revision.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::document::{ClassifyJob, Document, ProcessingState, Solver, TrainingJob};
use crate::storage_traits::{edit_document, refresh_document, DocumentStore, StorageResult};

/// What a [`cas_update`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// This call wrote the document.
    Updated,
    /// The target state already held (before the call or after a refresh);
    /// nothing was written by this call.
    AlreadyDone,
}

impl UpdateOutcome {
    pub fn updated(self) -> bool {
        self == UpdateOutcome::Updated
    }
}

/// Drive `doc` to the state described by `is_done` using `apply`.
///
/// 1. If `is_done(doc)` already holds, return `AlreadyDone` without writing.
/// 2. `apply(doc)` and save at the current revision.
/// 3. On success return `Updated`.
/// 4. On a revision conflict, reload `doc`; if `is_done` now holds return
///    `AlreadyDone`, otherwise go back to 2.
/// 5. Any other error is returned immediately.
pub async fn cas_update<D, P, A>(
    store: &dyn DocumentStore,
    doc: &mut D,
    is_done: P,
    mut apply: A,
) -> StorageResult<UpdateOutcome>
where
    D: Document,
    P: Fn(&D) -> bool + Send + Sync,
    A: FnMut(&mut D) + Send,
{
    if is_done(&*doc) {
        debug!(id = %doc.id(), doc_type = D::DOC_TYPE, "no update needed");
        return Ok(UpdateOutcome::AlreadyDone);
    }

    let mut conflicts = 0u64;
    loop {
        apply(&mut *doc);

        match edit_document(store, doc).await {
            Ok(()) => {
                info!(
                    event = "document.updated",
                    id = %doc.id(),
                    doc_type = D::DOC_TYPE,
                    revision = %doc.revision(),
                    conflicts = conflicts,
                );
                return Ok(UpdateOutcome::Updated);
            }
            Err(err) if err.is_conflict() => {
                conflicts += 1;
                debug!(id = %doc.id(), conflicts, "revision conflict, refreshing");
                refresh_document(store, doc).await?;
                if is_done(&*doc) {
                    debug!(id = %doc.id(), "target state reached by another writer");
                    return Ok(UpdateOutcome::AlreadyDone);
                }
            }
            Err(err) => {
                warn!(id = %doc.id(), error = %err, "update failed");
                return Err(err);
            }
        }
    }
}

impl TrainingJob {
    /// Move the job forward to `state`. A job already at or past `state`
    /// is left alone.
    pub async fn update_processing_state(
        &mut self,
        store: &dyn DocumentStore,
        state: ProcessingState,
    ) -> StorageResult<UpdateOutcome> {
        cas_update(
            store,
            self,
            move |job: &TrainingJob| job.processing_state.has_reached(state),
            move |job: &mut TrainingJob| {
                job.processing_state = state;
                job.updated_at = Some(Utc::now());
            },
        )
        .await
    }

    /// Mark the job failed and record why.
    pub async fn fail(
        &mut self,
        store: &dyn DocumentStore,
        reason: &str,
    ) -> StorageResult<UpdateOutcome> {
        let reason = reason.to_string();
        cas_update(
            store,
            self,
            |job: &TrainingJob| job.processing_state.is_terminal(),
            move |job: &mut TrainingJob| {
                job.processing_state = ProcessingState::Failed;
                job.processing_log = reason.clone();
                job.updated_at = Some(Utc::now());
            },
        )
        .await
    }
}

impl ClassifyJob {
    pub async fn update_processing_state(
        &mut self,
        store: &dyn DocumentStore,
        state: ProcessingState,
    ) -> StorageResult<UpdateOutcome> {
        cas_update(
            store,
            self,
            move |job: &ClassifyJob| job.processing_state.has_reached(state),
            move |job: &mut ClassifyJob| job.processing_state = state,
        )
        .await
    }
}

impl Solver {
    /// Point the solver at `url`. Done as soon as the stored URL equals it.
    pub async fn set_specification_url(
        &mut self,
        store: &dyn DocumentStore,
        url: &str,
    ) -> StorageResult<UpdateOutcome> {
        let url = url.to_string();
        let target = url.clone();
        cas_update(
            store,
            self,
            move |solver: &Solver| solver.specification_url == target,
            move |solver: &mut Solver| solver.specification_url = url.clone(),
        )
        .await
    }
}
