//! One job task: wait at the gate, run the pipeline, settle the item.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::control::AbortToken;
use crate::error::JobError;
use crate::model::{Item, ItemState};

use super::pipeline;
use super::Shared;

/// `claimed` is the output path reserved for this job in `launch`.
pub(super) async fn run_job(
    shared: Arc<Shared>,
    item: Item,
    entry: CacheEntry,
    abort: AbortToken,
    claimed: PathBuf,
) {
    let id = item.id.clone();

    let Some(permit) = shared.gate.admit(&abort).await else {
        tracing::info!(item_id = %id, "stopped while queued");
        settle(&shared, &entry, &claimed, Err(JobError::Cancelled), None);
        shared.control.unregister(&id, &abort);
        return;
    };

    shared
        .board
        .set(&id, ItemState::Downloading(entry.progress_percent));
    tracing::info!(item_id = %id, query = %entry.source_url_or_query, "downloading");

    let mut last_percent = None;
    let result = pipeline::run_pipeline(&shared, &item, &entry, &abort, |percent| {
        last_percent = Some(percent);
        shared.board.set(&id, ItemState::Downloading(percent));
        shared.cache.update_progress(&id, percent);
    })
    .await;

    // Settled state is published while the slot is still held.
    settle(&shared, &entry, &claimed, result, last_percent);
    drop(permit);
    shared.control.unregister(&id, &abort);
}

/// Maps the pipeline outcome onto the board and the cache.
fn settle(
    shared: &Shared,
    entry: &CacheEntry,
    claimed: &Path,
    result: Result<PathBuf, JobError>,
    last_percent: Option<f64>,
) {
    let id = entry.item_id.as_str();
    // Output is free by the time the settled state is visible.
    shared.claims.release(claimed, id);
    match result {
        Ok(path) => {
            shared.cache.clear(id);
            tracing::info!(item_id = id, "completed: {}", path.display());
            shared.board.set(id, ItemState::Completed);
        }
        Err(JobError::Cancelled) => {
            let percent = last_percent.unwrap_or(entry.progress_percent);
            if !shared.cache.update_progress(id, percent) {
                let mut entry = entry.clone();
                entry.progress_percent = percent;
                shared.cache.set(entry);
            }
            shared.cache.flush();
            tracing::info!(item_id = id, "stopped at {:.1}%", percent);
            shared.board.set(id, ItemState::Stopped(percent));
        }
        Err(e) => {
            shared.cache.flush();
            tracing::warn!(item_id = id, "failed: {}", e);
            shared.board.set(id, ItemState::Failed(e.to_string()));
        }
    }
}
