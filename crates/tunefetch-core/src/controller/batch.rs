//! "Download all": admit every Idle/Stopped item and tally the outcomes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::model::ItemState;

use super::JobController;

/// Outcome counts of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: usize,
    /// Items that were not Idle/Stopped when the batch began (or refused to start).
    pub skipped: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.stopped + self.skipped
    }
}

#[derive(Default)]
struct BatchTally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicUsize,
    skipped: AtomicUsize,
}

impl BatchTally {
    fn record(&self, state: &ItemState) {
        let counter = match state {
            ItemState::Completed => &self.succeeded,
            ItemState::Failed(_) => &self.failed,
            _ => &self.stopped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

impl JobController {
    /// Starts every Idle item and resumes every Stopped one; the gate bounds
    /// how many run at once. Waits for all of them. One failure never aborts
    /// the rest; `stop_all` stops the whole batch.
    pub async fn download_all(&self) -> BatchSummary {
        let tally = Arc::new(BatchTally::default());
        let mut waits = tokio::task::JoinSet::new();

        for snap in self.items() {
            let id = snap.item.id;
            let launched = match snap.state {
                ItemState::Idle => self.start(&id),
                ItemState::Stopped(_) => self.resume(&id),
                _ => {
                    tally.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            if let Err(e) = launched {
                tracing::debug!(item_id = %id, "batch skipped item: {}", e);
                tally.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let controller = self.clone();
            let tally = Arc::clone(&tally);
            waits.spawn(async move {
                if let Ok(state) = controller.wait(&id).await {
                    tally.record(&state);
                }
            });
        }

        while let Some(res) = waits.join_next().await {
            if let Err(e) = res {
                tracing::warn!("batch waiter join: {}", e);
            }
        }
        let summary = tally.summary();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            stopped = summary.stopped,
            skipped = summary.skipped,
            "batch finished"
        );
        summary
    }
}
