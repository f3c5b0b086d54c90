//! Admission gate bounding how many jobs download at once.
//!
//! Jobs wait at the gate in memory (nothing is persisted for them) and hold a
//! permit for the whole pipeline; dropping the permit frees the slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::control::AbortToken;

#[derive(Debug, Default)]
struct Counters {
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting admission control shared by every job task.
#[derive(Debug)]
pub struct ConcurrencyGate {
    max: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

/// Releases the admitted slot when dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.counters.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max` jobs (at least one).
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            semaphore: Arc::new(Semaphore::new(max)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Number of jobs currently admitted.
    pub fn in_use(&self) -> usize {
        self.counters.in_use.load(Ordering::Acquire)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Highest number of simultaneously admitted jobs seen so far.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    /// Waits for a free slot. Returns None if `abort` fires first, so a queued
    /// job can be stopped before it ever starts.
    pub async fn admit(&self, abort: &AbortToken) -> Option<GatePermit> {
        if abort.is_aborted() {
            return None;
        }
        let permit = tokio::select! {
            biased;
            _ = abort.aborted() => return None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok()?,
        };
        Some(self.track(permit))
    }

    /// Takes a slot only if one is free.
    pub fn try_admit(&self) -> Option<GatePermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.track(permit))
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let now = self.counters.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(now, Ordering::AcqRel);
        GatePermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }
}
