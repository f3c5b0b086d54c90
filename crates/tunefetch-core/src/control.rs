//! Job control for stop/cancel: shared abort tokens keyed by item id.
//!
//! Each running job is registered with an abort token. A stop request (from
//! the controller, a batch stop, or the control socket) sets the token; the
//! gate wait and the process supervisor observe it and unwind the job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

use crate::model::ItemId;

#[derive(Default)]
struct AbortInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation signal. Cheap to clone; all clones share one flag.
#[derive(Clone, Default)]
pub struct AbortToken {
    inner: Arc<AbortInner>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.inner.flag.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Resolves once `abort()` has been called (immediately if it already was).
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for AbortToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortToken")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Shared registry of item id -> abort token for jobs that currently exist.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<ItemId, AbortToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job; returns the abort token to pass to the pipeline.
    /// Replaces any stale token left for the same id.
    pub fn register(&self, item_id: &str) -> AbortToken {
        let token = AbortToken::new();
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item_id.to_string(), token.clone());
        token
    }

    /// Unregister a job (call when it settles, whatever the outcome).
    /// A newer token registered for the same id is left in place.
    pub fn unregister(&self, item_id: &str, token: &AbortToken) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs
            .get(item_id)
            .map(|t| Arc::ptr_eq(&t.inner, &token.inner))
            .unwrap_or(false)
        {
            jobs.remove(item_id);
        }
    }

    /// Request abort for one job. Returns false if no job is registered for the id.
    pub fn request_abort(&self, item_id: &str) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(item_id)
        {
            Some(token) => {
                token.abort();
                true
            }
            None => false,
        }
    }

    /// Request abort for every registered job; returns how many were signalled.
    pub fn request_abort_all(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        for token in jobs.values() {
            token.abort();
        }
        jobs.len()
    }

    pub fn is_registered(&self, item_id: &str) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(item_id)
    }
}

/// Default path for the control socket (same XDG state dir as the cache).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("tunefetch")?.get_state_home();
    Ok(dir.join("control.sock"))
}
