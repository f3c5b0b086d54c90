//! Registry of live child processes so any cancellation path can terminate them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::ItemId;

pub type ProcessId = u64;

/// One external process launched for a job.
#[derive(Debug)]
pub struct ProcessHandle {
    id: ProcessId,
    pub item_id: ItemId,
    pub exe: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub pid: Option<u32>,
    live: AtomicBool,
    kill_requested: AtomicBool,
}

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::Acquire)
    }

    /// Flags the process for termination and signals its process group.
    /// The supervisor reaps it on its next tick.
    pub fn kill(&self) {
        self.kill_requested.store(true, Ordering::Release);
        if self.is_live() {
            if let Some(pid) = self.pid {
                signal_process_group(pid);
            }
        }
    }

    pub(crate) fn mark_exited(&self) {
        self.live.store(false, Ordering::Release);
    }
}

#[cfg(unix)]
fn signal_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the process
    // group created for this child at spawn time.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!(pid, "kill process group: {}", err);
        }
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32) {}

/// Removes the process from the registry when dropped.
pub struct Registration<'a> {
    registry: &'a ProcessRegistry,
    handle: Arc<ProcessHandle>,
}

impl Registration<'_> {
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.handle.mark_exited();
        self.registry.remove(self.handle.id);
    }
}

/// Tracks every running child process, keyed by a registry-local id.
#[derive(Default)]
pub struct ProcessRegistry {
    next_id: AtomicU64,
    procs: Mutex<HashMap<ProcessId, Arc<ProcessHandle>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a just-spawned process; the returned guard deregisters it.
    pub fn add(
        &self,
        item_id: &str,
        exe: PathBuf,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        pid: Option<u32>,
    ) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = Arc::new(ProcessHandle {
            id,
            item_id: item_id.to_string(),
            exe,
            args,
            cwd,
            pid,
            live: AtomicBool::new(true),
            kill_requested: AtomicBool::new(false),
        });
        self.lock().insert(id, Arc::clone(&handle));
        Registration {
            registry: self,
            handle,
        }
    }

    pub fn remove(&self, id: ProcessId) -> Option<Arc<ProcessHandle>> {
        self.lock().remove(&id)
    }

    /// Kills every process registered for one item; returns how many were signalled.
    pub fn kill_job(&self, item_id: &str) -> usize {
        let targets: Vec<Arc<ProcessHandle>> = self
            .lock()
            .values()
            .filter(|h| h.item_id == item_id)
            .cloned()
            .collect();
        for h in &targets {
            tracing::debug!(item_id, exe = %h.exe.display(), "killing process");
            h.kill();
        }
        targets.len()
    }

    /// Kills every registered process; returns how many were signalled.
    pub fn kill_all(&self) -> usize {
        let targets: Vec<Arc<ProcessHandle>> = self.lock().values().cloned().collect();
        for h in &targets {
            h.kill();
        }
        targets.len()
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn live_for(&self, item_id: &str) -> usize {
        self.lock().values().filter(|h| h.item_id == item_id).count()
    }

    /// Copies of the current handles (diagnostics, tests).
    pub fn snapshot(&self) -> Vec<Arc<ProcessHandle>> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessId, Arc<ProcessHandle>>> {
        self.procs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
