//! Per-item state machine: admits jobs through the gate, drives the tool
//! pipeline, keeps the cache durable, and publishes every state change.
//!
//! Commands (`start`, `stop`, `resume`, `clear`) are checked against
//! `ItemState::actions()` and rejected with `ControlError` when the current
//! state does not offer them. They return immediately; the job task settles
//! the item into `Completed`, `Stopped` or `Failed` later.

mod batch;
mod board;
mod claims;
mod job;
mod pipeline;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::{CacheEntry, CacheStore};
use crate::config::TunefetchConfig;
use crate::control::JobControl;
use crate::error::ControlError;
use crate::files;
use crate::gate::ConcurrencyGate;
use crate::model::{Actions, Item, ItemEvent, ItemState};
use crate::process::ProcessRegistry;
use crate::tools::{self, ToolSet};

pub use batch::BatchSummary;
pub use board::ItemSnapshot;

use board::Board;
use claims::OutputClaims;

struct Shared {
    cfg: TunefetchConfig,
    tools: ToolSet,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    cache: Arc<CacheStore>,
    registry: Arc<ProcessRegistry>,
    control: JobControl,
    gate: ConcurrencyGate,
    board: Board,
    claims: OutputClaims,
}

impl Shared {
    fn output_path_for(&self, item: &Item) -> PathBuf {
        let ext = tools::output_extension(&self.cfg, item.format);
        files::output_path(&self.output_dir, &item.title, &item.artist, ext)
    }

    /// Drops the cache entry of an item whose output already exists, along
    /// with its fetched temp files. Returns how many files were removed.
    fn discard_finished(&self, id: &str) -> usize {
        let Some(entry) = self.cache.clear(id) else {
            return 0;
        };
        let removed = files::remove_temp_files(&entry.temp_file_pattern);
        tracing::debug!(item_id = id, removed, "output already present; dropped cache entry");
        removed
    }

    /// Cache entry for a fresh job: new temp prefix, query derived from the item.
    fn new_entry(&self, item: &Item) -> CacheEntry {
        CacheEntry {
            item_id: item.id.clone(),
            title: item.title.clone(),
            artist: item.artist.clone(),
            source_url_or_query: tools::source_query(item, &self.cfg),
            temp_file_pattern: files::new_temp_pattern(&self.temp_dir),
            output_path: self.output_path_for(item),
            progress_percent: 0.0,
            timestamp: 0,
            source: item.source,
            format: item.format,
        }
    }
}

/// Owns the items of one session. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct JobController {
    shared: Arc<Shared>,
}

impl JobController {
    /// Builds a controller and the receiving end of its event channel.
    ///
    /// The registry is injected so the caller can kill processes directly
    /// (e.g. from a signal handler) without going through the controller.
    pub fn new(
        cfg: TunefetchConfig,
        tools: ToolSet,
        cache: Arc<CacheStore>,
        registry: Arc<ProcessRegistry>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ItemEvent>)> {
        let output_dir = cfg.resolved_output_dir()?;
        let temp_dir = cfg.resolved_temp_dir()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = ConcurrencyGate::new(cfg.max_concurrent_jobs);
        tracing::debug!(
            output_dir = %output_dir.display(),
            temp_dir = %temp_dir.display(),
            max_concurrent = gate.capacity(),
            "job controller ready"
        );
        let shared = Shared {
            cfg,
            tools,
            output_dir,
            temp_dir,
            cache,
            registry,
            control: JobControl::new(),
            gate,
            board: Board::new(tx),
            claims: OutputClaims::default(),
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            rx,
        ))
    }

    pub fn config(&self) -> &TunefetchConfig {
        &self.shared.cfg
    }

    pub fn cache(&self) -> &CacheStore {
        &self.shared.cache
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.shared.registry
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.shared.gate
    }

    /// Final output path the item would be written to.
    pub fn output_path(&self, item: &Item) -> PathBuf {
        self.shared.output_path_for(item)
    }

    /// Places an item on the board: `Completed` if its output exists,
    /// `Stopped` at the cached percent if a resumable entry exists, else `Idle`.
    pub fn register(&self, item: Item) -> ItemState {
        let shared = &self.shared;
        let id = item.id.clone();
        let state = shared.board.insert(item, |item| {
            if shared.output_path_for(item).exists() {
                ItemState::Completed
            } else if let Some(entry) = shared.cache.get(&item.id) {
                ItemState::Stopped(entry.progress_percent)
            } else {
                ItemState::Idle
            }
        });
        if state == ItemState::Completed {
            shared.discard_finished(&id);
        }
        state
    }

    pub fn item(&self, id: &str) -> Option<ItemSnapshot> {
        self.shared.board.get(id)
    }

    /// All registered items in registration order.
    pub fn items(&self) -> Vec<ItemSnapshot> {
        self.shared.board.all()
    }

    /// Idle or Failed → Queued (or straight to Completed if the output exists).
    /// A failed item retries with its cached entry.
    pub fn start(&self, id: &str) -> Result<ItemState, ControlError> {
        self.launch(id, "start", |a| a.start)
    }

    /// Stopped → Queued, reusing the cached temp prefix and fetch query.
    pub fn resume(&self, id: &str) -> Result<ItemState, ControlError> {
        self.launch(id, "resume", |a| a.resume)
    }

    fn launch(
        &self,
        id: &str,
        action: &'static str,
        allowed: fn(&Actions) -> bool,
    ) -> Result<ItemState, ControlError> {
        let shared = &self.shared;
        let snap = shared
            .board
            .get(id)
            .ok_or_else(|| ControlError::UnknownItem(id.to_string()))?;
        let claimed = match shared.cache.get(id) {
            Some(entry) => entry.output_path,
            None => shared.output_path_for(&snap.item),
        };
        let fresh = shared
            .claims
            .claim(&claimed, id)
            .map_err(|holder| ControlError::OutputBusy {
                id: id.to_string(),
                holder,
                path: claimed.clone(),
            })?;

        let mut already_done = false;
        let transitioned = shared.board.transition(id, action, allowed, |item, _| {
            already_done = shared.output_path_for(item).exists();
            if already_done {
                ItemState::Completed
            } else {
                ItemState::Queued
            }
        });
        let (item, previous) = match transitioned {
            Ok(t) => t,
            Err(e) => {
                if fresh {
                    shared.claims.release(&claimed, id);
                }
                return Err(e);
            }
        };

        if already_done {
            shared.claims.release(&claimed, id);
            shared.discard_finished(id);
            tracing::info!(item_id = id, "already downloaded");
            return Ok(ItemState::Completed);
        }

        let entry = match shared.cache.get(id) {
            Some(entry) => entry,
            None => {
                let entry = shared.new_entry(&item);
                shared.cache.set(entry.clone());
                entry
            }
        };
        let abort = shared.control.register(id);
        tracing::info!(
            item_id = id,
            from = previous.name(),
            temp = %entry.temp_file_pattern.display(),
            "queued"
        );
        tokio::spawn(job::run_job(Arc::clone(shared), item, entry, abort, claimed));
        Ok(ItemState::Queued)
    }

    /// Queued/Downloading → Stopped. Kills the job's processes; the job task
    /// persists the progress reached and publishes `Stopped`.
    pub fn stop(&self, id: &str) -> Result<(), ControlError> {
        let shared = &self.shared;
        let state = shared
            .board
            .state(id)
            .ok_or_else(|| ControlError::UnknownItem(id.to_string()))?;
        if !state.actions().stop {
            return Err(ControlError::InvalidTransition {
                id: id.to_string(),
                action: "stop",
                state: state.name(),
            });
        }
        shared.control.request_abort(id);
        let killed = shared.registry.kill_job(id);
        tracing::info!(item_id = id, killed, "stop requested");
        Ok(())
    }

    /// Batch stop: every Queued/Downloading item is stopped. Returns how many
    /// jobs were signalled.
    pub fn stop_all(&self) -> usize {
        let jobs = self.shared.control.request_abort_all();
        let killed = self.shared.registry.kill_all();
        if jobs > 0 {
            tracing::info!(jobs, killed, "stop-all requested");
        }
        jobs
    }

    /// Stopped or Failed → Idle: deletes the temp files and the cache entry.
    pub fn clear(&self, id: &str) -> Result<(), ControlError> {
        let shared = &self.shared;
        shared
            .board
            .transition(id, "clear", |a| a.clear, |_, _| ItemState::Idle)?;
        let removed = match shared.cache.clear(id) {
            Some(entry) => files::remove_temp_files(&entry.temp_file_pattern),
            None => 0,
        };
        tracing::info!(item_id = id, removed, "cleared");
        Ok(())
    }

    /// Drops every cache entry whose job is not running, deleting its temp
    /// files. Items on the board return to `Idle`. Returns entries removed.
    pub fn clear_all(&self) -> usize {
        let shared = &self.shared;
        let active: Vec<String> = shared
            .board
            .all()
            .into_iter()
            .filter(|s| s.state.is_active())
            .map(|s| s.item.id)
            .collect();

        let removed: Vec<CacheEntry> = if active.is_empty() {
            shared.cache.clear_all()
        } else {
            shared
                .cache
                .entries()
                .into_iter()
                .filter(|e| !active.contains(&e.item_id))
                .filter_map(|e| shared.cache.clear(&e.item_id))
                .collect()
        };
        for entry in &removed {
            files::remove_temp_files(&entry.temp_file_pattern);
        }
        for snap in shared.board.all() {
            if matches!(snap.state, ItemState::Stopped(_) | ItemState::Failed(_)) {
                shared.board.set(&snap.item.id, ItemState::Idle);
            }
        }
        tracing::info!(removed = removed.len(), "cleared all cache entries");
        removed.len()
    }

    /// Drops the cache entry and temp files of an item that is not on the
    /// board. Registered items go through `clear`. Returns whether an entry
    /// was removed.
    pub fn forget_cached(&self, id: &str) -> bool {
        let shared = &self.shared;
        if shared.board.get(id).is_some() {
            return false;
        }
        match shared.cache.clear(id) {
            Some(entry) => {
                let removed = files::remove_temp_files(&entry.temp_file_pattern);
                tracing::info!(item_id = id, removed, "forgot cached job");
                true
            }
            None => false,
        }
    }

    /// Waits until the item is neither Queued nor Downloading; returns that state.
    pub async fn wait(&self, id: &str) -> Result<ItemState, ControlError> {
        let mut rx = self
            .shared
            .board
            .subscribe(id)
            .ok_or_else(|| ControlError::UnknownItem(id.to_string()))?;
        let settled = match rx.wait_for(|s| !s.is_active()).await {
            Ok(state) => state.clone(),
            Err(_) => self.shared.board.state(id).unwrap_or(ItemState::Idle),
        };
        Ok(settled)
    }

    /// Number of items with a job (Queued or Downloading).
    pub fn active_count(&self) -> usize {
        self.shared
            .board
            .all()
            .iter()
            .filter(|s| s.state.is_active())
            .count()
    }
}
