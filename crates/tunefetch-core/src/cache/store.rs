//! In-memory authoritative map with best-effort JSON persistence.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::entry::CacheEntry;
use crate::files;
use crate::model::ItemId;

struct CacheState {
    entries: BTreeMap<ItemId, CacheEntry>,
    dirty: bool,
    last_flush: Option<Instant>,
}

/// Resumable-job store shared by every job task.
///
/// Persistence never fails a caller: write errors are logged and the
/// in-memory map stays authoritative until the next successful flush.
pub struct CacheStore {
    path: Option<PathBuf>,
    flush_interval: Duration,
    state: Mutex<CacheState>,
}

impl CacheStore {
    /// Default cache file: `~/.local/state/tunefetch/cache.json`.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tunefetch")?;
        Ok(xdg_dirs.get_state_home().join("cache.json"))
    }

    pub fn open_default(flush_interval: Duration) -> Result<Self> {
        Ok(Self::load(Self::default_path()?, flush_interval))
    }

    /// Store without a backing file (tests, dry runs).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            flush_interval: Duration::ZERO,
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                dirty: false,
                last_flush: None,
            }),
        }
    }

    /// Loads the store from `path`, dropping entries whose temp files are gone.
    ///
    /// A missing or unreadable file yields an empty store.
    pub fn load(path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        let path = path.into();
        let mut entries = read_entries(&path);

        let before = entries.len();
        entries.retain(|id, entry| {
            let keep = entry.item_id == *id && files::has_temp_files(&entry.temp_file_pattern);
            if !keep {
                tracing::debug!(item_id = %id, "purging cache entry without temp files");
            }
            keep
        });
        let purged = before - entries.len();

        let store = Self {
            path: Some(path),
            flush_interval,
            state: Mutex::new(CacheState {
                entries,
                dirty: purged > 0,
                last_flush: None,
            }),
        };
        if purged > 0 {
            tracing::info!("purged {} stale cache entr(ies)", purged);
            store.flush();
        }
        store
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<CacheEntry> {
        self.lock().entries.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries ordered by item id.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.lock().entries.values().cloned().collect()
    }

    /// Inserts or replaces the entry for `entry.item_id` and persists immediately.
    pub fn set(&self, mut entry: CacheEntry) {
        entry.touch();
        let mut state = self.lock();
        state.entries.insert(entry.item_id.clone(), entry);
        state.dirty = true;
        self.persist_locked(&mut state);
    }

    /// Records progress for an existing entry. Persists only if the throttle
    /// interval has elapsed since the last write. Returns false if no entry exists.
    pub fn update_progress(&self, id: &str, percent: f64) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(id) else {
            return false;
        };
        entry.progress_percent = percent.clamp(0.0, 100.0);
        entry.touch();
        state.dirty = true;
        let due = state
            .last_flush
            .map(|t| t.elapsed() >= self.flush_interval)
            .unwrap_or(true);
        if due {
            self.persist_locked(&mut state);
        }
        true
    }

    /// Removes the entry for `id` and persists immediately.
    pub fn clear(&self, id: &str) -> Option<CacheEntry> {
        let mut state = self.lock();
        let removed = state.entries.remove(id);
        if removed.is_some() {
            state.dirty = true;
            self.persist_locked(&mut state);
        }
        removed
    }

    /// Removes every entry and persists; returns what was removed.
    pub fn clear_all(&self) -> Vec<CacheEntry> {
        let mut state = self.lock();
        let removed: Vec<CacheEntry> = std::mem::take(&mut state.entries).into_values().collect();
        state.dirty = true;
        self.persist_locked(&mut state);
        removed
    }

    /// Writes pending changes now.
    pub fn flush(&self) {
        let mut state = self.lock();
        if state.dirty {
            self.persist_locked(&mut state);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist_locked(&self, state: &mut CacheState) {
        state.last_flush = Some(Instant::now());
        let Some(path) = &self.path else {
            state.dirty = false;
            return;
        };
        match write_entries(path, &state.entries) {
            Ok(()) => state.dirty = false,
            Err(e) => tracing::warn!(path = %path.display(), "cache write failed: {:#}", e),
        }
    }
}

fn read_entries(path: &Path) -> BTreeMap<ItemId, CacheEntry> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "cache read failed, starting empty: {}", e);
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), "cache parse failed, starting empty: {}", e);
            BTreeMap::new()
        }
    }
}

fn write_entries(path: &Path, entries: &BTreeMap<ItemId, CacheEntry>) -> Result<()> {
    use anyhow::Context;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(entries).context("serialize cache")?;
    let tmp = files::part_path(path);
    std::fs::write(&tmp, json).with_context(|| format!("write cache: {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replace cache: {}", path.display()))?;
    Ok(())
}
