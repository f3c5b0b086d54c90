//! Shared setup for controller integration tests.

#![allow(dead_code)]

pub mod fake_tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tunefetch_core::cache::CacheStore;
use tunefetch_core::config::TunefetchConfig;
use tunefetch_core::process::ProcessRegistry;
use tunefetch_core::tools::ToolSet;
use tunefetch_core::{Item, ItemEvent, ItemState, JobController, OutputFormat, Source};

pub use fake_tools::{FetchMode, TranscodeMode};

pub struct Harness {
    pub dir: TempDir,
    pub controller: JobController,
    pub events: mpsc::UnboundedReceiver<ItemEvent>,
    pub cache: Arc<CacheStore>,
    pub registry: Arc<ProcessRegistry>,
}

pub fn test_config(root: &Path, max_jobs: usize) -> TunefetchConfig {
    TunefetchConfig {
        max_concurrent_jobs: max_jobs,
        poll_interval_ms: 20,
        cache_flush_interval_ms: 0,
        enrich_metadata: false,
        output_dir: Some(root.join("out")),
        temp_dir: Some(root.join("partial")),
        ..TunefetchConfig::default()
    }
}

pub fn cache_path(root: &Path) -> PathBuf {
    root.join("state").join("cache.json")
}

impl Harness {
    pub fn new(fetch: FetchMode, transcode: TranscodeMode, max_jobs: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), max_jobs);
        Self::with_config(dir, cfg, fetch, transcode)
    }

    pub fn with_config(dir: TempDir, cfg: TunefetchConfig, fetch: FetchMode, transcode: TranscodeMode) -> Self {
        let tools = ToolSet::new(
            fake_tools::write_fetch_tool(dir.path(), fetch),
            fake_tools::write_transcode_tool(dir.path(), transcode),
        );
        let cache = Arc::new(CacheStore::load(cache_path(dir.path()), Duration::ZERO));
        let registry = Arc::new(ProcessRegistry::new());
        let (controller, events) =
            JobController::new(cfg, tools, Arc::clone(&cache), Arc::clone(&registry)).unwrap();
        Self {
            dir,
            controller,
            events,
            cache,
            registry,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn fetch_log(&self) -> Vec<String> {
        fake_tools::read_log(self.root(), "fetch.log")
    }

    pub fn transcode_log(&self) -> Vec<String> {
        fake_tools::read_log(self.root(), "transcode.log")
    }

    /// Waits for the item to settle, failing the test after 10 s.
    pub async fn settle(&self, id: &str) -> ItemState {
        tokio::time::timeout(Duration::from_secs(10), self.controller.wait(id))
            .await
            .expect("item settled in time")
            .expect("item is registered")
    }

    /// Waits until the item reports Downloading at or above `percent`.
    pub async fn wait_for_percent(&self, id: &str, percent: f64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(snap) = self.controller.item(id) {
                if let ItemState::Downloading(p) = snap.state {
                    if p >= percent {
                        return;
                    }
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {percent}% on {id}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits until the stalled fetch's helper process has gone, failing the
    /// test after 5 s.
    pub async fn assert_helper_killed(&self) {
        let pid = fake_tools::sleep_pid(self.root()).expect("stalled fetch recorded its helper pid");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while fake_tools::process_alive(pid) {
            assert!(tokio::time::Instant::now() < deadline, "helper {pid} survived the stop");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Drains the states published so far for one item.
    pub fn drain_states(&mut self, id: &str) -> Vec<ItemState> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            if ev.item_id == id {
                out.push(ev.state);
            }
        }
        out
    }
}

pub fn track(id: &str, title: &str) -> Item {
    Item::new(id, title, "Band", Source::TrackCatalogue, OutputFormat::AudioOnly)
}

pub fn video(id: &str, title: &str) -> Item {
    Item::new(id, title, "Channel", Source::VideoCatalogue, OutputFormat::AudioVideo)
}
