//! `tunefetch status` – show resumable jobs, or the state of each listed item.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tunefetch_core::cache::CacheStore;
use tunefetch_core::catalogue::load_item_list;
use tunefetch_core::config::TunefetchConfig;
use tunefetch_core::process::ProcessRegistry;
use tunefetch_core::tools::{ToolSet, FETCH_TOOL, TRANSCODE_TOOL};
use tunefetch_core::JobController;

pub fn run_status(cfg: &TunefetchConfig, items: Option<&Path>) -> Result<()> {
    let cache = Arc::new(CacheStore::open_default(cfg.cache_flush_interval())?);
    match items {
        Some(path) => print_items(cfg, cache, path),
        None => {
            print_cache(&cache);
            Ok(())
        }
    }
}

fn print_cache(cache: &CacheStore) {
    let entries = cache.entries();
    if entries.is_empty() {
        println!("No stopped jobs.");
        return;
    }
    println!("{:<24} {:>6}  TITLE", "ID", "DONE");
    for e in entries {
        println!(
            "{:<24} {:>5.0}%  {} - {}",
            e.item_id, e.progress_percent, e.artist, e.title
        );
    }
}

/// Registers the list in a controller that never starts anything, which
/// yields each item's state exactly as a session would see it.
fn print_items(cfg: &TunefetchConfig, cache: Arc<CacheStore>, path: &Path) -> Result<()> {
    let items = load_item_list(path).with_context(|| format!("item list {}", path.display()))?;
    let tools = ToolSet::resolve(cfg).unwrap_or_else(|_| ToolSet::new(FETCH_TOOL, TRANSCODE_TOOL));
    let (controller, _events) =
        JobController::new(cfg.clone(), tools, cache, Arc::new(ProcessRegistry::new()))?;

    println!("{:<24} {:<20} TITLE", "ID", "STATE");
    for item in items {
        let id = item.id.clone();
        let label = format!("{} - {}", item.artist, item.title);
        let state = controller.register(item);
        println!("{:<24} {:<20} {}", id, state.to_string(), label);
    }
    Ok(())
}
