//! `tunefetch resume` – continue stopped jobs from the cache.

use anyhow::Result;
use tunefetch_core::cache::CacheStore;
use tunefetch_core::config::TunefetchConfig;
use tunefetch_core::Item;

use super::session::run_session;

pub async fn run_resume(cfg: TunefetchConfig, id: Option<&str>, all: bool) -> Result<()> {
    let cache = CacheStore::open_default(cfg.cache_flush_interval())?;
    let items: Vec<Item> = match id {
        Some(id) if !all => match cache.get(id) {
            Some(entry) => vec![entry.to_item()],
            None => anyhow::bail!("no stopped job for {}", id),
        },
        _ => cache.entries().iter().map(|e| e.to_item()).collect(),
    };
    // The session opens its own handle on the same file.
    drop(cache);

    if items.is_empty() {
        println!("No stopped jobs.");
        return Ok(());
    }

    let outcome = run_session(cfg, items).await?;
    for (id, msg) in outcome.failures() {
        eprintln!("{}: {}", id, msg);
    }
    if outcome.summary.failed > 0 {
        anyhow::bail!("{} job(s) failed", outcome.summary.failed);
    }
    Ok(())
}
