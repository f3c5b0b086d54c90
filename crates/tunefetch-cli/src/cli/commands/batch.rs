//! `tunefetch batch` – download every item of a TOML item list.

use anyhow::{Context, Result};
use std::path::Path;
use tunefetch_core::catalogue::load_item_list;
use tunefetch_core::config::TunefetchConfig;

use super::session::run_session;

pub async fn run_batch(mut cfg: TunefetchConfig, path: &Path, jobs: Option<usize>) -> Result<()> {
    let items = load_item_list(path).with_context(|| format!("item list {}", path.display()))?;
    if items.is_empty() {
        println!("No items in {}.", path.display());
        return Ok(());
    }
    if let Some(n) = jobs {
        cfg.max_concurrent_jobs = n.max(1);
    }
    tracing::info!(items = items.len(), jobs = cfg.max_concurrent_jobs, "starting batch");

    let outcome = run_session(cfg, items).await?;
    for (id, msg) in outcome.failures() {
        eprintln!("{}: {}", id, msg);
    }
    if outcome.summary.failed > 0 {
        anyhow::bail!("{} of {} item(s) failed", outcome.summary.failed, outcome.summary.total());
    }
    Ok(())
}
