//! Fetch then transcode (audio) or fetch then remux (video) for one job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::CacheEntry;
use crate::control::AbortToken;
use crate::error::JobError;
use crate::files;
use crate::metadata::TagSet;
use crate::model::{Item, OutputFormat};
use crate::probe::{self, ProbeInfo};
use crate::process::parse::parse_fetch_percent;
use crate::process::{ProcessSupervisor, TranscodeTracker};
use crate::progress::{PhaseWeights, ProgressAggregator};

use super::Shared;

/// Aborts the probe task if the job ends first.
struct ProbeTask(Option<JoinHandle<Option<ProbeInfo>>>);

impl ProbeTask {
    async fn finish(mut self) -> Option<ProbeInfo> {
        let handle = self.0.take()?;
        handle.await.ok().flatten()
    }
}

impl Drop for ProbeTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

fn spawn_probe(shared: &Shared, item: &Item, entry: &CacheEntry) -> ProbeTask {
    let meta = &item.meta;
    let wanted = shared.cfg.enrich_metadata
        && (meta.album.is_none() || meta.year.is_none() || meta.genre.is_none());
    if !wanted {
        return ProbeTask(None);
    }
    let registry = Arc::clone(&shared.registry);
    let tools = shared.tools.clone();
    let poll = shared.cfg.poll_interval();
    let timeout = shared.cfg.probe_timeout();
    let item_id = item.id.clone();
    let query = entry.source_url_or_query.clone();
    ProbeTask(Some(tokio::spawn(async move {
        probe::probe_metadata(&registry, poll, &tools, &item_id, &query, timeout).await
    })))
}

/// Runs every step of the job and returns the final output path.
/// `report` receives the unified percent after each progress tick.
pub(super) async fn run_pipeline(
    shared: &Shared,
    item: &Item,
    entry: &CacheEntry,
    abort: &AbortToken,
    mut report: impl FnMut(f64),
) -> Result<PathBuf, JobError> {
    let weights = match item.format {
        OutputFormat::AudioOnly => PhaseWeights::TWO_PHASE,
        OutputFormat::AudioVideo => PhaseWeights::FETCH_ONLY,
    };
    let mut progress = ProgressAggregator::with_floor(weights, entry.progress_percent);
    let supervisor = ProcessSupervisor::new(&shared.registry, shared.cfg.poll_interval());

    if let Some(dir) = entry.temp_file_pattern.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| JobError::io(format!("create temp dir {}", dir.display()), e))?;
    }

    let probe = spawn_probe(shared, item, entry);

    let fetch = shared.tools.fetch_command(
        &shared.cfg,
        item.format,
        &entry.temp_file_pattern,
        &entry.source_url_or_query,
    );
    supervisor
        .run(&item.id, &fetch, abort, |line| {
            if let Some(p) = parse_fetch_percent(line) {
                report(progress.fetch_tick(p));
            }
        })
        .await?;
    report(progress.finish_fetch());

    let fetched = files::select_fetched_file(&entry.temp_file_pattern)?;
    tracing::debug!(item_id = %item.id, file = %fetched.display(), "fetch finished");

    let mut meta = item.meta.clone();
    if let Some(info) = probe.finish().await {
        info.fill_missing(&mut meta);
    }
    let tagged = Item {
        meta,
        ..item.clone()
    };
    let tags = TagSet::for_item(&tagged);

    let output = &entry.output_path;
    if let Some(dir) = output.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| JobError::io(format!("create output dir {}", dir.display()), e))?;
    }
    let part = files::part_path(output);
    let convert = match item.format {
        OutputFormat::AudioOnly => shared.tools.transcode_command(&shared.cfg, &fetched, &part, &tags),
        OutputFormat::AudioVideo => shared.tools.remux_command(&shared.cfg, &fetched, &part, &tags),
    };

    let mut tracker = TranscodeTracker::new();
    let converted = supervisor
        .run(&item.id, &convert, abort, |line| {
            if let Some(p) = tracker.observe(line) {
                report(progress.transcode_tick(p));
            }
        })
        .await;
    if let Err(e) = converted {
        discard(&part).await;
        return Err(e);
    }

    finalize(&part, output).await?;
    report(progress.transcode_tick(100.0));

    let removed = files::remove_temp_files(&entry.temp_file_pattern);
    tracing::debug!(item_id = %item.id, removed, "removed fetched temp files");
    Ok(output.clone())
}

/// Renames `<final>.part` onto the final path and checks the result exists.
async fn finalize(part: &Path, output: &Path) -> Result<(), JobError> {
    if tokio::fs::metadata(part).await.is_err() {
        return Err(JobError::OutputMissing {
            path: output.to_path_buf(),
        });
    }
    tokio::fs::rename(part, output)
        .await
        .map_err(|e| JobError::io(format!("finalize {}", output.display()), e))?;
    if tokio::fs::metadata(output).await.is_err() {
        return Err(JobError::OutputMissing {
            path: output.to_path_buf(),
        });
    }
    Ok(())
}

async fn discard(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => tracing::debug!(path = %part.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %part.display(), "could not remove partial output: {}", e),
    }
}
