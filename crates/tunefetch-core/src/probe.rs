//! Best-effort metadata enrichment from the fetch tool's JSON dump.

use serde::Deserialize;
use std::time::Duration;

use crate::control::AbortToken;
use crate::metadata::is_placeholder;
use crate::model::ItemMeta;
use crate::process::{ProcessRegistry, ProcessSupervisor};
use crate::tools::ToolSet;

/// The subset of `--dump-json` output used for tagging. Every field is optional;
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbeInfo {
    pub title: Option<String>,
    pub track: Option<String>,
    pub artist: Option<String>,
    pub uploader: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub release_year: Option<u32>,
    /// `YYYYMMDD`.
    pub upload_date: Option<String>,
    pub track_number: Option<u32>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
}

impl ProbeInfo {
    /// Parses the last JSON object line of the tool's stdout.
    pub fn from_stdout(lines: &[String]) -> Option<Self> {
        let line = lines.iter().rev().find(|l| l.trim_start().starts_with('{'))?;
        match serde_json::from_str(line) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!("probe output is not valid metadata JSON: {}", e);
                None
            }
        }
    }

    pub fn year(&self) -> Option<u32> {
        self.release_year.or_else(|| {
            self.upload_date
                .as_deref()
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse().ok())
        })
    }

    /// Copies probed values into fields `meta` does not have yet.
    pub fn fill_missing(&self, meta: &mut ItemMeta) {
        fill(&mut meta.album, self.album.as_deref());
        fill(&mut meta.album_artist, self.album_artist.as_deref());
        fill(&mut meta.genre, self.genre.as_deref());
        fill(&mut meta.image_url, self.thumbnail.as_deref());
        if meta.year.is_none() {
            meta.year = self.year();
        }
        if meta.track_number.is_none() {
            meta.track_number = self.track_number;
        }
        if meta.duration_secs.is_none() {
            meta.duration_secs = self.duration.filter(|d| d.is_finite() && *d > 0.0);
        }
    }
}

fn fill(slot: &mut Option<String>, value: Option<&str>) {
    let missing = slot.as_deref().map(is_placeholder).unwrap_or(true);
    if let Some(v) = value.filter(|v| !is_placeholder(v)) {
        if missing {
            *slot = Some(v.trim().to_string());
        }
    }
}

/// Runs the metadata probe under a hard timeout. Failure or timeout yields None.
pub async fn probe_metadata(
    registry: &ProcessRegistry,
    poll_interval: Duration,
    tools: &ToolSet,
    item_id: &str,
    query: &str,
    timeout: Duration,
) -> Option<ProbeInfo> {
    let cmd = tools.probe_command(query);
    let abort = AbortToken::new();
    let deadline = {
        let abort = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            abort.abort();
        })
    };
    let result = ProcessSupervisor::new(registry, poll_interval)
        .run(item_id, &cmd, &abort, |_| {})
        .await;
    deadline.abort();

    match result {
        Ok(output) => ProbeInfo::from_stdout(&output.stdout),
        Err(e) if e.is_cancelled() => {
            tracing::debug!(item_id, "metadata probe timed out after {:?}", timeout);
            None
        }
        Err(e) => {
            tracing::debug!(item_id, "metadata probe failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_fields_and_ignores_the_rest() {
        let lines = vec![
            "[youtube] abc: Downloading webpage".to_string(),
            r#"{"id":"abc","title":"Song","album":"Record","upload_date":"20110304","duration":212.5,"formats":[{"x":1}]}"#.to_string(),
        ];
        let info = ProbeInfo::from_stdout(&lines).unwrap();
        assert_eq!(info.title.as_deref(), Some("Song"));
        assert_eq!(info.year(), Some(2011));
        assert_eq!(info.duration, Some(212.5));
    }

    #[test]
    fn garbage_is_none() {
        assert!(ProbeInfo::from_stdout(&["{not json".to_string()]).is_none());
        assert!(ProbeInfo::from_stdout(&[]).is_none());
    }

    #[test]
    fn fill_missing_keeps_catalogue_values() {
        let mut meta = ItemMeta {
            album: Some("Catalogue Album".into()),
            genre: Some("Unknown".into()),
            ..ItemMeta::default()
        };
        let info = ProbeInfo {
            album: Some("Probe Album".into()),
            genre: Some("Jazz".into()),
            release_year: Some(1972),
            track_number: Some(3),
            ..ProbeInfo::default()
        };
        info.fill_missing(&mut meta);
        assert_eq!(meta.album.as_deref(), Some("Catalogue Album"));
        assert_eq!(meta.genre.as_deref(), Some("Jazz"));
        assert_eq!(meta.year, Some(1972));
        assert_eq!(meta.track_number, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_times_out_quietly() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("slow-probe");
        std::fs::write(&exe, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = ProcessRegistry::new();
        let tools = ToolSet::new(&exe, "/bin/false");
        let started = std::time::Instant::now();
        let info = probe_metadata(
            &registry,
            Duration::from_millis(20),
            &tools,
            "a",
            "q",
            Duration::from_millis(100),
        )
        .await;
        assert!(info.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(registry.live_count(), 0);
    }
}
