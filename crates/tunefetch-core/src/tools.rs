//! Fetch/transcode executables and the command lines handed to them.

use std::path::{Path, PathBuf};

use crate::config::TunefetchConfig;
use crate::error::JobError;
use crate::metadata::TagSet;
use crate::model::{Item, OutputFormat, Source};
use crate::process::ToolCommand;

pub const FETCH_TOOL: &str = "yt-dlp";
pub const TRANSCODE_TOOL: &str = "ffmpeg";

/// Format selector for audio-only fetches.
const AUDIO_SELECTOR: &str = "bestaudio/best";
/// Format selector for audio+video fetches (best video with best audio, else best muxed).
const VIDEO_SELECTOR: &str = "bv*+ba/b";

/// Resolved executables for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    pub fetch: PathBuf,
    pub transcode: PathBuf,
}

impl ToolSet {
    pub fn new(fetch: impl Into<PathBuf>, transcode: impl Into<PathBuf>) -> Self {
        Self {
            fetch: fetch.into(),
            transcode: transcode.into(),
        }
    }

    /// Configured paths first, otherwise a `PATH` lookup. Missing tools are fatal.
    pub fn resolve(cfg: &TunefetchConfig) -> Result<Self, JobError> {
        let fetch = resolve_one(FETCH_TOOL, cfg.fetch_tool.as_deref(), "fetch_tool")?;
        let transcode = resolve_one(TRANSCODE_TOOL, cfg.transcode_tool.as_deref(), "transcode_tool")?;
        tracing::debug!(fetch = %fetch.display(), transcode = %transcode.display(), "resolved tools");
        Ok(Self { fetch, transcode })
    }

    /// Fetch `query` into `<temp_pattern>.<ext>`.
    pub fn fetch_command(
        &self,
        cfg: &TunefetchConfig,
        format: OutputFormat,
        temp_pattern: &Path,
        query: &str,
    ) -> ToolCommand {
        let selector = match format {
            OutputFormat::AudioOnly => AUDIO_SELECTOR,
            OutputFormat::AudioVideo => VIDEO_SELECTOR,
        };
        let template = format!("{}.%(ext)s", temp_pattern.display());
        let args = vec![
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "-N".to_string(),
            cfg.fetch_fragments.max(1).to_string(),
            "-f".to_string(),
            selector.to_string(),
            "-o".to_string(),
            template,
            "--".to_string(),
            query.to_string(),
        ];
        ToolCommand {
            tool: FETCH_TOOL.to_string(),
            exe: self.fetch.clone(),
            args,
            cwd: temp_pattern.parent().map(Path::to_path_buf),
        }
    }

    /// Ask the fetch tool for the item's metadata as JSON without downloading.
    pub fn probe_command(&self, query: &str) -> ToolCommand {
        ToolCommand {
            tool: FETCH_TOOL.to_string(),
            exe: self.fetch.clone(),
            args: vec![
                "--dump-json".to_string(),
                "--skip-download".to_string(),
                "--no-playlist".to_string(),
                "--".to_string(),
                query.to_string(),
            ],
            cwd: None,
        }
    }

    /// Audio-only conversion of `input` into `output` (normally a `.part` path).
    pub fn transcode_command(
        &self,
        cfg: &TunefetchConfig,
        input: &Path,
        output: &Path,
        tags: &TagSet,
    ) -> ToolCommand {
        let audio = &cfg.audio;
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-vn".to_string(),
            "-c:a".to_string(),
            audio.codec.clone(),
            "-b:a".to_string(),
            audio.bitrate.clone(),
            "-ar".to_string(),
            audio.sample_rate.to_string(),
        ];
        args.extend(tags.to_args());
        args.extend(["-f".to_string(), audio.container.clone(), output.display().to_string()]);
        ToolCommand {
            tool: TRANSCODE_TOOL.to_string(),
            exe: self.transcode.clone(),
            args,
            cwd: None,
        }
    }

    /// Stream-copy remux of `input` into `output`, writing tags only.
    pub fn remux_command(
        &self,
        cfg: &TunefetchConfig,
        input: &Path,
        output: &Path,
        tags: &TagSet,
    ) -> ToolCommand {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
        ];
        args.extend(tags.to_args());
        args.extend(["-f".to_string(), cfg.video.container.clone(), output.display().to_string()]);
        ToolCommand {
            tool: TRANSCODE_TOOL.to_string(),
            exe: self.transcode.clone(),
            args,
            cwd: None,
        }
    }
}

fn resolve_one(tool: &str, configured: Option<&Path>, key: &str) -> Result<PathBuf, JobError> {
    match configured {
        Some(path) if path.components().count() > 1 || path.is_absolute() => {
            if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(JobError::ToolNotFound {
                    tool: tool.to_string(),
                    hint: Some(format!("{key} = {} does not exist", path.display())),
                })
            }
        }
        Some(name) => which::which(name).map_err(|_| JobError::ToolNotFound {
            tool: tool.to_string(),
            hint: Some(format!("{} is not on PATH", name.display())),
        }),
        None => which::which(tool).map_err(|_| JobError::ToolNotFound {
            tool: tool.to_string(),
            hint: Some(format!("install it or set {key} in config.toml")),
        }),
    }
}

/// File extension of the final output for a format.
pub fn output_extension(cfg: &TunefetchConfig, format: OutputFormat) -> &str {
    match format {
        OutputFormat::AudioOnly => &cfg.audio.container,
        OutputFormat::AudioVideo => &cfg.video.container,
    }
}

/// What the fetch tool is pointed at: an explicit URL, an id that already is
/// a URL, a video-catalogue watch URL, or a search for "artist - title".
pub fn source_query(item: &Item, cfg: &TunefetchConfig) -> String {
    if let Some(u) = item.meta.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return u.to_string();
    }
    if is_absolute_url(&item.id) {
        return item.id.clone();
    }
    match item.source {
        Source::VideoCatalogue => cfg.video_url_template.replace("{id}", &item.id),
        Source::TrackCatalogue => {
            let artist = item.artist.trim();
            let title = item.title.trim();
            let terms = if artist.is_empty() {
                title.to_string()
            } else {
                format!("{artist} - {title}")
            };
            format!("{}{}", cfg.search_prefix, terms)
        }
    }
}

fn is_absolute_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}
