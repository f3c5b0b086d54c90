use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Audio-only output parameters handed to the transcode tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Encoder name understood by the transcode tool (e.g. `libmp3lame`).
    pub codec: String,
    /// Target bitrate (e.g. `320k`).
    pub bitrate: String,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Container passed as `-f` and used as the file extension.
    pub container: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            bitrate: "320k".to_string(),
            sample_rate: 44_100,
            container: "mp3".to_string(),
        }
    }
}

/// Audio+video output parameters (stream copy, metadata only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Container passed as `-f` and used as the file extension.
    pub container: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            container: "mp4".to_string(),
        }
    }
}

/// Global configuration loaded from `~/.config/tunefetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunefetchConfig {
    /// Maximum number of jobs in the Downloading state at once.
    pub max_concurrent_jobs: usize,
    /// Fragment concurrency passed to the fetch tool (`-N`).
    pub fetch_fragments: u32,
    /// Prefix turning "artist - title" into a fetch-tool search expression.
    pub search_prefix: String,
    /// URL template for video catalogue ids; `{id}` is replaced.
    pub video_url_template: String,
    /// Supervisor wait-loop tick in milliseconds.
    pub poll_interval_ms: u64,
    /// Minimum time between cache flushes caused by progress ticks.
    pub cache_flush_interval_ms: u64,
    /// Run a metadata probe alongside the fetch to fill missing tags.
    pub enrich_metadata: bool,
    /// Hard timeout for the metadata probe.
    pub probe_timeout_secs: u64,
    /// Explicit fetch tool path; if missing, `yt-dlp` is looked up on PATH.
    #[serde(default)]
    pub fetch_tool: Option<PathBuf>,
    /// Explicit transcode tool path; if missing, `ffmpeg` is looked up on PATH.
    #[serde(default)]
    pub transcode_tool: Option<PathBuf>,
    /// Where finished files go (None = current directory).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Where partial fetches live (None = XDG cache dir).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

impl Default for TunefetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            fetch_fragments: 4,
            search_prefix: "ytsearch1:".to_string(),
            video_url_template: "https://www.youtube.com/watch?v={id}".to_string(),
            poll_interval_ms: 100,
            cache_flush_interval_ms: 2_000,
            enrich_metadata: true,
            probe_timeout_secs: 5,
            fetch_tool: None,
            transcode_tool: None,
            output_dir: None,
            temp_dir: None,
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl TunefetchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cache_flush_interval(&self) -> Duration {
        Duration::from_millis(self.cache_flush_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Temp directory for partial fetches: configured value or `~/.cache/tunefetch/partial`.
    pub fn resolved_temp_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.temp_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tunefetch")?;
        Ok(xdg_dirs.get_cache_home().join("partial"))
    }

    /// Output directory: configured value or `<music dir>/tunefetch`.
    pub fn resolved_output_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.output_dir {
            return Ok(dir.clone());
        }
        let base = dirs::audio_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
            .context("no music directory; set output_dir in config.toml")?;
        Ok(base.join("tunefetch"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tunefetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TunefetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TunefetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TunefetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = TunefetchConfig::default();
        assert_eq!(cfg.max_concurrent_jobs, 4);
        assert_eq!(cfg.poll_interval_ms, 100);
        assert_eq!(cfg.audio.container, "mp3");
        assert_eq!(cfg.video.container, "mp4");
        assert!(cfg.fetch_tool.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = TunefetchConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: TunefetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent_jobs, cfg.max_concurrent_jobs);
        assert_eq!(parsed.search_prefix, cfg.search_prefix);
        assert_eq!(parsed.audio.bitrate, cfg.audio.bitrate);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrent_jobs = 2
            fetch_fragments = 8
            search_prefix = "scsearch1:"
            video_url_template = "https://videos.example/{id}"
            poll_interval_ms = 50
            cache_flush_interval_ms = 500
            enrich_metadata = false
            probe_timeout_secs = 3
            fetch_tool = "/opt/bin/yt-dlp"

            [audio]
            codec = "libopus"
            bitrate = "160k"
            sample_rate = 48000
            container = "ogg"
        "#;
        let cfg: TunefetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent_jobs, 2);
        assert_eq!(cfg.fetch_tool.as_deref(), Some(std::path::Path::new("/opt/bin/yt-dlp")));
        assert!(cfg.transcode_tool.is_none());
        assert_eq!(cfg.audio.sample_rate, 48_000);
        assert_eq!(cfg.video.container, "mp4");
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn explicit_temp_dir_wins() {
        let cfg = TunefetchConfig {
            temp_dir: Some(PathBuf::from("/tmp/tf-partial")),
            ..TunefetchConfig::default()
        };
        assert_eq!(cfg.resolved_temp_dir().unwrap(), PathBuf::from("/tmp/tf-partial"));
    }

    #[test]
    fn explicit_output_dir_wins() {
        let cfg = TunefetchConfig {
            output_dir: Some(PathBuf::from("/srv/music")),
            ..TunefetchConfig::default()
        };
        assert_eq!(cfg.resolved_output_dir().unwrap(), PathBuf::from("/srv/music"));
    }
}
