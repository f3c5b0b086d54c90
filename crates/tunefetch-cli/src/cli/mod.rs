//! CLI for the tunefetch download orchestrator.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tunefetch_core::config;
use tunefetch_core::{OutputFormat, Source};

use commands::{
    run_batch, run_clear, run_clear_all, run_completions, run_get, run_manpage, run_resume,
    run_status, run_stop, GetArgs,
};

/// Top-level CLI for tunefetch.
#[derive(Debug, Parser)]
#[command(name = "tunefetch")]
#[command(about = "tunefetch: resumable track/video downloads via yt-dlp and ffmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one item.
    Get {
        /// Catalogue id of the item (or a direct media URL).
        id: String,
        /// Track or video title.
        #[arg(long)]
        title: String,
        /// Artist or channel name.
        #[arg(long, default_value = "")]
        artist: String,
        /// Catalogue the id belongs to.
        #[arg(long, value_enum, default_value = "tracks")]
        source: SourceArg,
        /// Audio-only (transcoded) or audio+video (remuxed).
        #[arg(long, value_enum, default_value = "audio")]
        format: FormatArg,
        /// Explicit media URL; skips the search.
        #[arg(long)]
        url: Option<String>,
    },

    /// Download every item of a TOML item list (`[[item]]` tables).
    Batch {
        /// Path to the item list.
        path: PathBuf,
        /// Run up to N jobs at once (overrides max_concurrent_jobs).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show resumable jobs, or the state of every item in a list.
    Status {
        /// Optional item list to report on.
        #[arg(long, value_name = "PATH")]
        items: Option<PathBuf>,
    },

    /// Resume a stopped job by item id, or all of them.
    Resume {
        /// Item identifier.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,
        /// Resume every job in the cache.
        #[arg(long)]
        all: bool,
    },

    /// Stop an item in a running session (or everything with --all).
    Stop {
        /// Item identifier.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,
        /// Stop every running and queued item.
        #[arg(long)]
        all: bool,
    },

    /// Forget a stopped job and delete its partial files.
    Clear {
        /// Item identifier.
        id: String,
    },

    /// Forget every stopped job and delete all partial files.
    ClearAll,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceArg {
    Tracks,
    Videos,
}

impl From<SourceArg> for Source {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Tracks => Source::TrackCatalogue,
            SourceArg::Videos => Source::VideoCatalogue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatArg {
    Audio,
    Video,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Audio => OutputFormat::AudioOnly,
            FormatArg::Video => OutputFormat::AudioVideo,
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Completions { shell } => return run_completions(shell),
            CliCommand::Manpage => return run_manpage(),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                id,
                title,
                artist,
                source,
                format,
                url,
            } => {
                let args = GetArgs {
                    id,
                    title,
                    artist,
                    source: source.into(),
                    format: format.into(),
                    url,
                };
                run_get(cfg, args).await?
            }
            CliCommand::Batch { path, jobs } => run_batch(cfg, &path, jobs).await?,
            CliCommand::Status { items } => run_status(&cfg, items.as_deref())?,
            CliCommand::Resume { id, all } => run_resume(cfg, id.as_deref(), all).await?,
            CliCommand::Stop { id, all } => run_stop(id.as_deref(), all).await?,
            CliCommand::Clear { id } => run_clear(&id).await?,
            CliCommand::ClearAll => run_clear_all().await?,
            CliCommand::Completions { .. } | CliCommand::Manpage => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
