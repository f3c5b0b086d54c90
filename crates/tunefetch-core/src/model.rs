//! Items, their per-item state, and the affordance projection used by front ends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable catalogue id of an item.
pub type ItemId = String;

/// Which catalogue an item came from; decides how the fetch query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Track catalogue: fetched by searching for "artist - title".
    #[serde(rename = "tracks")]
    TrackCatalogue,
    /// Video catalogue: ids map to a watch URL.
    #[serde(rename = "videos")]
    VideoCatalogue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "audio")]
    AudioOnly,
    #[serde(rename = "video")]
    AudioVideo,
}

/// Optional enrichment supplied by the catalogue or a metadata probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub duration_secs: Option<f64>,
    pub image_url: Option<String>,
    /// Direct media URL; overrides the query derived from id/title/artist.
    pub url: Option<String>,
}

/// One downloadable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub artist: String,
    pub source: Source,
    pub format: OutputFormat,
    pub meta: ItemMeta,
}

impl Item {
    pub fn new(
        id: impl Into<ItemId>,
        title: impl Into<String>,
        artist: impl Into<String>,
        source: Source,
        format: OutputFormat,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            source,
            format,
            meta: ItemMeta::default(),
        }
    }
}

/// Per-item state. Progress is carried by the states that have one.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemState {
    Idle,
    Queued,
    Downloading(f64),
    Stopped(f64),
    Completed,
    Failed(String),
}

/// What a front end may offer for an item in a given state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actions {
    pub start: bool,
    pub stop: bool,
    pub resume: bool,
    pub clear: bool,
    pub label: String,
}

impl ItemState {
    pub fn name(&self) -> &'static str {
        match self {
            ItemState::Idle => "idle",
            ItemState::Queued => "queued",
            ItemState::Downloading(_) => "downloading",
            ItemState::Stopped(_) => "stopped",
            ItemState::Completed => "completed",
            ItemState::Failed(_) => "failed",
        }
    }

    pub fn percent(&self) -> f64 {
        match self {
            ItemState::Downloading(p) | ItemState::Stopped(p) => *p,
            ItemState::Completed => 100.0,
            ItemState::Idle | ItemState::Queued | ItemState::Failed(_) => 0.0,
        }
    }

    /// Queued or Downloading: a job exists for the item.
    pub fn is_active(&self) -> bool {
        matches!(self, ItemState::Queued | ItemState::Downloading(_))
    }

    /// Pure projection from state to the actions a front end should show.
    /// The controller uses the same projection to accept or reject commands.
    pub fn actions(&self) -> Actions {
        let (start, stop, resume, clear) = match self {
            ItemState::Idle => (true, false, false, false),
            ItemState::Queued | ItemState::Downloading(_) => (false, true, false, false),
            ItemState::Stopped(_) => (false, false, true, true),
            ItemState::Completed => (false, false, false, false),
            ItemState::Failed(_) => (true, false, false, true),
        };
        Actions {
            start,
            stop,
            resume,
            clear,
            label: self.to_string(),
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Idle => write!(f, "Download"),
            ItemState::Queued => write!(f, "Queued"),
            ItemState::Downloading(p) => write!(f, "Downloading {:.0}%", p),
            ItemState::Stopped(p) => write!(f, "Stopped at {:.0}%", p),
            ItemState::Completed => write!(f, "Done"),
            ItemState::Failed(msg) => write!(f, "Failed: {}", msg),
        }
    }
}

/// State change published to the observer.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEvent {
    pub item_id: ItemId,
    pub state: ItemState,
}
