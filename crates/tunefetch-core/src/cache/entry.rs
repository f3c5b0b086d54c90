//! The persisted job record.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::{Item, ItemId, OutputFormat, Source};

/// Durable record that lets an interrupted job resume with the same fetch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub item_id: ItemId,
    pub title: String,
    pub artist: String,
    /// URL or search expression handed to the fetch tool, verbatim.
    pub source_url_or_query: String,
    /// Unique per-job path prefix; fetched files are `<prefix>.<ext>`.
    pub temp_file_pattern: PathBuf,
    pub output_path: PathBuf,
    pub progress_percent: f64,
    /// Unix seconds of the last update.
    pub timestamp: i64,
    pub source: Source,
    pub format: OutputFormat,
}

impl CacheEntry {
    pub fn touch(&mut self) {
        self.timestamp = unix_timestamp();
    }

    /// Rebuilds the item a stopped job belongs to, for sessions that only
    /// know the cache (e.g. `tunefetch resume`). Catalogue metadata is not kept.
    pub fn to_item(&self) -> Item {
        Item::new(
            self.item_id.clone(),
            self.title.clone(),
            self.artist.clone(),
            self.source,
            self.format,
        )
    }
}

pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
