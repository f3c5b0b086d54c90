//! Metadata tags written into the output file by the transcode tool.

use crate::model::Item;

/// Values the catalogue uses when it has nothing real to say.
const PLACEHOLDERS: &[&str] = &["unknown", "unknown title", "unknown artist", "unknown album"];

/// True for blank values and catalogue placeholders such as "Unknown Artist".
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || PLACEHOLDERS.iter().any(|p| v.eq_ignore_ascii_case(p))
}

/// Ordered `key=value` tags; placeholder values never get in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<(&'static str, String)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags for an item: title, artist, album, album_artist, date, genre, track.
    pub fn for_item(item: &Item) -> Self {
        let mut tags = Self::new();
        tags.push("title", &item.title);
        tags.push("artist", &item.artist);
        let meta = &item.meta;
        if let Some(album) = &meta.album {
            tags.push("album", album);
        }
        if let Some(album_artist) = &meta.album_artist {
            tags.push("album_artist", album_artist);
        }
        if let Some(year) = meta.year.filter(|y| *y > 0) {
            tags.push("date", &year.to_string());
        }
        if let Some(genre) = &meta.genre {
            tags.push("genre", genre);
        }
        if let Some(track) = meta.track_number.filter(|t| *t > 0) {
            tags.push("track", &track.to_string());
        }
        tags
    }

    /// Adds `key=value` unless the value is blank or a placeholder.
    /// A later value for the same key replaces the earlier one.
    pub fn push(&mut self, key: &'static str, value: &str) {
        if is_placeholder(value) {
            return;
        }
        let value = value.trim().to_string();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// `-metadata key=value` pairs for the transcode command line.
    pub fn to_args(&self) -> Vec<String> {
        self.tags
            .iter()
            .flat_map(|(k, v)| ["-metadata".to_string(), format!("{k}={v}")])
            .collect()
    }
}
