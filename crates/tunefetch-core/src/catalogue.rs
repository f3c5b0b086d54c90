//! Catalogue records as handed over by the catalogue collaborator.
//!
//! Item lists are TOML files with one `[[item]]` table per record:
//!
//! ```toml
//! [[item]]
//! id = "4uLU6hMCjMI75M1A2tKUQC"
//! title = "Song"
//! artist = "Band"
//! album = "Record"
//! year = 1999
//! source = "tracks"
//! format = "audio"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;

use crate::model::{Item, ItemMeta, OutputFormat, Source};

/// One catalogue record. `id` and `title` must not be blank.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogueRecord {
    #[serde(deserialize_with = "non_blank")]
    pub id: String,
    #[serde(deserialize_with = "non_blank")]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub source: Source,
    pub format: OutputFormat,
}

fn non_blank<'de, D>(d: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(serde::de::Error::custom("must not be blank"));
    }
    Ok(trimmed.to_string())
}

impl From<CatalogueRecord> for Item {
    fn from(r: CatalogueRecord) -> Self {
        let mut item = Item::new(r.id, r.title, r.artist.trim(), r.source, r.format);
        item.meta = ItemMeta {
            album: r.album,
            album_artist: r.album_artist,
            year: r.year,
            genre: r.genre,
            track_number: r.track_number,
            duration_secs: r.duration_seconds,
            image_url: r.image_url,
            url: r.url,
        };
        item
    }
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    item: Vec<CatalogueRecord>,
}

/// Parses an item list. Duplicate ids are rejected.
pub fn parse_item_list(text: &str) -> Result<Vec<Item>> {
    let list: ItemList = toml::from_str(text).context("parse item list")?;
    let mut seen = HashSet::new();
    for record in &list.item {
        if !seen.insert(record.id.as_str()) {
            bail!("duplicate item id {}", record.id);
        }
    }
    Ok(list.item.into_iter().map(Item::from).collect())
}

pub fn load_item_list(path: &Path) -> Result<Vec<Item>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read item list: {}", path.display()))?;
    parse_item_list(&text).with_context(|| format!("item list {}", path.display()))
}
