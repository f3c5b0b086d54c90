//! `tunefetch get` – download a single item in the foreground.

use anyhow::Result;
use tunefetch_core::config::TunefetchConfig;
use tunefetch_core::{Item, ItemState, OutputFormat, Source};

use super::session::run_session;

pub struct GetArgs {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub source: Source,
    pub format: OutputFormat,
    pub url: Option<String>,
}

impl GetArgs {
    fn into_item(self) -> Result<Item> {
        if self.id.trim().is_empty() {
            anyhow::bail!("item id must not be empty");
        }
        if self.title.trim().is_empty() {
            anyhow::bail!("title must not be empty");
        }
        let mut item = Item::new(self.id, self.title, self.artist, self.source, self.format);
        item.meta.url = self.url.filter(|u| !u.trim().is_empty());
        Ok(item)
    }
}

pub async fn run_get(cfg: TunefetchConfig, args: GetArgs) -> Result<()> {
    let item = args.into_item()?;
    let id = item.id.clone();
    let outcome = run_session(cfg, vec![item]).await?;

    if let Some((_, msg)) = outcome.failures().into_iter().next() {
        anyhow::bail!("{}: {}", id, msg);
    }
    if let Some(snap) = outcome.items.iter().find(|s| s.item.id == id) {
        if let ItemState::Stopped(p) = snap.state {
            println!("{}: stopped at {:.0}%; run `tunefetch resume {}` to continue", id, p, id);
        }
    }
    Ok(())
}
