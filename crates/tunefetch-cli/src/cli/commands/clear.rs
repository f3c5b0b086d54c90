//! `tunefetch clear` / `clear-all` – forget stopped jobs and delete their partial files.
//!
//! A running session owns the cache, so the command goes through its control
//! socket. Without one, the cache is edited directly under the state lock.

use anyhow::Result;
use std::time::Duration;
use tunefetch_core::cache::{CacheEntry, CacheStore, StateLock};
use tunefetch_core::control::default_control_socket_path;
use tunefetch_core::files;

use crate::cli::control_socket::{check_reply, send_command, ControlCommand};

fn discard(entry: &CacheEntry) {
    let removed = files::remove_temp_files(&entry.temp_file_pattern);
    let part = files::part_path(&entry.output_path);
    let _ = std::fs::remove_file(&part);
    tracing::debug!(item_id = %entry.item_id, removed, "cleared job");
}

/// Sends `command` to a running session. Returns false if there is none.
async fn via_session(command: &ControlCommand) -> Result<bool> {
    let socket = default_control_socket_path()?;
    match send_command(&socket, command).await? {
        Some(reply) => {
            println!("{}.", check_reply(&reply)?);
            Ok(true)
        }
        None => Ok(false),
    }
}

pub async fn run_clear(id: &str) -> Result<()> {
    if via_session(&ControlCommand::Clear(id.to_string())).await? {
        return Ok(());
    }
    let _lock = StateLock::acquire_default()?;
    let cache = CacheStore::open_default(Duration::ZERO)?;
    match cache.clear(id) {
        Some(entry) => {
            discard(&entry);
            println!("Cleared {} ({} - {}).", id, entry.artist, entry.title);
            Ok(())
        }
        None => anyhow::bail!("no stopped job for {}", id),
    }
}

pub async fn run_clear_all() -> Result<()> {
    if via_session(&ControlCommand::ClearAll).await? {
        return Ok(());
    }
    let _lock = StateLock::acquire_default()?;
    let cache = CacheStore::open_default(Duration::ZERO)?;
    let removed = cache.clear_all();
    for entry in &removed {
        discard(entry);
    }
    println!("Cleared {} job(s).", removed.len());
    Ok(())
}
