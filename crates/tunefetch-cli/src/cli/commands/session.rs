//! One foreground download session: controller, control socket, Ctrl-C and
//! progress output around `download_all`.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tunefetch_core::cache::{CacheStore, StateLock};
use tunefetch_core::config::TunefetchConfig;
use tunefetch_core::control::default_control_socket_path;
use tunefetch_core::process::ProcessRegistry;
use tunefetch_core::tools::ToolSet;
use tunefetch_core::{BatchSummary, Item, ItemEvent, ItemSnapshot, ItemState, JobController};

use crate::cli::control_socket::spawn_control_listener;

const PROGRESS_EVERY: Duration = Duration::from_millis(500);

pub(super) struct SessionOutcome {
    pub summary: BatchSummary,
    pub items: Vec<ItemSnapshot>,
}

impl SessionOutcome {
    /// Failure messages of every item that ended Failed.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .filter_map(|s| match &s.state {
                ItemState::Failed(msg) => Some((s.item.id.clone(), msg.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Registers `items`, downloads every Idle/Stopped one and returns once all settle.
pub(super) async fn run_session(cfg: TunefetchConfig, items: Vec<Item>) -> Result<SessionOutcome> {
    let tools = ToolSet::resolve(&cfg)?;
    let _lock = StateLock::acquire_default()?;
    let cache = Arc::new(CacheStore::open_default(cfg.cache_flush_interval())?);
    let registry = Arc::new(ProcessRegistry::new());
    let (controller, events) = JobController::new(cfg, tools, Arc::clone(&cache), registry)?;

    for item in items {
        let id = item.id.clone();
        if controller.register(item) == ItemState::Completed {
            println!("{}: already downloaded", id);
        }
    }

    let (done_tx, done_rx) = oneshot::channel();
    let printer = tokio::spawn(print_events(events, done_rx));

    let socket_path = default_control_socket_path().ok();
    let listener = match &socket_path {
        Some(path) => {
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            Some(spawn_control_listener(controller.clone(), path)?)
        }
        None => None,
    };

    let interrupt = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("stopping; progress is kept for `tunefetch resume`");
                controller.stop_all();
            }
        })
    };

    let summary = controller.download_all().await;

    interrupt.abort();
    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }
    let _ = done_tx.send(());
    if let Err(e) = printer.await {
        tracing::debug!("event printer join: {}", e);
    }
    cache.flush();

    println!(
        "done: {} succeeded, {} failed, {} stopped, {} skipped",
        summary.succeeded, summary.failed, summary.stopped, summary.skipped
    );
    Ok(SessionOutcome {
        summary,
        items: controller.items(),
    })
}

/// Prints state changes; Downloading ticks at most every 500ms per item.
async fn print_events(mut events: mpsc::UnboundedReceiver<ItemEvent>, mut done: oneshot::Receiver<()>) {
    let mut last_tick: HashMap<String, Instant> = HashMap::new();
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ev) => print_event(&ev, &mut last_tick),
                None => return,
            },
            _ = &mut done => {
                while let Ok(ev) = events.try_recv() {
                    print_event(&ev, &mut last_tick);
                }
                return;
            }
        }
    }
}

fn print_event(ev: &ItemEvent, last_tick: &mut HashMap<String, Instant>) {
    match ev.state {
        ItemState::Downloading(_) => {
            let now = Instant::now();
            let due = last_tick
                .get(&ev.item_id)
                .map(|t| now.duration_since(*t) >= PROGRESS_EVERY)
                .unwrap_or(true);
            if !due {
                return;
            }
            last_tick.insert(ev.item_id.clone(), now);
        }
        ItemState::Idle => return,
        _ => {
            last_tick.remove(&ev.item_id);
        }
    }
    println!("{}: {}", ev.item_id, ev.state);
}
