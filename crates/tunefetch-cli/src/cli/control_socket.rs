//! Control socket: server (during a download session) and client (for
//! `tunefetch stop` / `clear`).
//! Protocol: one line per command ("stop <id>", "stop-all", "clear <id>",
//! "clear-all"), answered by one line: "ok: <detail>" or "error: <message>".

use anyhow::Result;
use std::fmt;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tunefetch_core::{ControlError, JobController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Stop(String),
    StopAll,
    Clear(String),
    ClearAll,
}

impl ControlCommand {
    /// Parses one protocol line; `None` for anything malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line {
            "stop-all" => return Some(ControlCommand::StopAll),
            "clear-all" => return Some(ControlCommand::ClearAll),
            _ => {}
        }
        let (verb, id) = line.split_once(' ')?;
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        match verb {
            "stop" => Some(ControlCommand::Stop(id.to_string())),
            "clear" => Some(ControlCommand::Clear(id.to_string())),
            _ => None,
        }
    }

    /// Runs the command against the session's controller.
    pub fn apply(&self, controller: &JobController) -> Result<String, ControlError> {
        match self {
            ControlCommand::Stop(id) => {
                controller.stop(id)?;
                Ok(format!("stopping {}", id))
            }
            ControlCommand::StopAll => Ok(format!("stopping {} job(s)", controller.stop_all())),
            ControlCommand::Clear(id) => match controller.clear(id) {
                Ok(()) => Ok(format!("cleared {}", id)),
                Err(ControlError::UnknownItem(_)) if controller.forget_cached(id) => {
                    Ok(format!("cleared {}", id))
                }
                Err(e) => Err(e),
            },
            ControlCommand::ClearAll => Ok(format!("cleared {} job(s)", controller.clear_all())),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Stop(id) => write!(f, "stop {}", id),
            ControlCommand::StopAll => write!(f, "stop-all"),
            ControlCommand::Clear(id) => write!(f, "clear {}", id),
            ControlCommand::ClearAll => write!(f, "clear-all"),
        }
    }
}

fn reply_line(line: &str, controller: &JobController) -> String {
    match ControlCommand::parse(line) {
        Some(cmd) => match cmd.apply(controller) {
            Ok(detail) => {
                tracing::info!("control socket: {} ({})", cmd, detail);
                format!("ok: {}\n", detail)
            }
            Err(e) => {
                tracing::debug!("control socket: {} refused: {}", cmd, e);
                format!("error: {}\n", e)
            }
        },
        None => format!("error: unknown command {:?}\n", line.trim()),
    }
}

/// Spawns a task that listens on `path` and applies each command line to
/// `controller`, answering every line.
pub fn spawn_control_listener(
    controller: JobController,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let handle = tokio::spawn(async move {
        let _ = std::fs::remove_file(&path);
        let listener = match UnixListener::bind(&path) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket bind: {}", e);
                return;
            }
        };
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut reader = BufReader::new(read).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let reply = reply_line(&line, &controller);
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command line and returns the session's reply. `None` (nothing
/// sent) if no session is listening at `socket_path`.
pub async fn send_command(socket_path: &Path, command: &ControlCommand) -> Result<Option<String>> {
    if !socket_path.exists() {
        return Ok(None);
    }
    let stream = match tokio::net::UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{}\n", command).as_bytes()).await?;
    write.shutdown().await?;
    let reply = BufReader::new(read).lines().next_line().await?;
    Ok(Some(reply.unwrap_or_default()))
}

/// Turns a session reply into the text to print, or an error.
pub fn check_reply(reply: &str) -> Result<&str> {
    if let Some(msg) = reply.strip_prefix("error: ") {
        anyhow::bail!("{}", msg);
    }
    Ok(reply.strip_prefix("ok: ").unwrap_or(reply))
}
