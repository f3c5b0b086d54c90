//! Splits child output into lines on `\n` and `\r`.
//!
//! Transcode tools redraw their stats line with `\r`, so a plain line reader
//! would hold every progress update until the process exits.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Incremental splitter over raw byte chunks. Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for &b in chunk {
            if b == b'\n' || b == b'\r' {
                if let Some(line) = self.take() {
                    out.push(line);
                }
            } else {
                self.pending.push(b);
            }
        }
        out
    }

    /// Returns the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Reads `reader` to EOF, sending each line tagged with its stream.
pub(crate) async fn pump_lines<R>(
    mut reader: R,
    stream: Stream,
    tx: mpsc::UnboundedSender<(Stream, String)>,
) where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.feed(&buf[..n]) {
                    if tx.send((stream, line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(?stream, "output read failed: {}", e);
                break;
            }
        }
    }
    if let Some(line) = splitter.finish() {
        let _ = tx.send((stream, line));
    }
}
