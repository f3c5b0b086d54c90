//! Error taxonomy for jobs and for commands sent to the controller.

use std::path::PathBuf;

use crate::model::ItemId;

/// Why a job's pipeline did not complete.
///
/// `Cancelled` is not a failure: the controller maps it to `Stopped`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{tool} not found{}", hint_suffix(.hint))]
    ToolNotFound {
        tool: String,
        hint: Option<String>,
    },

    #[error("failed to launch {}: {source}", .exe.display())]
    LaunchFailed {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed: {diagnostic}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// The fetch step exited cleanly but left nothing matching the temp prefix.
    #[error("file not found")]
    TempFileMissing { pattern: PathBuf },

    #[error("output file missing after conversion: {}", .path.display())]
    OutputMissing { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default()
}

impl JobError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        JobError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}

/// A command the controller refused.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("cannot {action} item {id} while {state}")]
    InvalidTransition {
        id: ItemId,
        action: &'static str,
        state: &'static str,
    },

    #[error("cannot start item {id}: {} is being written by item {holder}", .path.display())]
    OutputBusy {
        id: ItemId,
        holder: ItemId,
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_message() {
        let e = JobError::ToolNotFound {
            tool: "yt-dlp".into(),
            hint: None,
        };
        assert_eq!(e.to_string(), "yt-dlp not found");
        let e = JobError::ToolNotFound {
            tool: "ffmpeg".into(),
            hint: Some("set transcode_tool in config.toml".into()),
        };
        assert_eq!(
            e.to_string(),
            "ffmpeg not found (set transcode_tool in config.toml)"
        );
    }

    #[test]
    fn temp_file_missing_reads_file_not_found() {
        let e = JobError::TempFileMissing {
            pattern: PathBuf::from("/tmp/tf-x"),
        };
        assert_eq!(e.to_string(), "file not found");
    }

    #[test]
    fn invalid_transition_message() {
        let e = ControlError::InvalidTransition {
            id: "abc".into(),
            action: "stop",
            state: "idle",
        };
        assert_eq!(e.to_string(), "cannot stop item abc while idle");
    }
}
