//! External tool processes: registry, supervision, output parsing.

mod lines;
pub mod parse;
mod registry;
mod supervisor;

pub use lines::{LineSplitter, Stream};
pub use parse::TranscodeTracker;
pub use registry::{ProcessHandle, ProcessId, ProcessRegistry, Registration};
pub use supervisor::{ProcessSupervisor, ToolCommand, ToolOutput};
