pub mod config;
pub mod logging;

pub mod cache;
pub mod catalogue;
pub mod control;
pub mod controller;
pub mod error;
pub mod files;
pub mod gate;
pub mod metadata;
pub mod model;
pub mod probe;
pub mod process;
pub mod progress;
pub mod tools;

pub use controller::{BatchSummary, ItemSnapshot, JobController};
pub use error::{ControlError, JobError};
pub use model::{Item, ItemEvent, ItemMeta, ItemState, OutputFormat, Source};
