mod batch;
mod clear;
mod completions;
mod get;
mod resume;
mod session;
mod status;
mod stop;

pub use batch::run_batch;
pub use clear::{run_clear, run_clear_all};
pub use completions::{run_completions, run_manpage};
pub use get::{run_get, GetArgs};
pub use resume::run_resume;
pub use status::run_status;
pub use stop::run_stop;
