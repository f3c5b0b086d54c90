//! Persistent resumable-job cache (JSON under the XDG state dir).
//!
//! One entry per item id. The in-memory map is authoritative; the file is
//! rewritten on entry creation, stop, and removal, and at a throttled pace
//! while progress ticks arrive.

mod entry;
mod lock;
mod store;

pub use entry::CacheEntry;
pub use lock::StateLock;
pub use store::CacheStore;
