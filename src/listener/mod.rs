pub mod decoder;
pub mod types;
pub mod watcher;

pub use types::{DepositEvent, PollCursor};
pub use watcher::{EventWatcher, WatcherSettings};
