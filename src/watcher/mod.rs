//! Game log tailing and trade line extraction.

mod tail;
mod trigger;
mod watcher;

pub use trigger::{default_triggers, TriggerConfig, TriggerPattern, TriggerSet};
pub use watcher::{LogWatcher, LogWatcherAccess, WatcherSettings, WatcherStatus};
