pub mod collab;
pub mod common;
pub mod config;
pub mod context;
pub mod helper;
pub mod ipc;
pub mod testing;
pub mod trade;
pub mod watcher;
pub mod wm;
