//! trackshare tracker: registry store, listener and per-connection sessions.

pub mod config;
pub mod listener;
pub mod session;

pub use listener::{SharedTracker, TrackerServer};
