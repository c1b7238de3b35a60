//! trackshare peer: serves the shared directory and talks to a tracker.

pub mod client;
pub mod config;
pub mod error;
pub mod inventory;
pub mod server;

pub use client::{ReconcileReport, TrackerClient};
pub use error::ClientError;
pub use server::FileServer;
