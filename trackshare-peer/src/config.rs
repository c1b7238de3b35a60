//! Load peer config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Peer configuration. File: ~/.config/trackshare/peer.toml or /etc/trackshare/peer.toml.
/// Env overrides: TRACKSHARE_TRACKER, TRACKSHARE_FILE_SERVER_PORT, TRACKSHARE_SHARED_DIR.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Tracker as `host` or `host:port`.
    #[serde(default)]
    pub tracker: Option<String>,
    /// Port used when `tracker` has none (default 1234).
    #[serde(default = "default_tracker_port")]
    pub tracker_port: u16,
    /// File server listen port, and the port assumed for other peers (default 1235).
    #[serde(default = "default_file_server_port")]
    pub file_server_port: u16,
    /// Directory of shared files; downloads land here too (default ./public).
    #[serde(default = "default_shared_dir")]
    pub shared_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_tracker_port() -> u16 {
    trackshare_core::TRACKER_PORT
}
fn default_file_server_port() -> u16 {
    trackshare_core::FILE_SERVER_PORT
}
fn default_shared_dir() -> PathBuf {
    PathBuf::from("public")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker: None,
            tracker_port: default_tracker_port(),
            file_server_port: default_file_server_port(),
            shared_dir: default_shared_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Load config: default, then config file, then env vars.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(p) => read_file(p)?,
        None => load_file().unwrap_or_default(),
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    Ok(c)
}

pub(crate) fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("TRACKSHARE_TRACKER") {
        c.tracker = Some(s);
    }
    if let Some(p) = var("TRACKSHARE_FILE_SERVER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.file_server_port = p;
    }
    if let Some(s) = var("TRACKSHARE_SHARED_DIR") {
        c.shared_dir = PathBuf::from(s);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/trackshare/peer.toml"));
    }
    out.push(PathBuf::from("/etc/trackshare/peer.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match read_file(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring peer config");
            None
        }
    }
}

fn read_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str::<Config>(&s).with_context(|| format!("parsing config {}", path.display()))
}
