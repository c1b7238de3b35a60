//! Load tracker config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Tracker configuration. File: ~/.config/trackshare/tracker.toml or /etc/trackshare/tracker.toml.
/// Env overrides: TRACKSHARE_TRACKER_PORT, TRACKSHARE_DATA_FILE, TRACKSHARE_MAX_CONNECTIONS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Tracker listen port (default 1234).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Registry JSON file (default ./server_data.json).
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Cap on concurrently served connections, at least 1. Unset: unbounded.
    #[serde(default)]
    pub max_connections: Option<usize>,
    /// Default tracing filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    trackshare_core::TRACKER_PORT
}
fn default_data_file() -> PathBuf {
    PathBuf::from("server_data.json")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_file: default_data_file(),
            max_connections: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Reject values the listener cannot serve with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_connections != Some(0),
            "max_connections must be at least 1"
        );
        Ok(())
    }
}

/// Load config: default, then config file, then env vars. An explicit path
/// must exist and parse; the well-known paths are optional.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(p) => read_file(p)?,
        None => load_file().unwrap_or_default(),
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    c.validate()?;
    Ok(c)
}

pub(crate) fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("TRACKSHARE_TRACKER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.port = p;
    }
    if let Some(s) = var("TRACKSHARE_DATA_FILE") {
        c.data_file = PathBuf::from(s);
    }
    if let Some(n) = var("TRACKSHARE_MAX_CONNECTIONS").and_then(|s| s.parse::<usize>().ok()) {
        c.max_connections = Some(n);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/trackshare/tracker.toml"));
    }
    out.push(PathBuf::from("/etc/trackshare/tracker.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match read_file(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring tracker config");
            None
        }
    }
}

fn read_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str::<Config>(&s).with_context(|| format!("parsing config {}", path.display()))
}
