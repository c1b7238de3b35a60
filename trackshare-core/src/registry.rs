//! Registry model and the store abstraction behind it.
//!
//! The persisted form is a JSON object keyed by peer IP, each value an array of
//! `{filename, size}` in announcement order.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::net::{AddrParseError, IpAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Peer identity: the source IP of its tracker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub IpAddr);

impl From<IpAddr> for PeerId {
    fn from(ip: IpAddr) -> Self {
        PeerId(ip)
    }
}

impl FromStr for PeerId {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PeerId)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A file a peer claims to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub size: u64,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }
}

/// PeerId → file set. Ordered by PeerId so listings are deterministic.
pub type Registry = BTreeMap<PeerId, Vec<FileRecord>>;

/// Durable registry. `put` and `remove` persist before returning; a failed
/// persist leaves the previous state in place.
pub trait RegistryStore: Send {
    fn get(&self, peer: &PeerId) -> Option<&[FileRecord]>;

    fn put(&mut self, peer: PeerId, files: Vec<FileRecord>) -> Result<(), StoreError>;

    fn remove(&mut self, peer: &PeerId) -> Result<(), StoreError>;

    /// Snapshot of the whole registry.
    fn all(&self) -> Registry;

    fn contains(&self, peer: &PeerId) -> bool {
        self.get(peer).is_some()
    }
}

/// Store without a durable medium.
#[derive(Debug, Default)]
pub struct MemoryStore {
    registry: Registry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }
}

impl RegistryStore for MemoryStore {
    fn get(&self, peer: &PeerId) -> Option<&[FileRecord]> {
        self.registry.get(peer).map(Vec::as_slice)
    }

    fn put(&mut self, peer: PeerId, files: Vec<FileRecord>) -> Result<(), StoreError> {
        self.registry.insert(peer, files);
        Ok(())
    }

    fn remove(&mut self, peer: &PeerId) -> Result<(), StoreError> {
        self.registry.remove(peer);
        Ok(())
    }

    fn all(&self) -> Registry {
        self.registry.clone()
    }
}

/// Store persisted as a JSON file. Every write goes to a sibling temp file that
/// is synced and then renamed over the target, so the file on disk is always
/// a complete registry.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    registry: Registry,
}

impl JsonFileStore {
    /// Open the store at `path`, loading whatever it holds. A missing file is an
    /// empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let registry = load(&path)?;
        tracing::info!(path = %path.display(), peers = registry.len(), "registry loaded");
        Ok(Self { path, registry })
    }

    fn persist_or_restore(
        &mut self,
        peer: PeerId,
        previous: Option<Vec<FileRecord>>,
    ) -> Result<(), StoreError> {
        match save(&self.path, &self.registry) {
            Ok(()) => Ok(()),
            Err(e) => {
                match previous {
                    Some(files) => self.registry.insert(peer, files),
                    None => self.registry.remove(&peer),
                };
                Err(e)
            }
        }
    }
}

impl RegistryStore for JsonFileStore {
    fn get(&self, peer: &PeerId) -> Option<&[FileRecord]> {
        self.registry.get(peer).map(Vec::as_slice)
    }

    fn put(&mut self, peer: PeerId, files: Vec<FileRecord>) -> Result<(), StoreError> {
        let previous = self.registry.insert(peer, files);
        self.persist_or_restore(peer, previous)
    }

    fn remove(&mut self, peer: &PeerId) -> Result<(), StoreError> {
        let Some(previous) = self.registry.remove(peer) else {
            return Ok(());
        };
        self.persist_or_restore(*peer, Some(previous))
    }

    fn all(&self) -> Registry {
        self.registry.clone()
    }
}

/// Read a registry from `path`. Absent file → empty registry.
pub fn load(path: &Path) -> Result<Registry, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Registry::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Write `registry` to `path` atomically (temp file + rename).
pub fn save(path: &Path, registry: &Registry) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(registry)?;
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&json).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "registry".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(s: &str) -> PeerId {
        s.parse().unwrap()
    }

    fn three_peers() -> Registry {
        let mut r = Registry::new();
        r.insert(
            peer("10.0.0.1"),
            vec![FileRecord::new("z.txt", 1), FileRecord::new("a.txt", 2)],
        );
        r.insert(peer("10.0.0.2"), vec![]);
        r.insert(peer("::1"), vec![FileRecord::new("movie.mkv", 700_000_000)]);
        r
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.all().is_empty());
    }

    #[test]
    fn persistence_roundtrip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_data.json");
        let registry = three_peers();
        {
            let mut store = JsonFileStore::open(&path).unwrap();
            for (p, files) in &registry {
                store.put(*p, files.clone()).unwrap();
            }
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.all(), registry);
        let files = reopened.get(&peer("10.0.0.1")).unwrap();
        assert_eq!(files[0].filename, "z.txt");
        assert_eq!(files[1].filename, "a.txt");
    }

    #[test]
    fn persisted_form_is_keyed_by_ip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        save(&path, &three_peers()).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["10.0.0.1"][1]["filename"], "a.txt");
        assert_eq!(value["10.0.0.1"][1]["size"], 2);
        assert!(value["10.0.0.2"].as_array().unwrap().is_empty());
        assert!(!dir.path().join("data.json.tmp").exists());
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        store.put(peer("10.0.0.9"), vec![FileRecord::new("x", 3)]).unwrap();
        store.remove(&peer("10.0.0.9")).unwrap();
        assert!(!store.contains(&peer("10.0.0.9")));
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn failed_persist_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone").join("data.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        let err = store.put(peer("10.0.0.3"), vec![]);
        assert!(matches!(err, Err(StoreError::Io { .. })));
        assert!(!store.contains(&peer("10.0.0.3")));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{\"10.0.0.1\": [").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    }

    #[test]
    fn memory_store_snapshot_is_detached() {
        let mut store = MemoryStore::new();
        store.put(peer("10.0.0.1"), vec![FileRecord::new("a", 1)]).unwrap();
        let snapshot = store.all();
        store.remove(&peer("10.0.0.1")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(store.all().is_empty());
    }
}
