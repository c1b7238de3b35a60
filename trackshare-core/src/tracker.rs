//! Host-driven tracker: the host passes (peer, command) and writes back the reply.
//!
//! Hosts keep one `Tracker` behind a mutex; each `handle` call is one
//! read-modify-persist step against the store.

use regex::Regex;

use crate::protocol::{format_listing, format_own_listing, Command, Reply};
use crate::registry::{FileRecord, PeerId, Registry, RegistryStore};

/// Per-peer protocol state, derived from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not joined, or left.
    Idle,
    /// Joined; registry entry present.
    Active,
}

pub struct Tracker {
    store: Box<dyn RegistryStore>,
}

impl Tracker {
    pub fn new(store: Box<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub fn state_of(&self, peer: &PeerId) -> SessionState {
        if self.store.contains(peer) {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    /// Registry snapshot.
    pub fn snapshot(&self) -> Registry {
        self.store.all()
    }

    /// Parse and handle one raw command line. Malformed input gets `INVALIDCOMMAND`.
    pub fn handle_line(&mut self, peer: PeerId, line: &str) -> Reply {
        match Command::parse(line) {
            Ok(cmd) => self.handle(peer, &cmd),
            Err(e) => {
                tracing::warn!(%peer, line, error = %e, "malformed command");
                Reply::InvalidCommand
            }
        }
    }

    pub fn handle(&mut self, peer: PeerId, command: &Command) -> Reply {
        tracing::debug!(%peer, command = %command, "handle");
        match command {
            Command::Join { addr } => self.join(peer, addr.as_deref()),
            Command::CreateFile { filename, size } => self.create_file(peer, filename, *size),
            Command::DeleteFile { filename } => self.delete_file(peer, filename),
            Command::Search { pattern } => self.search(pattern),
            Command::Leave => self.leave(peer),
            Command::ListFiles => self.list_files(),
            Command::ListMyFiles => self.list_my_files(peer),
        }
    }

    fn join(&mut self, peer: PeerId, announced: Option<&str>) -> Reply {
        if self.store.contains(&peer) {
            return Reply::AlreadyConnected;
        }
        match self.store.put(peer, Vec::new()) {
            Ok(()) => {
                tracing::info!(%peer, announced, "peer joined");
                Reply::ConfirmJoin
            }
            Err(e) => store_failure(peer, "JOIN", e),
        }
    }

    fn create_file(&mut self, peer: PeerId, filename: &str, size: u64) -> Reply {
        let Some(files) = self.store.get(&peer) else {
            return Reply::ClientNotFound;
        };
        if files.iter().any(|f| f.filename == filename) {
            return Reply::AlreadyExists;
        }
        let mut files = files.to_vec();
        files.push(FileRecord::new(filename, size));
        match self.store.put(peer, files) {
            Ok(()) => {
                tracing::info!(%peer, filename, size, "file announced");
                Reply::ConfirmCreateFile
            }
            Err(e) => store_failure(peer, "CREATEFILE", e),
        }
    }

    fn delete_file(&mut self, peer: PeerId, filename: &str) -> Reply {
        let Some(files) = self.store.get(&peer) else {
            return Reply::FileNotFound;
        };
        if !files.iter().any(|f| f.filename == filename) {
            return Reply::FileNotFound;
        }
        let kept: Vec<FileRecord> = files
            .iter()
            .filter(|f| f.filename != filename)
            .cloned()
            .collect();
        match self.store.put(peer, kept) {
            Ok(()) => {
                tracing::info!(%peer, filename, "file withdrawn");
                Reply::ConfirmDeleteFile
            }
            Err(e) => store_failure(peer, "DELETEFILE", e),
        }
    }

    fn search(&self, pattern: &str) -> Reply {
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(pattern, error = %e, "invalid search pattern");
                return Reply::InvalidPattern;
            }
        };
        let registry = self.store.all();
        let hits: Vec<(&PeerId, &FileRecord)> = registry
            .iter()
            .flat_map(|(peer, files)| files.iter().map(move |f| (peer, f)))
            .filter(|(_, f)| regex.is_match(&f.filename))
            .collect();
        if hits.is_empty() {
            Reply::FileNotFound
        } else {
            Reply::Listing(format_listing(hits))
        }
    }

    fn leave(&mut self, peer: PeerId) -> Reply {
        if !self.store.contains(&peer) {
            return Reply::ClientNotFound;
        }
        match self.store.remove(&peer) {
            Ok(()) => {
                tracing::info!(%peer, "peer left");
                Reply::ConfirmLeave
            }
            Err(e) => store_failure(peer, "LEAVE", e),
        }
    }

    fn list_files(&self) -> Reply {
        let registry = self.store.all();
        let text = format_listing(
            registry
                .iter()
                .flat_map(|(peer, files)| files.iter().map(move |f| (peer, f))),
        );
        if text.is_empty() {
            Reply::NoFiles
        } else {
            Reply::Listing(text)
        }
    }

    fn list_my_files(&self, peer: PeerId) -> Reply {
        match self.store.get(&peer) {
            None => Reply::ClientNotFound,
            Some([]) => Reply::NoFiles,
            Some(files) => Reply::Listing(format_own_listing(files)),
        }
    }
}

fn store_failure(peer: PeerId, verb: &str, err: crate::error::StoreError) -> Reply {
    tracing::error!(%peer, verb, error = %err, "registry persist failed");
    Reply::ServerError
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_listing;
    use crate::registry::{JsonFileStore, MemoryStore};

    fn peer(s: &str) -> PeerId {
        s.parse().unwrap()
    }

    fn tracker() -> Tracker {
        Tracker::new(Box::new(MemoryStore::new()))
    }

    fn names(reply: &Reply) -> Vec<String> {
        match reply {
            Reply::Listing(text) => parse_listing(text).into_iter().map(|e| e.filename).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn join_twice() {
        let mut t = tracker();
        let p = peer("10.0.0.1");
        assert_eq!(t.state_of(&p), SessionState::Idle);
        assert_eq!(t.handle_line(p, "JOIN 10.0.0.1"), Reply::ConfirmJoin);
        assert_eq!(t.state_of(&p), SessionState::Active);
        assert_eq!(t.handle_line(p, "JOIN 10.0.0.1"), Reply::AlreadyConnected);
    }

    #[test]
    fn created_file_listed_exactly_once() {
        let mut t = tracker();
        let p = peer("10.0.0.1");
        t.handle_line(p, "JOIN");
        assert_eq!(t.handle_line(p, "CREATEFILE a.txt 5"), Reply::ConfirmCreateFile);
        assert_eq!(t.handle_line(p, "CREATEFILE a.txt 5"), Reply::AlreadyExists);
        let reply = t.handle_line(p, "LISTMYFILES");
        assert_eq!(names(&reply), ["a.txt"]);
        assert_eq!(t.snapshot()[&p].len(), 1);
    }

    #[test]
    fn create_requires_join() {
        let mut t = tracker();
        assert_eq!(
            t.handle_line(peer("10.0.0.1"), "CREATEFILE a.txt 5"),
            Reply::ClientNotFound
        );
        assert!(t.snapshot().is_empty());
    }

    #[test]
    fn same_filename_on_two_peers() {
        let mut t = tracker();
        let (a, b) = (peer("10.0.0.1"), peer("10.0.0.2"));
        t.handle_line(a, "JOIN");
        t.handle_line(b, "JOIN");
        assert_eq!(t.handle_line(a, "CREATEFILE x.bin 1"), Reply::ConfirmCreateFile);
        assert_eq!(t.handle_line(b, "CREATEFILE x.bin 2"), Reply::ConfirmCreateFile);
    }

    #[test]
    fn delete_file() {
        let mut t = tracker();
        let p = peer("10.0.0.1");
        t.handle_line(p, "JOIN");
        t.handle_line(p, "CREATEFILE a.txt 5");
        t.handle_line(p, "CREATEFILE b.txt 6");
        assert_eq!(t.handle_line(p, "DELETEFILE a.txt"), Reply::ConfirmDeleteFile);
        assert_eq!(t.handle_line(p, "DELETEFILE a.txt"), Reply::FileNotFound);
        assert_eq!(names(&t.handle_line(p, "LISTMYFILES")), ["b.txt"]);
        assert_eq!(
            t.handle_line(peer("10.0.0.7"), "DELETEFILE b.txt"),
            Reply::FileNotFound
        );
    }

    #[test]
    fn leave_clears_files() {
        let mut t = tracker();
        let p = peer("10.0.0.1");
        t.handle_line(p, "JOIN");
        t.handle_line(p, "CREATEFILE a.txt 5");
        assert_eq!(t.handle_line(p, "LEAVE"), Reply::ConfirmLeave);
        assert_eq!(t.state_of(&p), SessionState::Idle);
        assert_eq!(t.handle_line(p, "LEAVE"), Reply::ClientNotFound);
        assert_eq!(t.handle_line(p, "JOIN"), Reply::ConfirmJoin);
        assert_eq!(t.handle_line(p, "LISTMYFILES"), Reply::NoFiles);
    }

    #[test]
    fn search_matches_across_peers() {
        let mut t = tracker();
        let (a, b) = (peer("10.0.0.2"), peer("10.0.0.1"));
        for (p, files) in [(a, ["notes.txt", "song.mp3"]), (b, ["todo.txt", "img.png"])] {
            t.handle_line(p, "JOIN");
            for f in files {
                t.handle_line(p, &format!("CREATEFILE {} 1", f));
            }
        }
        let reply = t.handle_line(a, r"SEARCH .*\.txt");
        let entries = match &reply {
            Reply::Listing(text) => parse_listing(text),
            other => panic!("expected listing, got {:?}", other),
        };
        let hits: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.filename.as_str(), e.peer.as_deref().unwrap_or("")))
            .collect();
        // Peer order, then insertion order.
        assert_eq!(hits, [("todo.txt", "10.0.0.1"), ("notes.txt", "10.0.0.2")]);
        assert_eq!(t.handle_line(a, r"SEARCH .*\.txt"), reply);
        assert_eq!(t.handle_line(a, "SEARCH ^zzz"), Reply::FileNotFound);
        assert_eq!(t.handle_line(a, "SEARCH (unclosed"), Reply::InvalidPattern);
    }

    #[test]
    fn list_files() {
        let mut t = tracker();
        assert_eq!(t.handle_line(peer("10.0.0.1"), "LISTFILES"), Reply::NoFiles);
        let p = peer("10.0.0.1");
        t.handle_line(p, "JOIN");
        t.handle_line(p, "CREATEFILE a.txt 5");
        let reply = t.handle_line(peer("10.0.0.99"), "LISTFILES");
        assert_eq!(names(&reply), ["a.txt"]);
    }

    #[test]
    fn list_my_files_requires_join() {
        let mut t = tracker();
        assert_eq!(t.handle_line(peer("10.0.0.1"), "LISTMYFILES"), Reply::ClientNotFound);
    }

    #[test]
    fn malformed_is_invalid_command() {
        let mut t = tracker();
        let p = peer("10.0.0.1");
        assert_eq!(t.handle_line(p, "HELLO"), Reply::InvalidCommand);
        assert_eq!(t.handle_line(p, "CREATEFILE onlyname"), Reply::InvalidCommand);
        assert_eq!(t.handle_line(p, ""), Reply::InvalidCommand);
    }

    #[test]
    fn mutations_are_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_data.json");
        let p = peer("10.0.0.1");
        {
            let mut t = Tracker::new(Box::new(JsonFileStore::open(&path).unwrap()));
            t.handle_line(p, "JOIN");
            t.handle_line(p, "CREATEFILE a.txt 5");
            t.handle_line(p, "CREATEFILE b.txt 9");
        }
        let mut t = Tracker::new(Box::new(JsonFileStore::open(&path).unwrap()));
        assert_eq!(t.handle_line(p, "JOIN"), Reply::AlreadyConnected);
        assert_eq!(names(&t.handle_line(p, "LISTMYFILES")), ["a.txt", "b.txt"]);
    }

    #[test]
    fn persist_failure_reports_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("data.json");
        let mut t = Tracker::new(Box::new(JsonFileStore::open(&path).unwrap()));
        let p = peer("10.0.0.1");
        assert_eq!(t.handle_line(p, "JOIN"), Reply::ServerError);
        assert_eq!(t.state_of(&p), SessionState::Idle);
    }
}
