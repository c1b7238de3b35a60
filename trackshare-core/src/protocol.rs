//! Tracker wire protocol: command verbs, sentinel replies, listing text.
//!
//! Framing: one space-delimited ASCII command per write, one reply per write.
//! There is no length prefix; a trailing newline on a command is tolerated.

use std::fmt;

use crate::error::ParseError;
use crate::registry::{FileRecord, PeerId};

/// Default tracker listen port.
pub const TRACKER_PORT: u16 = 1234;
/// Default peer file server listen port.
pub const FILE_SERVER_PORT: u16 = 1235;
/// Size of one receive buffer for a command or a tracker reply.
pub const READ_BUF_SIZE: usize = 64 * 1024;

const LISTING_SEPARATOR: &str = "----------";

/// A command sent by a peer to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register the calling peer. The address argument is informational only;
    /// identity is always the connection's source IP.
    Join { addr: Option<String> },
    /// Announce a hosted file.
    CreateFile { filename: String, size: u64 },
    /// Withdraw a hosted file.
    DeleteFile { filename: String },
    /// Regex search over every peer's filenames.
    Search { pattern: String },
    /// Drop the calling peer and all its files.
    Leave,
    /// Every file of every peer.
    ListFiles,
    /// The calling peer's own files.
    ListMyFiles,
}

impl Command {
    /// Parse one command line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(ParseError::Empty)?;
        let args: Vec<&str> = parts.collect();
        match verb {
            "JOIN" => match args.as_slice() {
                [] => Ok(Command::Join { addr: None }),
                [addr] => Ok(Command::Join {
                    addr: Some(addr.to_string()),
                }),
                _ => Err(arity("JOIN", "0 or 1", args.len())),
            },
            "CREATEFILE" => match args.as_slice() {
                [filename, size] => Ok(Command::CreateFile {
                    filename: filename.to_string(),
                    size: parse_u64("size", size)?,
                }),
                _ => Err(arity("CREATEFILE", "2", args.len())),
            },
            "DELETEFILE" => match args.as_slice() {
                [filename] => Ok(Command::DeleteFile {
                    filename: filename.to_string(),
                }),
                _ => Err(arity("DELETEFILE", "1", args.len())),
            },
            "SEARCH" => match args.as_slice() {
                [pattern] => Ok(Command::Search {
                    pattern: pattern.to_string(),
                }),
                _ => Err(arity("SEARCH", "1", args.len())),
            },
            "LEAVE" => no_args(Command::Leave, "LEAVE", &args),
            "LISTFILES" => no_args(Command::ListFiles, "LISTFILES", &args),
            "LISTMYFILES" => no_args(Command::ListMyFiles, "LISTMYFILES", &args),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }

    /// Parse a raw command read from a socket.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let line = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
        Self::parse(line)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Join { .. } => "JOIN",
            Command::CreateFile { .. } => "CREATEFILE",
            Command::DeleteFile { .. } => "DELETEFILE",
            Command::Search { .. } => "SEARCH",
            Command::Leave => "LEAVE",
            Command::ListFiles => "LISTFILES",
            Command::ListMyFiles => "LISTMYFILES",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Join { addr: Some(addr) } => write!(f, "JOIN {}", addr),
            Command::CreateFile { filename, size } => write!(f, "CREATEFILE {} {}", filename, size),
            Command::DeleteFile { filename } => write!(f, "DELETEFILE {}", filename),
            Command::Search { pattern } => write!(f, "SEARCH {}", pattern),
            other => f.write_str(other.verb()),
        }
    }
}

fn arity(verb: &'static str, expected: &'static str, got: usize) -> ParseError {
    ParseError::Arity { verb, expected, got }
}

fn no_args(cmd: Command, verb: &'static str, args: &[&str]) -> Result<Command, ParseError> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(arity(verb, "0", args.len()))
    }
}

pub(crate) fn parse_u64(field: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Tracker reply. Everything except `Listing` is a machine-checkable sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ConfirmJoin,
    ConfirmCreateFile,
    ConfirmDeleteFile,
    ConfirmLeave,
    AlreadyConnected,
    AlreadyExists,
    /// Missing file on DELETEFILE, or no SEARCH match. Also sent by the file server.
    FileNotFound,
    /// Peer is not joined (LEAVE, CREATEFILE, LISTMYFILES).
    ClientNotFound,
    InvalidPattern,
    NoFiles,
    InvalidCommand,
    /// The registry could not be persisted; the mutation was not applied.
    ServerError,
    /// Human-readable listing text.
    Listing(String),
}

impl Reply {
    pub const CONFIRM_JOIN: &'static str = "CONFIRMJOIN";
    pub const CONFIRM_CREATE_FILE: &'static str = "CONFIRMCREATEFILE";
    pub const CONFIRM_DELETE_FILE: &'static str = "CONFIRMDELETEFILE";
    pub const CONFIRM_LEAVE: &'static str = "CONFIRMLEAVE";
    pub const ALREADY_CONNECTED: &'static str = "CLIENTALREADYCONNECTED";
    pub const ALREADY_EXISTS: &'static str = "FILEALREADYEXISTS";
    pub const FILE_NOT_FOUND: &'static str = "FILENOTFOUND";
    pub const CLIENT_NOT_FOUND: &'static str = "CLIENTNOTFOUND";
    pub const INVALID_PATTERN: &'static str = "INVALIDREGEX";
    pub const NO_FILES: &'static str = "NOFILES";
    pub const INVALID_COMMAND: &'static str = "INVALIDCOMMAND";
    pub const SERVER_ERROR: &'static str = "SERVERERROR";

    /// Wire text of this reply.
    pub fn as_wire(&self) -> &str {
        match self {
            Reply::ConfirmJoin => Self::CONFIRM_JOIN,
            Reply::ConfirmCreateFile => Self::CONFIRM_CREATE_FILE,
            Reply::ConfirmDeleteFile => Self::CONFIRM_DELETE_FILE,
            Reply::ConfirmLeave => Self::CONFIRM_LEAVE,
            Reply::AlreadyConnected => Self::ALREADY_CONNECTED,
            Reply::AlreadyExists => Self::ALREADY_EXISTS,
            Reply::FileNotFound => Self::FILE_NOT_FOUND,
            Reply::ClientNotFound => Self::CLIENT_NOT_FOUND,
            Reply::InvalidPattern => Self::INVALID_PATTERN,
            Reply::NoFiles => Self::NO_FILES,
            Reply::InvalidCommand => Self::INVALID_COMMAND,
            Reply::ServerError => Self::SERVER_ERROR,
            Reply::Listing(text) => text,
        }
    }

    /// Classify reply text received from a tracker.
    pub fn parse(text: &str) -> Reply {
        match text.trim() {
            Self::CONFIRM_JOIN => Reply::ConfirmJoin,
            Self::CONFIRM_CREATE_FILE => Reply::ConfirmCreateFile,
            Self::CONFIRM_DELETE_FILE => Reply::ConfirmDeleteFile,
            Self::CONFIRM_LEAVE => Reply::ConfirmLeave,
            Self::ALREADY_CONNECTED => Reply::AlreadyConnected,
            Self::ALREADY_EXISTS => Reply::AlreadyExists,
            Self::FILE_NOT_FOUND => Reply::FileNotFound,
            Self::CLIENT_NOT_FOUND => Reply::ClientNotFound,
            Self::INVALID_PATTERN => Reply::InvalidPattern,
            Self::NO_FILES => Reply::NoFiles,
            Self::INVALID_COMMAND => Reply::InvalidCommand,
            Self::SERVER_ERROR => Reply::ServerError,
            _ => Reply::Listing(text.to_string()),
        }
    }

    /// True for the CONFIRM* family.
    pub fn is_confirm(&self) -> bool {
        matches!(
            self,
            Reply::ConfirmJoin
                | Reply::ConfirmCreateFile
                | Reply::ConfirmDeleteFile
                | Reply::ConfirmLeave
        )
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One record as seen in listing text. `peer` and `size` are absent when the
/// listing did not carry them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub filename: String,
    pub peer: Option<String>,
    pub size: Option<u64>,
}

/// SEARCH / LISTFILES format: one block per record, each starting with a newline.
pub fn format_listing<'a>(entries: impl IntoIterator<Item = (&'a PeerId, &'a FileRecord)>) -> String {
    let mut out = String::new();
    for (peer, record) in entries {
        out.push_str(&format!(
            "\n{}\nName: {}\nIP: {}\nSize: {}",
            LISTING_SEPARATOR, record.filename, peer, record.size
        ));
    }
    out
}

/// LISTMYFILES format: `Name:` and `Size:` lines per record.
pub fn format_own_listing(records: &[FileRecord]) -> String {
    records
        .iter()
        .map(|r| format!("Name: {}\nSize: {}", r.filename, r.size))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse either listing format. Every `Name: ` line starts a new entry; lines
/// that carry no recognised field are skipped.
pub fn parse_listing(text: &str) -> Vec<ListingEntry> {
    let mut out: Vec<ListingEntry> = Vec::new();
    for line in text.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Name: ") {
            out.push(ListingEntry {
                filename: name.trim().to_string(),
                peer: None,
                size: None,
            });
        } else if let Some(ip) = line.strip_prefix("IP: ") {
            if let Some(last) = out.last_mut() {
                last.peer = Some(ip.trim().to_string());
            }
        } else if let Some(size) = line.strip_prefix("Size: ") {
            if let Some(last) = out.last_mut() {
                last.size = size.trim().parse().ok();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_every_verb() {
        assert_eq!(
            Command::parse("JOIN 10.0.0.1").unwrap(),
            Command::Join {
                addr: Some("10.0.0.1".into())
            }
        );
        assert_eq!(Command::parse("JOIN").unwrap(), Command::Join { addr: None });
        assert_eq!(
            Command::parse("CREATEFILE a.txt 5\n").unwrap(),
            Command::CreateFile {
                filename: "a.txt".into(),
                size: 5
            }
        );
        assert_eq!(
            Command::parse("DELETEFILE a.txt").unwrap(),
            Command::DeleteFile {
                filename: "a.txt".into()
            }
        );
        assert_eq!(
            Command::parse("SEARCH .*\\.txt").unwrap(),
            Command::Search {
                pattern: ".*\\.txt".into()
            }
        );
        assert_eq!(Command::parse("LEAVE").unwrap(), Command::Leave);
        assert_eq!(Command::parse("LISTFILES").unwrap(), Command::ListFiles);
        assert_eq!(Command::parse("LISTMYFILES").unwrap(), Command::ListMyFiles);
    }

    #[test]
    fn malformed_commands() {
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert!(matches!(
            Command::parse("FETCH x"),
            Err(ParseError::UnknownVerb(v)) if v == "FETCH"
        ));
        assert!(matches!(
            Command::parse("CREATEFILE a.txt"),
            Err(ParseError::Arity { verb: "CREATEFILE", got: 1, .. })
        ));
        assert!(matches!(
            Command::parse("CREATEFILE a.txt -3"),
            Err(ParseError::InvalidNumber { field: "size", .. })
        ));
        assert!(matches!(
            Command::parse("LEAVE now"),
            Err(ParseError::Arity { verb: "LEAVE", .. })
        ));
        assert_eq!(Command::parse_bytes(&[0xff, 0xfe]), Err(ParseError::NotUtf8));
    }

    #[test]
    fn display_is_parseable() {
        let cmds = [
            Command::Join {
                addr: Some("192.168.1.4".into()),
            },
            Command::CreateFile {
                filename: "movie.mkv".into(),
                size: 1_000_000,
            },
            Command::Search {
                pattern: "^m".into(),
            },
            Command::ListMyFiles,
        ];
        for cmd in cmds {
            assert_eq!(Command::parse(&cmd.to_string()).unwrap(), cmd);
        }
    }

    #[test]
    fn reply_sentinels_classify() {
        assert_eq!(Reply::parse("CONFIRMJOIN"), Reply::ConfirmJoin);
        assert_eq!(Reply::parse("FILENOTFOUND\n"), Reply::FileNotFound);
        assert!(Reply::parse("CONFIRMLEAVE").is_confirm());
        assert!(!Reply::AlreadyExists.is_confirm());
        assert!(matches!(
            Reply::parse("\n----------\nName: a\nIP: 1.2.3.4\nSize: 1"),
            Reply::Listing(_)
        ));
    }

    #[test]
    fn listing_parses_both_formats() {
        let peer: PeerId = "10.0.0.2".parse().unwrap();
        let a = FileRecord::new("a.txt", 5);
        let b = FileRecord::new("b.txt", 9);
        let text = format_listing([(&peer, &a), (&peer, &b)]);
        assert!(text.starts_with("\n----------\nName: a.txt"));
        let entries = parse_listing(&text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].filename, "b.txt");
        assert_eq!(entries[1].peer.as_deref(), Some("10.0.0.2"));
        assert_eq!(entries[1].size, Some(9));

        let own = parse_listing(&format_own_listing(&[a, b]));
        let names: Vec<&str> = own.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(own[0].peer, None);
        assert_eq!(own[0].size, Some(5));
    }
}
