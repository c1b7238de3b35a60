//! Error types shared by the tracker and peer hosts.

use std::path::PathBuf;

/// A command or GET line that could not be parsed (unknown verb, wrong arity, bad number).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    #[error("{verb} expects {expected} argument(s), got {got}")]
    Arity {
        verb: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("{field} is not a non-negative integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("command is not valid UTF-8")]
    NotUtf8,
}

/// Failure loading or persisting the registry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
