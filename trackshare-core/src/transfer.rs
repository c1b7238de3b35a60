//! Range transfer: `GET <filename> <offsetStart> [<offsetEnd>]` on the file server port.
//! The reply is the raw byte span; end of stream is connection close.

use std::fmt;

use crate::error::ParseError;
use crate::protocol::parse_u64;

/// A range request. `end` is exclusive; `None` means to end of file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub filename: String,
    pub start: u64,
    pub end: Option<u64>,
}

impl GetRequest {
    pub fn new(filename: impl Into<String>, start: u64, end: Option<u64>) -> Self {
        Self {
            filename: filename.into(),
            start,
            end,
        }
    }

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => Err(ParseError::Empty),
            ["GET", filename, start] => Ok(Self::new(*filename, parse_u64("offsetStart", start)?, None)),
            ["GET", filename, start, end] => Ok(Self::new(
                *filename,
                parse_u64("offsetStart", start)?,
                Some(parse_u64("offsetEnd", end)?),
            )),
            ["GET", ..] => Err(ParseError::Arity {
                verb: "GET",
                expected: "2 or 3",
                got: parts.len() - 1,
            }),
            [verb, ..] => Err(ParseError::UnknownVerb(verb.to_string())),
        }
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let line = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
        Self::parse(line)
    }

    /// Number of bytes this request yields against a file of `file_len` bytes.
    /// A start past EOF, or an end before the start, yields nothing.
    pub fn span_len(&self, file_len: u64) -> u64 {
        if self.start >= file_len {
            return 0;
        }
        let end = self.end.map_or(file_len, |e| e.min(file_len));
        end.saturating_sub(self.start)
    }
}

impl fmt::Display for GetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "GET {} {} {}", self.filename, self.start, end),
            None => write!(f, "GET {} {}", self.filename, self.start),
        }
    }
}

/// Whether `name` addresses a file directly inside the shared directory
/// (no separators, not `.`/`..`, not empty).
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Whether `name` can be announced and requested over the space-delimited
/// wire: a plain file name with no whitespace.
pub fn is_wire_file_name(name: &str) -> bool {
    is_plain_file_name(name) && !name.chars().any(char::is_whitespace)
}
