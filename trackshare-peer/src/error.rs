//! Errors surfaced by peer client operations. Every failure is terminal for
//! its one request; nothing here is retried.

use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connecting to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not resolve {0:?}")]
    Resolve(String),
    #[error("remote closed the connection without replying")]
    Closed,
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },
    #[error("remote peer does not have {0}")]
    RemoteNotFound(String),
    #[error("not a plain file name: {0:?}")]
    InvalidFileName(String),
}
