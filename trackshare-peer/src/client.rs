//! Outbound operations: tracker commands and range fetches from other peers.
//!
//! Every operation opens its own connection. Replies carry no length, so a
//! reply that may be large (listings, search results) is read by closing our
//! write half and reading until the tracker closes the session.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use trackshare_core::{
    is_wire_file_name, parse_listing, plan_reconcile, Command, GetRequest, ReconcilePlan, Reply,
    READ_BUF_SIZE,
};

use crate::error::ClientError;
use crate::inventory;

/// One tracker connection; commands are sent strictly one per round trip.
pub struct TrackerClient {
    stream: TcpStream,
    addr: SocketAddr,
    buf: Vec<u8>,
}

impl TrackerClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        tracing::debug!(tracker = %addr, "connected");
        Ok(Self {
            stream,
            addr,
            buf: vec![0u8; READ_BUF_SIZE],
        })
    }

    /// Our address as the tracker sees it (modulo NAT).
    pub fn local_ip(&self) -> Result<IpAddr, ClientError> {
        Ok(self.stream.local_addr()?.ip())
    }

    async fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        let line = command.to_string();
        tracing::debug!(tracker = %self.addr, command = %line, "send");
        self.stream.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Send `command` and read its reply, keeping the connection open. Meant
    /// for sentinel replies; anything already buffered is taken with it.
    pub async fn request(&mut self, command: &Command) -> Result<Reply, ClientError> {
        self.send(command).await?;
        let n = self.stream.read(&mut self.buf).await?;
        if n == 0 {
            return Err(ClientError::Closed);
        }
        let mut reply = self.buf[..n].to_vec();
        loop {
            match self.stream.try_read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => reply.extend_from_slice(&self.buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Reply::parse(&String::from_utf8_lossy(&reply)))
    }

    /// Send a last `command`, close our write half and read the reply to EOF.
    /// The tracker ends the session on EOF, so the reply is complete no matter
    /// how many reads it spans.
    pub async fn finish(mut self, command: &Command) -> Result<Reply, ClientError> {
        self.send(command).await?;
        self.stream.shutdown().await?;
        let mut reply = Vec::new();
        self.stream.read_to_end(&mut reply).await?;
        if reply.is_empty() {
            return Err(ClientError::Closed);
        }
        Ok(Reply::parse(&String::from_utf8_lossy(&reply)))
    }
}

async fn one_shot(tracker: SocketAddr, command: Command) -> Result<Reply, ClientError> {
    TrackerClient::connect(tracker).await?.finish(&command).await
}

fn unexpected(command: &Command, reply: &Reply) -> ClientError {
    ClientError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}

pub async fn join(tracker: SocketAddr) -> Result<Reply, ClientError> {
    let client = TrackerClient::connect(tracker).await?;
    let addr = client.local_ip()?.to_string();
    client.finish(&Command::Join { addr: Some(addr) }).await
}

pub async fn search(tracker: SocketAddr, pattern: &str) -> Result<Reply, ClientError> {
    one_shot(
        tracker,
        Command::Search {
            pattern: pattern.to_string(),
        },
    )
    .await
}

pub async fn list(tracker: SocketAddr) -> Result<Reply, ClientError> {
    one_shot(tracker, Command::ListFiles).await
}

pub async fn list_mine(tracker: SocketAddr) -> Result<Reply, ClientError> {
    one_shot(tracker, Command::ListMyFiles).await
}

pub async fn leave(tracker: SocketAddr) -> Result<Reply, ClientError> {
    one_shot(tracker, Command::Leave).await
}

pub async fn delete(tracker: SocketAddr, filename: &str) -> Result<Reply, ClientError> {
    one_shot(
        tracker,
        Command::DeleteFile {
            filename: filename.to_string(),
        },
    )
    .await
}

/// What a reconcile did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// The peer was not joined and a JOIN was sent first.
    pub joined: bool,
    pub plan: ReconcilePlan,
    /// Every CREATEFILE/DELETEFILE sent, with the tracker's reply.
    pub replies: Vec<(Command, Reply)>,
}

/// Make the tracker's record of our files match `shared_dir`: announce local
/// files it lacks, withdraw ones we no longer have. Local files are never touched.
pub async fn reconcile(tracker: SocketAddr, shared_dir: &Path) -> Result<ReconcileReport, ClientError> {
    let local = inventory::scan(shared_dir).await?;
    let mut joined = false;

    let remote: Vec<String> = match one_shot(tracker, Command::ListMyFiles).await? {
        Reply::Listing(text) => parse_listing(&text).into_iter().map(|e| e.filename).collect(),
        Reply::NoFiles => Vec::new(),
        Reply::ClientNotFound => {
            match join(tracker).await? {
                Reply::ConfirmJoin | Reply::AlreadyConnected => {}
                other => return Err(unexpected(&Command::Join { addr: None }, &other)),
            }
            joined = true;
            Vec::new()
        }
        other => return Err(unexpected(&Command::ListMyFiles, &other)),
    };

    let plan = plan_reconcile(&local, &remote);
    tracing::info!(
        local = local.len(),
        remote = remote.len(),
        create = plan.create.len(),
        delete = plan.delete.len(),
        "reconcile plan"
    );
    let mut replies = Vec::new();
    if !plan.is_empty() {
        // Fresh connection: nothing of the listing exchange can be read as a reply here.
        let mut client = TrackerClient::connect(tracker).await?;
        for command in plan.commands() {
            let reply = client.request(&command).await?;
            if !reply.is_confirm() {
                tracing::warn!(command = %command, reply = %reply, "reconcile step not confirmed");
            }
            replies.push((command, reply));
        }
    }
    Ok(ReconcileReport {
        joined,
        plan,
        replies,
    })
}

/// Fetch a byte range from `peer` into `shared_dir/<filename>`, overwriting it.
/// A reply of exactly `FILENOTFOUND` or `INVALIDCOMMAND` leaves the local
/// directory untouched. Returns the number of bytes written.
pub async fn fetch(peer: SocketAddr, shared_dir: &Path, request: &GetRequest) -> Result<u64, ClientError> {
    if !is_wire_file_name(&request.filename) {
        return Err(ClientError::InvalidFileName(request.filename.clone()));
    }
    let mut stream = TcpStream::connect(peer)
        .await
        .map_err(|source| ClientError::Connect { addr: peer, source })?;
    stream.write_all(request.to_string().as_bytes()).await?;

    // Hold back the head of the stream until it can no longer be a sentinel.
    let held = Reply::FILE_NOT_FOUND.len().max(Reply::INVALID_COMMAND.len()) + 1;
    let mut head = Vec::with_capacity(held);
    (&mut stream).take(held as u64).read_to_end(&mut head).await?;
    if head == Reply::FILE_NOT_FOUND.as_bytes() {
        return Err(ClientError::RemoteNotFound(request.filename.clone()));
    }
    if head == Reply::INVALID_COMMAND.as_bytes() {
        return Err(ClientError::UnexpectedReply {
            command: request.to_string(),
            reply: Reply::INVALID_COMMAND.to_string(),
        });
    }

    let path = shared_dir.join(&request.filename);
    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(&head).await?;
    let rest = tokio::io::copy(&mut stream, &mut file).await?;
    file.flush().await?;
    let total = head.len() as u64 + rest;
    tracing::info!(%peer, request = %request, bytes = total, path = %path.display(), "fetched");
    Ok(total)
}

/// Resolve `host`, `host:port`, `ip` or `ip:port`, filling in `default_port`.
pub async fn resolve(target: &str, default_port: u16) -> Result<SocketAddr, ClientError> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    let host_port = if target.contains(':') {
        target.to_string()
    } else {
        format!("{}:{}", target, default_port)
    };
    tokio::net::lookup_host(host_port)
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ClientError::Resolve(target.to_string()))
}
