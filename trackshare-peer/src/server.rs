//! Peer file server: answer `GET` range requests from the shared directory.
//!
//! Each request gets its own task and its own connection; the reply is the raw
//! byte span followed by close, or `FILENOTFOUND` and close.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use trackshare_core::{is_plain_file_name, GetRequest, Reply, READ_BUF_SIZE};

pub struct FileServer {
    listener: TcpListener,
    shared_dir: Arc<PathBuf>,
}

impl FileServer {
    pub async fn bind(addr: SocketAddr, shared_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let shared_dir = Arc::new(shared_dir.into());
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            dir = %shared_dir.display(),
            "file server listening"
        );
        Ok(Self {
            listener,
            shared_dir,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            };
            let dir = self.shared_dir.clone();
            tokio::spawn(async move {
                match serve_request(stream, &dir).await {
                    Ok(sent) => tracing::debug!(%addr, bytes = sent, "request served"),
                    Err(e) => tracing::warn!(%addr, error = %e, "request failed"),
                }
            });
        }
    }
}

/// Serve one request on `stream` and close it. Returns the payload bytes sent.
pub async fn serve_request<S>(mut stream: S, shared_dir: &Path) -> std::io::Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let n = stream.read(&mut buf).await?;
    let request = match GetRequest::parse_bytes(&buf[..n]) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed GET");
            stream.write_all(Reply::INVALID_COMMAND.as_bytes()).await?;
            stream.shutdown().await?;
            return Ok(0);
        }
    };
    tracing::info!(request = %request, "range request");

    let sent = match open_shared(shared_dir, &request.filename).await {
        Some((mut file, len)) => {
            let span = request.span_len(len);
            if span > 0 {
                file.seek(SeekFrom::Start(request.start)).await?;
            }
            tokio::io::copy(&mut file.take(span), &mut stream).await?
        }
        None => {
            stream.write_all(Reply::FILE_NOT_FOUND.as_bytes()).await?;
            0
        }
    };
    stream.shutdown().await?;
    Ok(sent)
}

async fn open_shared(dir: &Path, filename: &str) -> Option<(tokio::fs::File, u64)> {
    if !is_plain_file_name(filename) {
        tracing::warn!(filename, "rejected file name outside the shared directory");
        return None;
    }
    let file = tokio::fs::File::open(dir.join(filename)).await.ok()?;
    let meta = file.metadata().await.ok()?;
    meta.is_file().then(|| (file, meta.len()))
}
