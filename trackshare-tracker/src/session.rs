//! Per-connection session: one command per read, one reply per command.
//!
//! The session ends when the peer closes or a read yields no data. Closing
//! never implies LEAVE; the registry entry stays until an explicit LEAVE.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use trackshare_core::{PeerId, Reply, Tracker, READ_BUF_SIZE};

use crate::listener::SharedTracker;

/// Drive one connection until EOF. I/O errors end only this session.
pub async fn run_session<S>(mut stream: S, peer: PeerId, tracker: SharedTracker) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf[..n]);
        tracing::debug!(%peer, bytes = n, "command read");
        let mut lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            lines.push("");
        }
        // Several newline-separated commands in one read are answered in order.
        for line in lines {
            let reply = {
                let mut guard = tracker.lock().await;
                handle_blocking(&mut guard, peer, line)
            };
            stream.write_all(reply.as_wire().as_bytes()).await?;
            stream.flush().await?;
        }
    }
    tracing::debug!(%peer, "session closed");
    Ok(())
}

/// Mutations persist the registry with blocking file I/O. On a multi-thread
/// runtime that runs under `block_in_place` so other sessions keep their worker.
fn handle_blocking(tracker: &mut Tracker, peer: PeerId, line: &str) -> Reply {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(|| tracker.handle_line(peer, line))
        }
        _ => tracker.handle_line(peer, line),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Mutex;
    use trackshare_core::{FileRecord, JsonFileStore, MemoryStore};

    use super::*;

    async fn exchange(client: &mut tokio::io::DuplexStream, cmd: &str) -> String {
        client.write_all(cmd.as_bytes()).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn commands_processed_in_order_on_one_connection() {
        let tracker: SharedTracker = Arc::new(Mutex::new(Tracker::new(Box::new(MemoryStore::new()))));
        let peer: PeerId = "10.1.1.1".parse().unwrap();
        let (mut client, server) = duplex(READ_BUF_SIZE);
        let task = tokio::spawn(run_session(server, peer, tracker.clone()));

        assert_eq!(exchange(&mut client, "JOIN 10.1.1.1").await, Reply::CONFIRM_JOIN);
        assert_eq!(exchange(&mut client, "CREATEFILE a.txt 5").await, Reply::CONFIRM_CREATE_FILE);
        assert_eq!(exchange(&mut client, "CREATEFILE a.txt 5").await, Reply::ALREADY_EXISTS);
        assert_eq!(exchange(&mut client, "BOGUS").await, Reply::INVALID_COMMAND);
        assert_eq!(exchange(&mut client, "\n").await, Reply::INVALID_COMMAND);
        assert_eq!(exchange(&mut client, "LISTMYFILES").await, "Name: a.txt\nSize: 5");

        drop(client);
        task.await.unwrap().unwrap();
        // Disconnect is not LEAVE.
        assert_eq!(tracker.lock().await.snapshot()[&peer].len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn persisting_session_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_data.json");
        let store = JsonFileStore::open(&path).unwrap();
        let tracker: SharedTracker = Arc::new(Mutex::new(Tracker::new(Box::new(store))));
        let peer: PeerId = "10.1.1.3".parse().unwrap();
        let (mut client, server) = duplex(READ_BUF_SIZE);
        let task = tokio::spawn(run_session(server, peer, tracker.clone()));

        assert_eq!(exchange(&mut client, "JOIN").await, Reply::CONFIRM_JOIN);
        assert_eq!(exchange(&mut client, "CREATEFILE c.txt 2").await, Reply::CONFIRM_CREATE_FILE);
        drop(client);
        task.await.unwrap().unwrap();

        let persisted = trackshare_core::registry::load(&path).unwrap();
        assert_eq!(persisted[&peer], [FileRecord::new("c.txt", 2)]);
    }

    #[tokio::test]
    async fn newline_separated_commands_in_one_write() {
        let tracker: SharedTracker = Arc::new(Mutex::new(Tracker::new(Box::new(MemoryStore::new()))));
        let peer: PeerId = "10.1.1.2".parse().unwrap();
        let (mut client, server) = duplex(READ_BUF_SIZE);
        tokio::spawn(run_session(server, peer, tracker.clone()));

        client.write_all(b"JOIN\nCREATEFILE b.txt 9\n").await.unwrap();
        let expected = format!("{}{}", Reply::CONFIRM_JOIN, Reply::CONFIRM_CREATE_FILE);
        let mut got = vec![0u8; expected.len()];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(String::from_utf8(got).unwrap(), expected);
    }
}
