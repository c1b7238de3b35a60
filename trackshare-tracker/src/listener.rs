//! Tracker listener: accept TCP connections and spawn one session task each.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use trackshare_core::{PeerId, Tracker};

use crate::session;

/// The single process-wide tracker, shared by every session.
pub type SharedTracker = Arc<Mutex<Tracker>>;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct TrackerServer {
    listener: TcpListener,
    tracker: SharedTracker,
    /// Connection permits when `max_connections` is set.
    limit: Option<Arc<Semaphore>>,
}

impl TrackerServer {
    /// `max_connections` of `Some(n)` serves at most `n` sessions at once;
    /// config loading rejects a bound of 0.
    pub async fn bind(
        addr: SocketAddr,
        tracker: Tracker,
        max_connections: Option<usize>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, ?max_connections, "tracker listening");
        Ok(Self {
            listener,
            tracker: Arc::new(Mutex::new(tracker)),
            limit: max_connections.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn tracker(&self) -> SharedTracker {
        self.tracker.clone()
    }

    /// Accept forever. Accept errors are logged and retried; session errors
    /// stay inside their task.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            // With a bound, wait for a free slot before taking the next connection.
            let permit = match &self.limit {
                Some(sem) => sem.clone().acquire_owned().await.ok(),
                None => None,
            };
            let (stream, addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let peer = PeerId::from(addr.ip().to_canonical());
            tracing::info!(%addr, %peer, "connection accepted");
            let tracker = self.tracker.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = session::run_session(stream, peer, tracker).await {
                    tracing::warn!(%addr, error = %e, "session ended with error");
                }
            });
        }
    }
}
