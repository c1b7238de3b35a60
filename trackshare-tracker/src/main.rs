// trackshare tracker daemon: load the registry, serve until Ctrl+C or SIGTERM.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use trackshare_core::{JsonFileStore, MemoryStore, RegistryStore, Tracker};
use trackshare_tracker::{config, TrackerServer};

#[derive(Debug, Parser)]
#[command(name = "trackshare-tracker", version, about = "trackshare registry tracker")]
struct Cli {
    /// Config file (default: ~/.config/trackshare/tracker.toml, /etc/trackshare/tracker.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen port
    #[arg(long)]
    port: Option<u16>,
    /// Registry JSON file
    #[arg(long)]
    data_file: Option<PathBuf>,
    /// Cap on concurrently served connections
    #[arg(long)]
    max_connections: Option<usize>,
    /// Keep the registry in memory only
    #[arg(long)]
    ephemeral: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(path) = cli.data_file {
        cfg.data_file = path;
    }
    if cli.max_connections.is_some() {
        cfg.max_connections = cli.max_connections;
    }
    cfg.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let store: Box<dyn RegistryStore> = if cli.ephemeral {
        tracing::info!("registry is in-memory only");
        Box::new(MemoryStore::new())
    } else {
        Box::new(
            JsonFileStore::open(&cfg.data_file)
                .with_context(|| format!("opening registry {}", cfg.data_file.display()))?,
        )
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.port));
        let server = TrackerServer::bind(bind, Tracker::new(store), cfg.max_connections)
            .await
            .with_context(|| format!("binding tracker port {}", cfg.port))?;
        tokio::select! {
            res = server.run() => res?,
            res = shutdown_signal() => {
                res?;
                tracing::info!("tracker shutting down");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
