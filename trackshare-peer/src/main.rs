// trackshare peer: file server plus one-shot tracker and fetch commands.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trackshare_core::{GetRequest, Reply};
use trackshare_peer::config::{self, Config};
use trackshare_peer::{client, inventory, FileServer};

#[derive(Debug, Parser)]
#[command(name = "trackshare-peer", version, about = "trackshare peer node")]
struct Cli {
    /// Config file (default: ~/.config/trackshare/peer.toml, /etc/trackshare/peer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Tracker as host or host:port
    #[arg(long, global = true)]
    tracker: Option<String>,
    /// Shared directory
    #[arg(long, global = true)]
    shared_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the file server in the foreground
    Serve {
        /// Join the tracker and reconcile before serving
        #[arg(long)]
        announce: bool,
    },
    /// Register with the tracker
    Join,
    /// Sync the shared directory into the tracker's record
    Reconcile,
    /// Regex search over every peer's files
    Search { pattern: String },
    /// List every file on the tracker
    List,
    /// List this peer's files on the tracker
    Mine,
    /// Withdraw one file from the tracker
    Delete { filename: String },
    /// Leave the tracker, dropping all announced files
    Leave,
    /// Download a byte range from another peer into the shared directory
    Fetch {
        /// Peer as host or host:port
        peer: String,
        filename: String,
        start: u64,
        /// Exclusive end offset; omit to read to end of file
        end: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(t) = cli.tracker.clone() {
        cfg.tracker = Some(t);
    }
    if let Some(d) = cli.shared_dir.clone() {
        cfg.shared_dir = d;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, cfg))
}

async fn run(command: Cmd, cfg: Config) -> anyhow::Result<()> {
    inventory::ensure_dir(&cfg.shared_dir)
        .await
        .with_context(|| format!("creating shared dir {}", cfg.shared_dir.display()))?;

    match command {
        Cmd::Serve { announce } => {
            if announce {
                let tracker = tracker_addr(&cfg).await?;
                print_reply(&client::join(tracker).await?);
                report_reconcile(client::reconcile(tracker, &cfg.shared_dir).await?);
            }
            let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.file_server_port));
            let server = FileServer::bind(bind, cfg.shared_dir.clone())
                .await
                .with_context(|| format!("binding file server port {}", cfg.file_server_port))?;
            tokio::select! {
                res = server.run() => res?,
                res = shutdown_signal() => {
                    res?;
                    tracing::info!("file server shutting down");
                }
            }
        }
        Cmd::Join => print_reply(&client::join(tracker_addr(&cfg).await?).await?),
        Cmd::Reconcile => {
            let tracker = tracker_addr(&cfg).await?;
            report_reconcile(client::reconcile(tracker, &cfg.shared_dir).await?);
        }
        Cmd::Search { pattern } => {
            print_reply(&client::search(tracker_addr(&cfg).await?, &pattern).await?)
        }
        Cmd::List => print_reply(&client::list(tracker_addr(&cfg).await?).await?),
        Cmd::Mine => print_reply(&client::list_mine(tracker_addr(&cfg).await?).await?),
        Cmd::Delete { filename } => {
            print_reply(&client::delete(tracker_addr(&cfg).await?, &filename).await?)
        }
        Cmd::Leave => print_reply(&client::leave(tracker_addr(&cfg).await?).await?),
        Cmd::Fetch {
            peer,
            filename,
            start,
            end,
        } => {
            let peer = client::resolve(&peer, cfg.file_server_port).await?;
            let request = GetRequest::new(filename, start, end);
            let n = client::fetch(peer, &cfg.shared_dir, &request).await?;
            println!("File {} downloaded successfully ({} bytes).", request.filename, n);
        }
    }
    Ok(())
}

async fn tracker_addr(cfg: &Config) -> anyhow::Result<SocketAddr> {
    let target = cfg
        .tracker
        .as_deref()
        .context("no tracker configured (use --tracker or TRACKSHARE_TRACKER)")?;
    Ok(client::resolve(target, cfg.tracker_port).await?)
}

fn print_reply(reply: &Reply) {
    println!("{}", reply);
}

fn report_reconcile(report: client::ReconcileReport) {
    if report.joined {
        println!("{}", Reply::ConfirmJoin);
    }
    if report.replies.is_empty() {
        println!("Already in sync.");
    }
    for (command, reply) in report.replies {
        println!("{} -> {}", command, reply);
    }
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
