//! mdraid Server
//!
//! Serves an in-memory JBOD array over TCP using the packet protocol, so
//! the block device can be exercised against a remote array.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mdraid_common::{Config, Geometry};
use mdraid_proto::Command;
use mdraid_storage::Jbod;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::server::JbodServer;

#[derive(Debug, Parser)]
#[command(name = "mdraid-server", about = "mdraid in-memory JBOD server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "mdraid.toml")]
    config: PathBuf,

    /// Listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Number of disks
    #[arg(long)]
    disks: Option<u32>,

    /// Blocks per disk
    #[arg(long)]
    blocks_per_disk: Option<u32>,

    /// Log level (trace / debug / info / warn / error)
    #[arg(long, env = "MDRAID_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_default(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;

    // CLI takes precedence over the config file
    let listen = args.listen.unwrap_or(config.network.listen);
    let geometry = Geometry::new(
        args.disks.unwrap_or(config.geometry.disks()),
        args.blocks_per_disk.unwrap_or(config.geometry.blocks_per_disk()),
    )
    .context("invalid array geometry")?;
    let log_level = args.log_level.unwrap_or(config.logging.level);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        disks = geometry.disks(),
        blocks_per_disk = geometry.blocks_per_disk(),
        capacity = geometry.capacity(),
        "starting mdraid server"
    );

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    let server = Arc::new(JbodServer::new(Jbod::new(geometry)));
    let jbod = server.jbod();

    tokio::select! {
        () = server.serve(listener) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("wait for shutdown signal")?;
        }
    }

    let jbod = jbod.lock();
    for command in Command::ALL {
        info!(command = command.name(), count = jbod.count(command), "operations served");
    }
    info!(total = jbod.ops_issued(), "shutting down");
    Ok(())
}
