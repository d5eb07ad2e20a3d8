//! mdraid CLI
//!
//! Connects to a JBOD server and reads, writes or replays a workload trace
//! through the block device engine.

mod trace;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdraid_block::Mdadm;
use mdraid_client::JbodClient;
use mdraid_common::{Config, MAX_IO_SIZE};
use mdraid_proto::BlockArray;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::trace::Replayer;

#[derive(Parser, Debug)]
#[command(name = "mdraid-cli")]
#[command(about = "mdraid block device client")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "mdraid.toml")]
    config: PathBuf,

    /// JBOD server address
    #[arg(short, long)]
    server: Option<String>,

    /// Enable the block cache with this many entries
    #[arg(long)]
    cache_size: Option<usize>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read bytes and print them as hex
    Read {
        /// Byte address
        #[arg(long)]
        addr: u32,
        /// Number of bytes
        #[arg(long)]
        len: u32,
    },
    /// Write hex-encoded bytes
    Write {
        /// Byte address
        #[arg(long)]
        addr: u32,
        /// Data as hex
        #[arg(long)]
        data: String,
    },
    /// Replay a workload trace file
    Trace {
        /// Trace file
        file: PathBuf,
        /// Check every read against earlier writes in the trace
        #[arg(long)]
        verify: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;
    if let Some(server) = args.server {
        config.network.server = server;
    }
    if let Some(capacity) = args.cache_size {
        config.cache.enabled = true;
        config.cache.capacity = capacity;
    }

    let client = JbodClient::connected(config.network.server.as_str())
        .with_context(|| format!("connect to {}", config.network.server))?;
    let mut mdadm = Mdadm::from_config(client, &config).context("configure block device")?;

    match args.command {
        Commands::Read { addr, len } => {
            mdadm.mount().context("mount")?;
            let data = read_all(&mut mdadm, addr, len)?;
            println!("{}", hex::encode(data));
            mdadm.unmount().context("unmount")?;
        }
        Commands::Write { addr, data } => {
            let data = hex::decode(data.trim()).context("decode hex data")?;
            mdadm.mount().context("mount")?;
            mdadm.grant_write().context("grant write permission")?;
            write_all(&mut mdadm, addr, &data)?;
            mdadm.revoke_write().context("revoke write permission")?;
            mdadm.unmount().context("unmount")?;
            println!("wrote {} bytes at {addr}", data.len());
        }
        Commands::Trace { file, verify } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("read trace {}", file.display()))?;
            let ops = trace::parse(&text)?;
            let summary = Replayer::new(verify).run(&mut mdadm, &ops)?;

            println!(
                "operations: {}, bytes read: {}, bytes written: {}",
                summary.operations, summary.bytes_read, summary.bytes_written
            );
            if verify {
                println!("mismatched reads: {}", summary.mismatches);
            }
            if mdadm.cache().is_enabled() {
                println!("{}", mdadm.cache().hit_rate_report());
            }
            anyhow::ensure!(summary.mismatches == 0, "trace reads did not match");
        }
    }

    let stats = *mdadm.stats();
    info!(
        primitives = stats.primitives,
        per_op = stats.primitives_per_op(),
        "session finished"
    );
    mdadm.into_array().disconnect();
    Ok(())
}

/// Read a range of any length in `MAX_IO_SIZE` pieces
fn read_all<A: BlockArray>(mdadm: &mut Mdadm<A>, addr: u32, len: u32) -> Result<Vec<u8>> {
    let mut data = vec![0u8; len as usize];
    for (index, chunk) in data.chunks_mut(MAX_IO_SIZE as usize).enumerate() {
        let offset = u32::try_from(index)? * MAX_IO_SIZE;
        let chunk_len = u32::try_from(chunk.len())?;
        let at = addr.checked_add(offset).context("address overflow")?;
        mdadm
            .read(at, chunk_len, chunk)
            .with_context(|| format!("read {chunk_len} bytes at {at}"))?;
    }
    Ok(data)
}

/// Write a buffer of any length in `MAX_IO_SIZE` pieces
fn write_all<A: BlockArray>(mdadm: &mut Mdadm<A>, addr: u32, data: &[u8]) -> Result<()> {
    for (index, chunk) in data.chunks(MAX_IO_SIZE as usize).enumerate() {
        let offset = u32::try_from(index)? * MAX_IO_SIZE;
        let chunk_len = u32::try_from(chunk.len())?;
        let at = addr.checked_add(offset).context("address overflow")?;
        mdadm
            .write(at, chunk_len, chunk)
            .with_context(|| format!("write {chunk_len} bytes at {at}"))?;
    }
    Ok(())
}
