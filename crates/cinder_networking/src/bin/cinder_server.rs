//! # Cinder Server
//!
//! The authoritative server over TCP.
//!
//! ## Usage
//!
//! ```bash
//! cinder_server --config server.toml --map assets/lava.map --bind 0.0.0.0:4433
//! ```

use cinder_core::TileMap;
use cinder_networking::{
    init_logging, GameServer, MemoryStore, NetResult, ServerConfig, TcpServerRuntime, WriteBehindQueue,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long shutdown waits for queued snapshots.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    map: Option<PathBuf>,
    bind: Option<SocketAddr>,
    help: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => args.config = iter.next().map(PathBuf::from),
            "--map" | "-m" => args.map = iter.next().map(PathBuf::from),
            "--bind" | "-b" => args.bind = iter.next().and_then(|s| s.parse().ok()),
            "--help" | "-h" => args.help = true,
            other => eprintln!("ignoring unknown argument: {other}"),
        }
    }
    args
}

fn print_help() {
    println!("Usage: cinder_server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>   TOML config file (default: built-in defaults)");
    println!("  -m, --map <PATH>      Tile map file, overrides map_path");
    println!("  -b, --bind <ADDR>     Listen address, overrides bind_address");
    println!("  -h, --help            Show this help");
}

#[tokio::main]
async fn main() -> NetResult<()> {
    let args = parse_args();
    if args.help {
        print_help();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if args.map.is_some() {
        config.map_path = args.map;
    }
    config.validate()?;

    init_logging(&config.log_level);

    let terrain = match &config.map_path {
        Some(path) => {
            let map = TileMap::load(path)?;
            tracing::info!(path = %path.display(), tiles = map.len(), "map loaded");
            map
        }
        None => {
            tracing::warn!("no map configured, every tile is walkable");
            TileMap::empty()
        }
    };

    let store = Arc::new(MemoryStore::new());
    let queue = WriteBehindQueue::start(store.clone(), &config.persistence)?;
    let (server, commands) = GameServer::new(config, Arc::new(terrain), store, queue);

    let runtime = TcpServerRuntime::new();
    let shutdown = runtime.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    let server = runtime.run(server, commands).await?;

    let flushed = server.persistence().flush(FLUSH_TIMEOUT);
    let persisted = server.persistence().stats();
    tracing::info!(
        flushed,
        saved = persisted.saved,
        dropped = persisted.dropped,
        failed = persisted.failed,
        stats = ?server.stats(),
        "server stopped"
    );
    Ok(())
}
