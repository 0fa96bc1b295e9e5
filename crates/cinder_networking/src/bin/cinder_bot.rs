//! # Cinder Bot
//!
//! Headless client: walks a square, pings, predicts hazard damage and logs
//! how often the server corrected it.
//!
//! ## Usage
//!
//! ```bash
//! cinder_bot --server 127.0.0.1:4433 --map assets/lava.map --duration 30
//! ```

use cinder_core::{Intent, TileMap};
use cinder_networking::{init_logging, ClientConfig, ClientEvent, GameClient, NetResult, ReconciliationResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep_until, MissedTickBehavior};

/// Intents per side of the walked square.
const STEPS_PER_SIDE: usize = 30;

/// Walking pattern, one side at a time.
const PATTERN: [Intent; 4] = [Intent::RIGHT, Intent::DOWN, Intent::LEFT, Intent::UP];

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    server: Option<SocketAddr>,
    map: Option<PathBuf>,
    duration: Option<u64>,
    help: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => args.config = iter.next().map(PathBuf::from),
            "--server" | "-s" => args.server = iter.next().and_then(|s| s.parse().ok()),
            "--map" | "-m" => args.map = iter.next().map(PathBuf::from),
            "--duration" | "-d" => args.duration = iter.next().and_then(|s| s.parse().ok()),
            "--help" | "-h" => args.help = true,
            other => eprintln!("ignoring unknown argument: {other}"),
        }
    }
    args
}

fn print_help() {
    println!("Usage: cinder_bot [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>     TOML client config");
    println!("  -s, --server <ADDR>     Server address, overrides server_address");
    println!("  -m, --map <PATH>        Tile map for local hazard prediction");
    println!("  -d, --duration <SECS>   Run for N seconds then disconnect");
    println!("  -h, --help              Show this help");
}

#[derive(Debug, Default)]
struct BotStats {
    intents: u64,
    corrections: u64,
    pongs: u64,
    predicted_damage: u64,
}

#[tokio::main]
async fn main() -> NetResult<()> {
    let args = parse_args();
    if args.help {
        print_help();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = args.server {
        config.server_address = server;
    }

    init_logging("info");

    let terrain = match &args.map {
        Some(path) => TileMap::load(path)?,
        None => TileMap::empty(),
    };

    let stream = TcpStream::connect(config.server_address).await?;
    stream.set_nodelay(true)?;
    tracing::info!(server = %config.server_address, "connected");
    let (mut reader, mut writer) = stream.into_split();

    let start = Instant::now();
    let deadline = args.duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut client = GameClient::new(&config, start);
    let mut stats = BotStats::default();

    let mut input = interval(config.input_interval());
    input.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ping = interval(config.ping_interval());
    let mut hazard = interval(config.hazard_interval());
    let mut buf = [0u8; 4096];
    let mut step = 0usize;

    loop {
        tokio::select! {
            result = reader.read(&mut buf) => {
                let n = match result {
                    Ok(0) => {
                        tracing::warn!("server closed the connection");
                        break;
                    }
                    Ok(n) => n,
                    Err(error) => {
                        tracing::warn!(%error, "read failed");
                        break;
                    }
                };
                for event in client.receive(&buf[..n], Instant::now()) {
                    match event {
                        ClientEvent::Reconciled(ReconciliationResult::Corrected { .. }) => stats.corrections += 1,
                        ClientEvent::Pong => stats.pongs += 1,
                        ClientEvent::Welcomed { id } => tracing::info!(%id, "playing"),
                        other => tracing::debug!(?other, "event"),
                    }
                }
            }
            _ = input.tick() => {
                let intent = PATTERN[(step / STEPS_PER_SIDE) % PATTERN.len()];
                if let Some(frame) = client.send_intent(intent) {
                    writer.write_all(&frame).await?;
                    stats.intents += 1;
                    step += 1;
                }
            }
            _ = ping.tick() => {
                if client.is_server_lost(Instant::now()) {
                    tracing::warn!("server stopped answering");
                    break;
                }
                if let Some(frame) = client.heartbeat(Instant::now()) {
                    writer.write_all(&frame).await?;
                }
            }
            _ = hazard.tick() => {
                if client.predict_hazard(&terrain) {
                    stats.predicted_damage += 1;
                }
            }
            () = sleep_until_deadline(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(mirror) = client.mirror() {
        tracing::info!(
            id = %mirror.id(),
            x = mirror.position().x,
            y = mirror.position().y,
            health = mirror.health(),
            peers = client.peers().len(),
            intents = stats.intents,
            corrections = stats.corrections,
            pongs = stats.pongs,
            predicted_damage = stats.predicted_damage,
            "bot finished"
        );
    }
    let frame = client.disconnect();
    if let Err(error) = writer.write_all(&frame).await {
        tracing::debug!(%error, "disconnect not delivered");
    }
    let _ = writer.shutdown().await;
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
