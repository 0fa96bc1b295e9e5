//! # TCP Runtime
//!
//! Drives a [`GameServer`] over plain TCP with tokio.
//!
//! One server task owns the `GameServer` and selects over new connections,
//! inbound events and the three periodic loops. Each connection gets a
//! reader task (bytes in) and a writer task (frames out). After every event
//! or tick, the server task drains the command channel and routes frames to
//! the writers. TCP has a single ordered stream, so control and state
//! frames share it in emission order.
//!
//! Each writer buffers at most `outbound_capacity` frames. A connection that
//! falls that far behind is dropped and reported to the server as a lost
//! transport, so one stalled socket cannot grow memory without bound.
//!
//! Plain TCP has no handshake field for a resume id, so every accepted
//! connection is `Connected { resume: None }` and receives a fresh entity id.
//! Snapshot restore on reconnect only happens for transports that carry an id
//! into [`NetworkEvent::Connected`].

use super::{ConnectionId, IdGenerator, NetworkCommand, NetworkEvent, StreamId};
use crate::error::NetResult;
use crate::server::GameServer;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Read buffer per connection.
const READ_BUFFER_SIZE: usize = 4096;

/// Signals a running [`TcpServerRuntime`] to stop.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Requests a graceful shutdown: every session is disconnected, then
    /// the runtime returns the server.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

struct ConnectionHandle {
    outbound: mpsc::Sender<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// tokio TCP front end for the I/O-free server core.
///
/// Accepted connections never resume a previous entity; see the module docs.
pub struct TcpServerRuntime {
    ids: IdGenerator,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TcpServerRuntime {
    /// Creates a runtime.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            ids: IdGenerator::new(),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Handle that stops [`run`](Self::run) from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Binds the server's configured address and runs until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Io`](crate::NetError::Io) if the address cannot be bound.
    pub async fn run(self, server: GameServer, commands: Receiver<NetworkCommand>) -> NetResult<GameServer> {
        let listener = TcpListener::bind(server.config().bind_address).await?;
        tracing::info!(address = %server.config().bind_address, "server listening");
        self.run_with_listener(listener, server, commands).await
    }

    /// Runs the accept loop on a pre-bound listener until shutdown, then
    /// returns the server so the caller can flush persistence.
    ///
    /// # Errors
    ///
    /// Currently infallible once the listener is bound; the signature leaves
    /// room for fatal listener errors.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        mut server: GameServer,
        commands: Receiver<NetworkCommand>,
    ) -> NetResult<GameServer> {
        let (event_tx, mut event_rx) = mpsc::channel::<NetworkEvent>(server.config().command_capacity.max(1));
        let mut connections: HashMap<ConnectionId, ConnectionHandle> = HashMap::new();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let mut movement = ticker(server.config().movement_period());
        let mut hazard = ticker(server.config().hazard_period());
        let mut sweep = ticker(server.config().sweep_period());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                            continue;
                        }
                    };
                    if let Err(error) = stream.set_nodelay(true) {
                        tracing::debug!(%error, "could not disable Nagle");
                    }

                    let conn = self.ids.next_id();
                    let (reader, writer) = stream.into_split();
                    let (outbound, outbound_rx) = mpsc::channel(server.config().outbound_capacity.max(1));
                    tokio::spawn(write_loop(conn, writer, outbound_rx));
                    let reader = tokio::spawn(read_loop(conn, reader, event_tx.clone(), self.shutdown_rx.clone()));
                    connections.insert(conn, ConnectionHandle { outbound, reader });

                    tracing::debug!(%conn, %peer_addr, "accepted connection");
                    server.handle_event(NetworkEvent::Connected { conn, resume: None }, Instant::now());
                }
                Some(event) = event_rx.recv() => {
                    server.handle_event(event, Instant::now());
                }
                _ = movement.tick() => server.movement_tick(),
                _ = hazard.tick() => server.hazard_tick(),
                _ = sweep.tick() => server.heartbeat_sweep(Instant::now()),
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(sessions = server.session_count(), "server shutting down");
                        server.shutdown();
                        settle(&mut server, &commands, &mut connections);
                        break;
                    }
                }
            }

            settle(&mut server, &commands, &mut connections);
        }

        for (_, handle) in connections.drain() {
            handle.reader.abort();
        }
        Ok(server)
    }
}

impl Default for TcpServerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Dispatches until no connection lags, telling the server about every
/// connection dropped on the way.
fn settle(
    server: &mut GameServer,
    commands: &Receiver<NetworkCommand>,
    connections: &mut HashMap<ConnectionId, ConnectionHandle>,
) {
    loop {
        let lagging = dispatch(commands, connections);
        if lagging.is_empty() {
            return;
        }
        for conn in lagging {
            server.handle_event(NetworkEvent::Disconnected { conn }, Instant::now());
        }
    }
}

/// Routes every pending command to its connection's writer.
///
/// Returns the connections whose writer queue was full. They are already
/// removed from `connections`.
fn dispatch(
    commands: &Receiver<NetworkCommand>,
    connections: &mut HashMap<ConnectionId, ConnectionHandle>,
) -> Vec<ConnectionId> {
    let mut lagging = Vec::new();
    for command in commands.try_iter() {
        match command {
            NetworkCommand::Send { conn, frame, .. } => {
                let Some(handle) = connections.get(&conn) else {
                    continue;
                };
                match handle.outbound.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(%conn, "outbound queue full, dropping connection");
                        if let Some(handle) = connections.remove(&conn) {
                            handle.reader.abort();
                        }
                        lagging.push(conn);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(%conn, "writer gone, frame dropped");
                    }
                }
            }
            NetworkCommand::Close { conn } => {
                // Dropping the sender lets the writer flush what it has and
                // shut the socket down.
                if let Some(handle) = connections.remove(&conn) {
                    handle.reader.abort();
                }
            }
        }
    }
    lagging
}

async fn read_loop(
    conn: ConnectionId,
    mut reader: OwnedReadHalf,
    events: mpsc::Sender<NetworkEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        let event = NetworkEvent::Received {
                            conn,
                            stream: StreamId(0),
                            bytes: buf[..n].to_vec(),
                        };
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::debug!(%conn, %error, "read failed");
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
    let _ = events.send(NetworkEvent::Disconnected { conn }).await;
}

async fn write_loop(conn: ConnectionId, mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(error) = writer.write_all(&frame).await {
            tracing::debug!(%conn, %error, "write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
    tracing::trace!(%conn, "writer closed");
}
