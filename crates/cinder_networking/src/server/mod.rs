//! # Authoritative Server
//!
//! The single owner of every session. All mutation happens through
//! `&mut GameServer`, so one execution context (the runtime's server task)
//! serializes inbound messages and the three periodic loops.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        GAME SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  NetworkEvent ──▶ handle_event ──▶ SessionRegistry          │
//! │                                        │                    │
//! │  movement_tick (60Hz) ─────────────────┤                    │
//! │  hazard_tick   (2Hz)  ─────────────────┤                    │
//! │  heartbeat_sweep      ─────────────────┘                    │
//! │                                                             │
//! │  fan-out ──▶ NetworkCommand channel ──▶ transport           │
//! │  changes ──▶ WriteBehindQueue ──▶ SnapshotStore             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fan-out Rules
//!
//! | Change | Owner | Every other session |
//! |--------|-------|---------------------|
//! | join | tag 0, then tag 2 per peer | tag 2 |
//! | movement | tag 4 | tag 1 |
//! | damage | tag 7 | tag 8 |
//! | respawn | tag 7 + tag 4 | tag 1 + tag 8 |
//! | leave | | tag 3 |

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{IntentRejection, Session, MAX_PENDING_INTENTS};

use crate::config::ServerConfig;
use crate::persistence::{SnapshotStore, WriteBehindQueue};
use crate::protocol::{ClientMessage, ServerMessage, CONTROL_DISCONNECT};
use crate::transport::{ConnectionId, NetworkCommand, NetworkEvent, StreamId, StreamKind};
use cinder_core::{apply_hazard, EntityId, HazardOutcome, TileMap};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::time::Instant;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client sent a disconnect control message.
    Requested,
    /// Transport reported the connection gone.
    TransportClosed,
    /// No heartbeat within the timeout.
    TimedOut,
    /// Server shutting down.
    Shutdown,
}

/// Server counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Sessions registered.
    pub connects: u64,
    /// Handshakes abandoned before registration.
    pub rejected: u64,
    /// Sessions removed for any reason.
    pub disconnects: u64,
    /// Sessions removed by the liveness sweep.
    pub timeouts: u64,
    /// Intents queued.
    pub intents_accepted: u64,
    /// Intents dropped (no direction, stale, overflow).
    pub intents_dropped: u64,
    /// Payloads that failed to decode.
    pub decode_errors: u64,
    /// Hazard deaths.
    pub respawns: u64,
    /// Outbound frames lost to a full or closed command channel.
    pub send_failures: u64,
}

/// The authoritative game server.
pub struct GameServer {
    config: ServerConfig,
    registry: SessionRegistry,
    terrain: Arc<TileMap>,
    store: Arc<dyn SnapshotStore>,
    persistence: WriteBehindQueue,
    command_tx: Sender<NetworkCommand>,
    stats: ServerStats,
}

impl GameServer {
    /// Creates a server and the channel its commands come out of.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        terrain: Arc<TileMap>,
        store: Arc<dyn SnapshotStore>,
        persistence: WriteBehindQueue,
    ) -> (Self, Receiver<NetworkCommand>) {
        let (command_tx, command_rx) = bounded(config.command_capacity.max(1));
        let server = Self {
            config,
            registry: SessionRegistry::new(),
            terrain,
            store,
            persistence,
            command_tx,
            stats: ServerStats::default(),
        };
        (server, command_rx)
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live sessions.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Snapshot write-behind queue.
    #[must_use]
    pub const fn persistence(&self) -> &WriteBehindQueue {
        &self.persistence
    }

    /// Current counters.
    #[must_use]
    pub const fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Dispatches one transport event.
    pub fn handle_event(&mut self, event: NetworkEvent, now: Instant) {
        match event {
            NetworkEvent::Connected { conn, resume } => self.handle_connect(conn, resume, now),
            NetworkEvent::Received { conn, stream, bytes } => self.handle_bytes(conn, stream, &bytes, now),
            NetworkEvent::Disconnected { conn } => {
                if let Some(id) = self.registry.id_for(conn) {
                    self.disconnect(id, DisconnectReason::TransportClosed);
                }
            }
        }
    }

    fn handle_connect(&mut self, conn: ConnectionId, resume: Option<EntityId>, now: Instant) {
        // A repeated event must not touch the session already on this conn.
        if self.registry.id_for(conn).is_some() {
            tracing::warn!(%conn, "connection already registered, ignoring");
            self.stats.rejected += 1;
            return;
        }
        if self.registry.len() >= self.config.max_clients {
            tracing::warn!(%conn, "server full, refusing connection");
            self.stats.rejected += 1;
            self.close(conn);
            return;
        }

        let id = match resume {
            Some(id) if !self.registry.contains(id) => id,
            _ => self.fresh_id(),
        };

        let world = &self.config.world;
        let restored = match self.store.get(id) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(%id, %error, "snapshot load failed, spawning fresh");
                None
            }
        };
        let position = restored.map_or_else(|| world.spawn(), |s| world.clamp(s.position));
        let session = Session::new(id, conn, position, world, now);

        if !self.send(conn, StreamKind::Control, session.welcome().to_frame()) {
            tracing::warn!(%conn, %id, "handshake failed, dropping connection");
            self.stats.rejected += 1;
            self.close(conn);
            return;
        }

        let newcomer = session.joined().to_frame();
        let existing: Vec<(ConnectionId, Vec<u8>)> = self
            .registry
            .iter()
            .map(|s| (s.conn, s.joined().to_frame()))
            .collect();
        for (other_conn, frame) in existing {
            self.send(conn, StreamKind::State, frame);
            self.send(other_conn, StreamKind::State, newcomer.clone());
        }

        let snapshot = session.snapshot();
        if let Err(session) = self.registry.add(session) {
            // Peers were already told about the newcomer.
            tracing::warn!(%conn, id = %session.id, "session could not be registered");
            self.stats.rejected += 1;
            let left = ServerMessage::PeerLeft { id: session.id }.to_frame();
            self.broadcast_except(session.id, StreamKind::State, &left);
            self.close(conn);
            return;
        }
        self.persistence.enqueue(snapshot);
        self.stats.connects += 1;
        tracing::info!(
            %conn,
            %id,
            x = position.x,
            y = position.y,
            restored = restored.is_some(),
            "session started"
        );
    }

    /// Random id that no live session holds.
    fn fresh_id(&self) -> EntityId {
        loop {
            let id = EntityId::new(uuid::Uuid::new_v4().as_u128());
            if !self.registry.contains(id) {
                return id;
            }
        }
    }

    fn handle_bytes(&mut self, conn: ConnectionId, stream: StreamId, bytes: &[u8], now: Instant) {
        let Some(id) = self.registry.id_for(conn) else {
            tracing::trace!(%conn, "bytes for unknown connection");
            return;
        };
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };

        let decoder = session.decoder(stream);
        decoder.push(bytes);
        let payloads: Vec<Vec<u8>> = decoder.frames().collect();

        for payload in payloads {
            match ClientMessage::decode(&payload) {
                Ok(message) => self.handle_message(id, message, now),
                Err(error) => {
                    self.stats.decode_errors += 1;
                    tracing::trace!(%id, %error, "undecodable payload");
                }
            }
        }
    }

    /// Applies one decoded client message from entity `id`.
    pub fn handle_message(&mut self, id: EntityId, message: ClientMessage, now: Instant) {
        if !self.registry.contains(id) {
            return;
        }

        match message {
            ClientMessage::Control { kind: CONTROL_DISCONNECT } => {
                self.disconnect(id, DisconnectReason::Requested);
            }
            ClientMessage::Control { kind } => {
                tracing::debug!(%id, kind, "ignoring control message");
            }
            ClientMessage::Intent { intent, seq } => self.handle_intent(id, intent, seq),
            ClientMessage::Ping => self.handle_ping(id, now),
            ClientMessage::Unknown { tag } => {
                tracing::trace!(%id, tag, "ignoring unknown tag");
            }
        }
    }

    fn handle_intent(&mut self, id: EntityId, intent: cinder_core::Intent, seq: u16) {
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        match session.accept_intent(intent, seq) {
            Ok(()) => self.stats.intents_accepted += 1,
            Err(rejection) => {
                self.stats.intents_dropped += 1;
                tracing::trace!(%id, seq, ?rejection, last = session.last_input_seq, "intent dropped");
            }
        }
    }

    fn handle_ping(&mut self, id: EntityId, now: Instant) {
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        session.touch(now);
        let conn = session.conn;
        let snapshot = session.snapshot();
        self.send(conn, StreamKind::Control, ServerMessage::Pong.to_frame());
        self.persistence.enqueue(snapshot);
    }

    /// Applies every queued intent, echoes the result to its owner and
    /// broadcasts it to everyone else.
    pub fn movement_tick(&mut self) {
        for id in self.registry.ids() {
            let peers = self.registry.positions_except(id);
            let Some(session) = self.registry.get_mut(id) else {
                continue;
            };
            if session.apply_pending(&peers, &self.config.world).is_none() {
                continue;
            }

            let conn = session.conn;
            let echo = session.echo().to_frame();
            let update = session.peer_update().to_frame();
            let snapshot = session.snapshot();

            self.send(conn, StreamKind::Control, echo);
            self.broadcast_except(id, StreamKind::State, &update);
            self.persistence.enqueue(snapshot);
        }
    }

    /// Samples the terrain under every session and applies hazard damage.
    pub fn hazard_tick(&mut self) {
        let world = self.config.world.clone();
        for id in self.registry.ids() {
            let Some(session) = self.registry.get_mut(id) else {
                continue;
            };
            let walkable = self.terrain.is_walkable_at(session.position, &world);
            let outcome = apply_hazard(&mut session.vitals, walkable, &world);
            if outcome == HazardOutcome::Respawned {
                session.position = world.spawn();
            }

            let conn = session.conn;
            let self_health = session.self_health().to_frame();
            let peer_health = session.peer_health().to_frame();
            let echo = session.echo().to_frame();
            let update = session.peer_update().to_frame();
            let snapshot = session.snapshot();

            match outcome {
                HazardOutcome::Safe => continue,
                HazardOutcome::Damaged => {
                    self.send(conn, StreamKind::Control, self_health);
                    self.broadcast_except(id, StreamKind::Control, &peer_health);
                }
                HazardOutcome::Respawned => {
                    self.stats.respawns += 1;
                    tracing::info!(%id, "entity died on hazard, respawning");
                    self.send(conn, StreamKind::Control, self_health);
                    self.send(conn, StreamKind::Control, echo);
                    self.broadcast_except(id, StreamKind::State, &update);
                    self.broadcast_except(id, StreamKind::Control, &peer_health);
                }
            }
            self.persistence.enqueue(snapshot);
        }
    }

    /// Evicts every session silent for longer than the heartbeat timeout.
    pub fn heartbeat_sweep(&mut self, now: Instant) {
        let timeout = self.config.heartbeat_timeout();
        let expired: Vec<EntityId> = self
            .registry
            .iter()
            .filter(|s| s.is_timed_out(now, timeout))
            .map(|s| s.id)
            .collect();

        for id in expired {
            self.stats.timeouts += 1;
            self.disconnect(id, DisconnectReason::TimedOut);
        }
    }

    /// Ends a session: registry removal, departure fan-out, transport close,
    /// final snapshot and delayed expiry.
    pub fn disconnect(&mut self, id: EntityId, reason: DisconnectReason) {
        let Some(session) = self.registry.remove(id) else {
            return;
        };

        let left = ServerMessage::PeerLeft { id }.to_frame();
        self.broadcast_except(id, StreamKind::State, &left);
        self.close(session.conn);

        self.persistence.enqueue(session.snapshot());
        self.persistence
            .schedule_expiry(id, self.config.persistence.snapshot_ttl());

        self.stats.disconnects += 1;
        tracing::info!(conn = %session.conn, %id, ?reason, "session ended");
    }

    /// Ends every session.
    pub fn shutdown(&mut self) {
        for id in self.registry.ids() {
            self.disconnect(id, DisconnectReason::Shutdown);
        }
    }

    fn broadcast_except(&mut self, origin: EntityId, stream: StreamKind, frame: &[u8]) {
        for conn in self.registry.connections_except(origin) {
            self.send(conn, stream, frame.to_vec());
        }
    }

    fn send(&mut self, conn: ConnectionId, stream: StreamKind, frame: Vec<u8>) -> bool {
        match self.command_tx.try_send(NetworkCommand::Send { conn, stream, frame }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.stats.send_failures += 1;
                tracing::warn!(%conn, "command channel full, frame dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.send_failures += 1;
                false
            }
        }
    }

    fn close(&mut self, conn: ConnectionId) {
        if self.command_tx.try_send(NetworkCommand::Close { conn }).is_err() {
            self.stats.send_failures += 1;
            tracing::warn!(%conn, "could not queue connection close");
        }
    }
}
