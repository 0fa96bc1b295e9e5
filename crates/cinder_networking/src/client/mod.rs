//! # Game Client
//!
//! Sans-I/O client state machine. The caller feeds it raw bytes from the
//! connection and writes the frames it returns; everything else (the mirror
//! of the local entity, the peer table, server liveness) lives here.
//!
//! ```text
//! socket bytes ──▶ receive() ──▶ Mirror / peers ──▶ ClientEvent
//! input bits   ──▶ send_intent() ──▶ predicted ──▶ frame to write
//! clock        ──▶ heartbeat() ──▶ ping frame (when due)
//! ```

use crate::config::ClientConfig;
use crate::prediction::{Mirror, ReconciliationResult};
use crate::protocol::{ClientMessage, FrameDecoder, ServerMessage, CONTROL_DISCONNECT};
use cinder_core::{EntityId, Intent, Position, SequenceNumber, TileMap, WorldConfig};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Last known state of another entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeerState {
    /// Authoritative position.
    pub position: Position,
    /// Authoritative health.
    pub health: f32,
    /// Last damage counter seen for this peer.
    pub damage_seq: SequenceNumber,
}

/// One entity as a renderer sees it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityView {
    /// Entity id.
    pub id: EntityId,
    /// Position (predicted for the local entity).
    pub position: Position,
    /// Health (predicted for the local entity).
    pub health: f32,
    /// True for the local entity.
    pub is_local: bool,
}

/// Something the server told us.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientEvent {
    /// Handshake finished; the local entity exists.
    Welcomed {
        /// Local entity id.
        id: EntityId,
    },
    /// Own movement echo applied.
    Reconciled(ReconciliationResult),
    /// Own health update applied.
    HealthReconciled {
        /// Predicted health after reconciliation.
        health: f32,
    },
    /// A peer appeared.
    PeerJoined {
        /// Peer id.
        id: EntityId,
    },
    /// A peer moved or respawned.
    PeerMoved {
        /// Peer id.
        id: EntityId,
    },
    /// A peer's health changed.
    PeerHealth {
        /// Peer id.
        id: EntityId,
    },
    /// A peer left.
    PeerLeft {
        /// Peer id.
        id: EntityId,
    },
    /// Heartbeat answered.
    Pong,
}

/// Client-side connection state.
#[derive(Debug)]
pub struct GameClient {
    world: WorldConfig,
    ping_interval: Duration,
    server_timeout: Duration,
    decoder: FrameDecoder,
    mirror: Option<Mirror>,
    peers: BTreeMap<EntityId, PeerState>,
    last_server_activity: Instant,
    last_ping: Option<Instant>,
}

impl GameClient {
    /// Creates a client that has not been welcomed yet.
    #[must_use]
    pub fn new(config: &ClientConfig, now: Instant) -> Self {
        Self {
            world: config.world.clone(),
            ping_interval: config.ping_interval(),
            server_timeout: config.server_timeout(),
            decoder: FrameDecoder::new(),
            mirror: None,
            peers: BTreeMap::new(),
            last_server_activity: now,
            last_ping: None,
        }
    }

    /// The local entity, once welcomed.
    #[must_use]
    pub const fn mirror(&self) -> Option<&Mirror> {
        self.mirror.as_ref()
    }

    /// Local entity id, once welcomed.
    #[must_use]
    pub fn local_id(&self) -> Option<EntityId> {
        self.mirror.as_ref().map(Mirror::id)
    }

    /// Known peers.
    #[must_use]
    pub const fn peers(&self) -> &BTreeMap<EntityId, PeerState> {
        &self.peers
    }

    /// Every known entity, local first.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityView> {
        let local = self.mirror.iter().map(|m| EntityView {
            id: m.id(),
            position: m.position(),
            health: m.health(),
            is_local: true,
        });
        let peers = self.peers.iter().map(|(&id, peer)| EntityView {
            id,
            position: peer.position,
            health: peer.health,
            is_local: false,
        });
        local.chain(peers).collect()
    }

    /// Feeds bytes read from the connection.
    pub fn receive(&mut self, bytes: &[u8], now: Instant) -> Vec<ClientEvent> {
        self.decoder.push(bytes);
        let payloads: Vec<Vec<u8>> = self.decoder.frames().collect();

        let mut events = Vec::with_capacity(payloads.len());
        for payload in payloads {
            self.last_server_activity = now;
            match ServerMessage::decode(&payload) {
                Ok(message) => events.extend(self.handle_message(message)),
                Err(error) => tracing::trace!(%error, "undecodable server payload"),
            }
        }
        events
    }

    /// Applies one decoded server message.
    pub fn handle_message(&mut self, message: ServerMessage) -> Option<ClientEvent> {
        let local = self.local_id();
        match message {
            ServerMessage::Welcome { id, position, health } => {
                tracing::info!(%id, x = position.x, y = position.y, "welcomed");
                self.peers.remove(&id);
                self.mirror = Some(Mirror::new(id, position, health));
                Some(ClientEvent::Welcomed { id })
            }
            ServerMessage::SelfEcho { id, position, last_seq } => {
                if local != Some(id) {
                    tracing::trace!(%id, "echo for another entity");
                    return None;
                }
                let peers = self.peer_positions();
                let mirror = self.mirror.as_mut()?;
                let result = mirror.reconcile_movement(position, last_seq, &peers, &self.world);
                if let ReconciliationResult::Corrected { error } = result {
                    tracing::debug!(error, last_seq, "prediction corrected");
                }
                Some(ClientEvent::Reconciled(result))
            }
            ServerMessage::SelfHealth { id, health, damage_seq } => {
                if local != Some(id) {
                    return None;
                }
                let mirror = self.mirror.as_mut()?;
                mirror.reconcile_health(health, damage_seq, &self.world);
                Some(ClientEvent::HealthReconciled { health: mirror.health() })
            }
            ServerMessage::PeerJoined { id, position, health } => {
                if local == Some(id) {
                    return None;
                }
                self.peers.insert(id, PeerState { position, health, damage_seq: 0 });
                Some(ClientEvent::PeerJoined { id })
            }
            ServerMessage::PeerUpdate { id, position, health } => {
                if local == Some(id) {
                    return None;
                }
                let peer = self.peers.entry(id).or_insert(PeerState { position, health, damage_seq: 0 });
                peer.position = position;
                peer.health = health;
                Some(ClientEvent::PeerMoved { id })
            }
            ServerMessage::PeerHealth { id, health, damage_seq } => {
                let peer = self.peers.get_mut(&id)?;
                peer.health = health;
                peer.damage_seq = damage_seq;
                Some(ClientEvent::PeerHealth { id })
            }
            ServerMessage::PeerLeft { id } => {
                self.peers.remove(&id)?;
                Some(ClientEvent::PeerLeft { id })
            }
            ServerMessage::Pong => Some(ClientEvent::Pong),
            ServerMessage::Unknown { tag } => {
                tracing::trace!(tag, "ignoring unknown tag");
                None
            }
        }
    }

    /// Predicts `intent` locally and returns the frame to send, or `None`
    /// before the welcome or for an intent without direction.
    pub fn send_intent(&mut self, intent: Intent) -> Option<Vec<u8>> {
        let peers = self.peer_positions();
        let mirror = self.mirror.as_mut()?;
        let seq = mirror.apply_local_intent(intent, &peers, &self.world)?;
        Some(ClientMessage::Intent { intent, seq }.to_frame())
    }

    /// Runs one local hazard prediction against `terrain`.
    pub fn predict_hazard(&mut self, terrain: &TileMap) -> bool {
        let Some(mirror) = self.mirror.as_mut() else {
            return false;
        };
        let walkable = terrain.is_walkable_at(mirror.position(), &self.world);
        mirror.predict_hazard(walkable, &self.world)
    }

    /// Returns a ping frame when one is due.
    pub fn heartbeat(&mut self, now: Instant) -> Option<Vec<u8>> {
        let due = match self.last_ping {
            Some(sent) => now.saturating_duration_since(sent) >= self.ping_interval,
            None => true,
        };
        if !due {
            return None;
        }
        self.last_ping = Some(now);
        Some(ClientMessage::Ping.to_frame())
    }

    /// Returns true once the server has been silent for the timeout.
    #[must_use]
    pub fn is_server_lost(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_server_activity) > self.server_timeout
    }

    /// Forgets the session and returns the disconnect frame.
    pub fn disconnect(&mut self) -> Vec<u8> {
        if let Some(mirror) = self.mirror.take() {
            tracing::info!(id = %mirror.id(), "disconnecting");
        }
        self.peers.clear();
        ClientMessage::Control { kind: CONTROL_DISCONNECT }.to_frame()
    }

    fn peer_positions(&self) -> Vec<Position> {
        self.peers.values().map(|p| p.position).collect()
    }
}
