//! # Sessions
//!
//! One authoritative record per connected entity.
//!
//! ## Design
//!
//! - Intents are validated on arrival and queued; the movement tick applies
//!   them in order through the shared simulator
//! - `last_input_seq` tracks what was accepted, `last_applied_seq` what the
//!   last echo reported
//! - Inbound bytes are reassembled per stream

use crate::persistence::{unix_millis, Snapshot};
use crate::protocol::{FrameDecoder, ServerMessage};
use crate::transport::{ConnectionId, StreamId};
use cinder_core::{seq_newer, step, EntityId, Intent, Position, SequenceNumber, Vitals, WorldConfig};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Intents held between movement ticks before new ones are refused.
pub const MAX_PENDING_INTENTS: usize = 64;

/// Why an intent was not queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentRejection {
    /// No direction bit set.
    NoDirection,
    /// Sequence not newer than the last accepted one.
    Stale,
    /// Too many intents waiting for the next tick.
    Overflow,
}

#[derive(Clone, Copy, Debug)]
struct QueuedIntent {
    intent: Intent,
    seq: SequenceNumber,
}

/// Authoritative state of one connected entity.
#[derive(Debug)]
pub struct Session {
    /// Entity id, fixed for the session's lifetime.
    pub id: EntityId,
    /// Transport connection carrying this session.
    pub conn: ConnectionId,
    /// Authoritative position.
    pub position: Position,
    /// Authoritative health and damage counter.
    pub vitals: Vitals,
    /// Last accepted input sequence.
    pub last_input_seq: SequenceNumber,
    /// Sequence of the last intent the movement tick applied.
    pub last_applied_seq: SequenceNumber,
    /// Monotonic time of the last heartbeat.
    pub last_heartbeat: Instant,
    /// Wall-clock time of the last heartbeat (ms since epoch), for snapshots.
    pub last_heartbeat_ms: u64,
    pending: VecDeque<QueuedIntent>,
    decoders: HashMap<StreamId, FrameDecoder>,
}

impl Session {
    /// Creates a session at `position` with full health.
    #[must_use]
    pub fn new(id: EntityId, conn: ConnectionId, position: Position, world: &WorldConfig, now: Instant) -> Self {
        Self {
            id,
            conn,
            position,
            vitals: Vitals::full(world),
            last_input_seq: 0,
            last_applied_seq: 0,
            last_heartbeat: now,
            last_heartbeat_ms: unix_millis(),
            pending: VecDeque::with_capacity(8),
            decoders: HashMap::new(),
        }
    }

    /// Validates an intent and queues it for the next movement tick.
    ///
    /// # Errors
    ///
    /// Returns why the intent was dropped. A dropped intent does not advance
    /// `last_input_seq`.
    pub fn accept_intent(&mut self, intent: Intent, seq: SequenceNumber) -> Result<(), IntentRejection> {
        if !intent.has_direction() {
            return Err(IntentRejection::NoDirection);
        }
        if !seq_newer(seq, self.last_input_seq) {
            return Err(IntentRejection::Stale);
        }
        if self.pending.len() >= MAX_PENDING_INTENTS {
            return Err(IntentRejection::Overflow);
        }
        self.pending.push_back(QueuedIntent { intent, seq });
        self.last_input_seq = seq;
        Ok(())
    }

    /// Intents waiting for the next movement tick.
    #[must_use]
    pub fn pending_intents(&self) -> usize {
        self.pending.len()
    }

    /// Applies every queued intent in order.
    ///
    /// Returns the last applied sequence, or `None` if nothing was queued.
    pub fn apply_pending(&mut self, peers: &[Position], world: &WorldConfig) -> Option<SequenceNumber> {
        let mut applied = None;
        while let Some(queued) = self.pending.pop_front() {
            self.position = step(self.position, queued.intent, peers, world);
            applied = Some(queued.seq);
        }
        if let Some(seq) = applied {
            self.last_applied_seq = seq;
        }
        applied
    }

    /// Records a heartbeat.
    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.last_heartbeat_ms = unix_millis();
    }

    /// Returns true if the last heartbeat is older than `timeout`.
    #[must_use]
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) > timeout
    }

    /// Reassembly buffer for one inbound stream.
    pub fn decoder(&mut self, stream: StreamId) -> &mut FrameDecoder {
        self.decoders.entry(stream).or_default()
    }

    /// Persistable view.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id,
            position: self.position,
            last_input_seq: self.last_applied_seq,
            last_heartbeat_ms: self.last_heartbeat_ms,
        }
    }

    /// Tag 0 to the owner.
    #[must_use]
    pub fn welcome(&self) -> ServerMessage {
        ServerMessage::Welcome {
            id: self.id,
            position: self.position,
            health: self.vitals.health,
        }
    }

    /// Tag 2 about this entity.
    #[must_use]
    pub fn joined(&self) -> ServerMessage {
        ServerMessage::PeerJoined {
            id: self.id,
            position: self.position,
            health: self.vitals.health,
        }
    }

    /// Tag 1 about this entity, for peers.
    #[must_use]
    pub fn peer_update(&self) -> ServerMessage {
        ServerMessage::PeerUpdate {
            id: self.id,
            position: self.position,
            health: self.vitals.health,
        }
    }

    /// Tag 4 to the owner.
    #[must_use]
    pub fn echo(&self) -> ServerMessage {
        ServerMessage::SelfEcho {
            id: self.id,
            position: self.position,
            last_seq: self.last_applied_seq,
        }
    }

    /// Tag 7 to the owner.
    #[must_use]
    pub fn self_health(&self) -> ServerMessage {
        ServerMessage::SelfHealth {
            id: self.id,
            health: self.vitals.health,
            damage_seq: self.vitals.damage_seq,
        }
    }

    /// Tag 8 about this entity, for peers.
    #[must_use]
    pub fn peer_health(&self) -> ServerMessage {
        ServerMessage::PeerHealth {
            id: self.id,
            health: self.vitals.health,
            damage_seq: self.vitals.damage_seq,
        }
    }
}
