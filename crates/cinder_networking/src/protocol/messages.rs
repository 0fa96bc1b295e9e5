//! # Message Definitions
//!
//! Every payload starts with a one-byte tag. Tags are shared between the two
//! directions but the bodies differ, so each direction has its own enum.
//!
//! Unknown tags decode to an `Unknown` variant instead of an error; the
//! handler layer ignores them so a newer peer never breaks an older one.

use super::serialization::{WireReader, WireWriter};
use crate::error::DecodeError;
use cinder_core::{EntityId, Intent, Position, SequenceNumber};

/// Message tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// Client: control (kind 0 = disconnect). Server: welcome.
    Control = 0,
    /// Client: movement intent. Server: peer state update.
    Update = 1,
    /// Existing entity snapshot on join.
    PeerJoined = 2,
    /// Entity left.
    PeerLeft = 3,
    /// Authoritative echo of the receiver's own movement.
    SelfEcho = 4,
    /// Heartbeat ping.
    Ping = 5,
    /// Heartbeat pong.
    Pong = 6,
    /// Authoritative health of the receiver's own entity.
    SelfHealth = 7,
    /// Authoritative health of a peer.
    PeerHealth = 8,
}

impl MessageTag {
    /// Maps a wire byte to a known tag.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Control,
            1 => Self::Update,
            2 => Self::PeerJoined,
            3 => Self::PeerLeft,
            4 => Self::SelfEcho,
            5 => Self::Ping,
            6 => Self::Pong,
            7 => Self::SelfHealth,
            8 => Self::PeerHealth,
            _ => return None,
        })
    }
}

/// Control kind asking the server to end the session.
pub const CONTROL_DISCONNECT: u8 = 0;

/// Client to server messages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientMessage {
    /// Session control. Kind [`CONTROL_DISCONNECT`] ends the session.
    Control {
        /// Control kind.
        kind: u8,
    },
    /// One input interval of movement intent.
    Intent {
        /// Intent bitmask.
        intent: Intent,
        /// Client-assigned input sequence.
        seq: SequenceNumber,
    },
    /// Heartbeat.
    Ping,
    /// Tag this build does not understand.
    Unknown {
        /// Raw tag byte.
        tag: u8,
    },
}

/// Server to client messages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ServerMessage {
    /// Handshake result: the receiver's own id and starting state.
    Welcome {
        /// Assigned entity id.
        id: EntityId,
        /// Starting position.
        position: Position,
        /// Starting health.
        health: f32,
    },
    /// Authoritative state of a peer.
    PeerUpdate {
        /// Peer id.
        id: EntityId,
        /// Peer position.
        position: Position,
        /// Peer health.
        health: f32,
    },
    /// A peer that is (or just became) present.
    PeerJoined {
        /// Peer id.
        id: EntityId,
        /// Peer position.
        position: Position,
        /// Peer health.
        health: f32,
    },
    /// A peer left.
    PeerLeft {
        /// Peer id.
        id: EntityId,
    },
    /// Authoritative position of the receiver's own entity.
    SelfEcho {
        /// Receiver's id.
        id: EntityId,
        /// Authoritative position.
        position: Position,
        /// Last input sequence applied to produce it.
        last_seq: SequenceNumber,
    },
    /// Heartbeat reply.
    Pong,
    /// Authoritative health of the receiver's own entity.
    SelfHealth {
        /// Receiver's id.
        id: EntityId,
        /// Authoritative health.
        health: f32,
        /// Damage sequence it reflects.
        damage_seq: SequenceNumber,
    },
    /// Authoritative health of a peer.
    PeerHealth {
        /// Peer id.
        id: EntityId,
        /// Peer health.
        health: f32,
        /// Peer damage sequence.
        damage_seq: SequenceNumber,
    },
    /// Tag this build does not understand.
    Unknown {
        /// Raw tag byte.
        tag: u8,
    },
}

/// Payload sizes, tag byte included.
const CONTROL_SIZE: usize = 2;
const INTENT_SIZE: usize = 4;
const ENTITY_STATE_SIZE: usize = 1 + 16 + 4 + 4 + 4;
const PEER_LEFT_SIZE: usize = 1 + 16;
const ECHO_SIZE: usize = 1 + 16 + 4 + 4 + 2;
const HEALTH_SIZE: usize = 1 + 16 + 4 + 2;

fn truncated(tag: u8, needed: usize, payload: &[u8]) -> DecodeError {
    DecodeError::Truncated {
        tag,
        needed,
        available: payload.len(),
    }
}

impl ClientMessage {
    /// Encodes the payload (without length prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(INTENT_SIZE);
        match *self {
            Self::Control { kind } => {
                w.write_u8(MessageTag::Control as u8).write_u8(kind);
            }
            Self::Intent { intent, seq } => {
                w.write_u8(MessageTag::Update as u8).write_u8(intent.bits()).write_u16(seq);
            }
            Self::Ping => {
                w.write_u8(MessageTag::Ping as u8);
            }
            Self::Unknown { tag } => {
                w.write_u8(tag);
            }
        }
        w.into_bytes()
    }

    /// Decodes a payload.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Empty`] for a zero-length payload,
    /// [`DecodeError::Truncated`] when a known tag's body is short.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::new(payload);
        let tag = r.read_u8().ok_or(DecodeError::Empty)?;

        match MessageTag::from_u8(tag) {
            Some(MessageTag::Control) => {
                let kind = r.read_u8().ok_or_else(|| truncated(tag, CONTROL_SIZE, payload))?;
                Ok(Self::Control { kind })
            }
            Some(MessageTag::Update) => {
                let err = || truncated(tag, INTENT_SIZE, payload);
                let intent = Intent::from_bits(r.read_u8().ok_or_else(err)?);
                let seq = r.read_u16().ok_or_else(err)?;
                Ok(Self::Intent { intent, seq })
            }
            Some(MessageTag::Ping) => Ok(Self::Ping),
            _ => Ok(Self::Unknown { tag }),
        }
    }
}

impl ServerMessage {
    /// Encodes the payload (without length prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(ENTITY_STATE_SIZE);
        match *self {
            Self::Welcome { id, position, health } => {
                write_entity_state(&mut w, MessageTag::Control, id, position, health);
            }
            Self::PeerUpdate { id, position, health } => {
                write_entity_state(&mut w, MessageTag::Update, id, position, health);
            }
            Self::PeerJoined { id, position, health } => {
                write_entity_state(&mut w, MessageTag::PeerJoined, id, position, health);
            }
            Self::PeerLeft { id } => {
                w.write_u8(MessageTag::PeerLeft as u8).write_id(id);
            }
            Self::SelfEcho { id, position, last_seq } => {
                w.write_u8(MessageTag::SelfEcho as u8)
                    .write_id(id)
                    .write_f32(position.x)
                    .write_f32(position.y)
                    .write_u16(last_seq);
            }
            Self::Pong => {
                w.write_u8(MessageTag::Pong as u8);
            }
            Self::SelfHealth { id, health, damage_seq } => {
                write_health(&mut w, MessageTag::SelfHealth, id, health, damage_seq);
            }
            Self::PeerHealth { id, health, damage_seq } => {
                write_health(&mut w, MessageTag::PeerHealth, id, health, damage_seq);
            }
            Self::Unknown { tag } => {
                w.write_u8(tag);
            }
        }
        w.into_bytes()
    }

    /// Decodes a payload.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Empty`] for a zero-length payload,
    /// [`DecodeError::Truncated`] when a known tag's body is short.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::new(payload);
        let tag = r.read_u8().ok_or(DecodeError::Empty)?;

        let Some(known) = MessageTag::from_u8(tag) else {
            return Ok(Self::Unknown { tag });
        };

        match known {
            MessageTag::Control | MessageTag::Update | MessageTag::PeerJoined => {
                let err = || truncated(tag, ENTITY_STATE_SIZE, payload);
                let id = r.read_id().ok_or_else(err)?;
                let x = r.read_f32().ok_or_else(err)?;
                let y = r.read_f32().ok_or_else(err)?;
                let health = r.read_f32().ok_or_else(err)?;
                let position = Position::new(x, y);
                Ok(match known {
                    MessageTag::Control => Self::Welcome { id, position, health },
                    MessageTag::Update => Self::PeerUpdate { id, position, health },
                    _ => Self::PeerJoined { id, position, health },
                })
            }
            MessageTag::PeerLeft => {
                let id = r.read_id().ok_or_else(|| truncated(tag, PEER_LEFT_SIZE, payload))?;
                Ok(Self::PeerLeft { id })
            }
            MessageTag::SelfEcho => {
                let err = || truncated(tag, ECHO_SIZE, payload);
                let id = r.read_id().ok_or_else(err)?;
                let x = r.read_f32().ok_or_else(err)?;
                let y = r.read_f32().ok_or_else(err)?;
                let last_seq = r.read_u16().ok_or_else(err)?;
                Ok(Self::SelfEcho {
                    id,
                    position: Position::new(x, y),
                    last_seq,
                })
            }
            MessageTag::Pong => Ok(Self::Pong),
            MessageTag::SelfHealth | MessageTag::PeerHealth => {
                let err = || truncated(tag, HEALTH_SIZE, payload);
                let id = r.read_id().ok_or_else(err)?;
                let health = r.read_f32().ok_or_else(err)?;
                let damage_seq = r.read_u16().ok_or_else(err)?;
                Ok(if known == MessageTag::SelfHealth {
                    Self::SelfHealth { id, health, damage_seq }
                } else {
                    Self::PeerHealth { id, health, damage_seq }
                })
            }
            // Client-only tag arriving at a client.
            MessageTag::Ping => Ok(Self::Unknown { tag }),
        }
    }
}

fn write_entity_state(w: &mut WireWriter, tag: MessageTag, id: EntityId, position: Position, health: f32) {
    w.write_u8(tag as u8)
        .write_id(id)
        .write_f32(position.x)
        .write_f32(position.y)
        .write_f32(health);
}

fn write_health(w: &mut WireWriter, tag: MessageTag, id: EntityId, health: f32, damage_seq: SequenceNumber) {
    w.write_u8(tag as u8).write_id(id).write_f32(health).write_u16(damage_seq);
}
