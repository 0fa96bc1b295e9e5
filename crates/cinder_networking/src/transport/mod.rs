//! # Transport Boundary
//!
//! The server core never touches a socket. The transport feeds it
//! [`NetworkEvent`]s and executes the [`NetworkCommand`]s it emits.
//!
//! ```text
//!  sockets ──▶ NetworkEvent ──▶ GameServer ──▶ NetworkCommand ──▶ sockets
//!                                  (sync)        (crossbeam)
//! ```
//!
//! Each connection carries two logical streams. Control traffic for the
//! receiver's own entity (welcome, echo, pong, health) goes on
//! [`StreamKind::Control`]; world traffic about peers goes on
//! [`StreamKind::State`]. A transport with a single ordered stream, like
//! the TCP adapter, simply writes both in order.

pub mod tcp;

use cinder_core::EntityId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound stream number as reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct StreamId(pub u64);

/// Outbound logical stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Welcome, own echo, pong, own and peer health.
    Control,
    /// Peer updates, joins and departures.
    State,
}

/// Event from the transport into the server core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A secure connection finished its handshake.
    Connected {
        /// New connection.
        conn: ConnectionId,
        /// Entity id the client asks to resume, if the transport carried one.
        resume: Option<EntityId>,
    },
    /// Bytes arrived on one of the connection's streams.
    Received {
        /// Source connection.
        conn: ConnectionId,
        /// Stream the bytes arrived on.
        stream: StreamId,
        /// Raw bytes, not necessarily frame-aligned.
        bytes: Vec<u8>,
    },
    /// The transport lost the connection.
    Disconnected {
        /// Lost connection.
        conn: ConnectionId,
    },
}

/// Command from the server core to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Write a complete frame.
    Send {
        /// Target connection.
        conn: ConnectionId,
        /// Logical stream.
        stream: StreamKind,
        /// Length-prefixed frame.
        frame: Vec<u8>,
    },
    /// Tear the connection down.
    Close {
        /// Connection to close.
        conn: ConnectionId,
    },
}
