//! # Cinder Networking - Authority and Prediction
//!
//! One authoritative server, many predicting clients, one shared simulator.
//!
//! ## Architecture
//!
//! - **Protocol**: length-prefixed big-endian frames, one tag byte per message
//! - **Server**: I/O-free core driven by [`NetworkEvent`]s; movement tick,
//!   hazard tick and liveness sweep run on the same `&mut GameServer`
//! - **Prediction**: the client moves instantly and reconciles against
//!   sequence-numbered echoes
//! - **Persistence**: snapshots go through a write-behind queue so the tick
//!   never waits on storage
//! - **Transport**: a tokio TCP runtime at the edge
//!
//! ```text
//! CLIENT                                    SERVER
//!   |-- intent {bits, seq} ------------------>|  queue, apply at 60Hz
//!   |   (predicted locally)                   |
//!   |<-- echo {x, y, lastSeq} ----------------|  peers get {id, x, y, hp}
//!   |   snap + replay newer inputs            |
//! ```
//!
//! The client NEVER decides where it is. The server ALWAYS has the last word.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cinder_networking::{GameServer, ServerConfig, TcpServerRuntime};
//!
//! let (server, commands) = GameServer::new(config, terrain, store, queue);
//! let server = TcpServerRuntime::new().run(server, commands).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod prediction;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientEvent, EntityView, GameClient, PeerState};
pub use config::{ClientConfig, PersistenceConfig, ServerConfig, DEFAULT_PORT};
pub use error::{ConfigError, DecodeError, FrameError, NetError, NetResult, StoreError, StoreResult};
pub use logging::init_logging;
pub use persistence::{MemoryStore, PersistOp, PersistStats, Snapshot, SnapshotStore, WriteBehindQueue};
pub use prediction::{Mirror, PendingInput, ReconciliationResult};
pub use protocol::{ClientMessage, FrameDecoder, ServerMessage};
pub use server::{DisconnectReason, GameServer, ServerStats, Session, SessionRegistry};
pub use transport::tcp::{ShutdownHandle, TcpServerRuntime};
pub use transport::{ConnectionId, NetworkCommand, NetworkEvent, StreamId, StreamKind};

/// Movement tick rate (applications of queued intents per second).
///
/// At 60Hz, each tick is ~16.67ms.
pub const MOVEMENT_TICK_RATE: u32 = 60;

/// Maximum number of simultaneous sessions.
pub const MAX_CLIENTS: usize = 500;
