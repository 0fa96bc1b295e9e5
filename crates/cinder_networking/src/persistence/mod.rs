//! # Snapshot Persistence
//!
//! Durable per-entity snapshots in an external key-value store.
//!
//! ## Architecture
//!
//! ```text
//!   movement tick ──┐
//!   hazard tick   ──┼──> [bounded ring] ──> [writer thread] ──> SnapshotStore
//!   heartbeat     ──┘     (drop if full)      (single writer)
//! ```
//!
//! The tick never waits on the store. Reads happen only once per connection,
//! synchronously, to restore a returning entity.

mod memory;
mod write_behind;

pub use memory::MemoryStore;
pub use write_behind::{PersistOp, PersistStats, WriteBehindQueue};

use crate::error::StoreResult;
use cinder_core::{EntityId, Position, SequenceNumber};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What survives a disconnect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    /// Entity the snapshot belongs to.
    pub id: EntityId,
    /// Last authoritative position.
    pub position: Position,
    /// Last applied input sequence.
    pub last_input_seq: SequenceNumber,
    /// Wall-clock time of the last heartbeat, milliseconds since the Unix epoch.
    pub last_heartbeat_ms: u64,
}

/// Key-value store contract.
///
/// Implementations must be callable from the writer thread and the server
/// task at the same time.
pub trait SnapshotStore: Send + Sync {
    /// Reads the snapshot for `id`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn get(&self, id: EntityId) -> StoreResult<Option<Snapshot>>;

    /// Writes `snapshot` under `id`, replacing any previous value and any
    /// pending expiry.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn set(&self, id: EntityId, snapshot: &Snapshot) -> StoreResult<()>;

    /// Schedules `id` to disappear after `ttl`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn expire(&self, id: EntityId, ttl: Duration) -> StoreResult<()>;
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
