//! In-process store with expiry deadlines. Backs the server binary when no
//! external store is configured, and every test.

use super::{Snapshot, SnapshotStore};
use crate::error::StoreResult;
use cinder_core::EntityId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Record {
    snapshot: Snapshot,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<EntityId, Record>,
    /// One entry per record with a pending expiry, ordered by deadline.
    deadlines: BTreeSet<(Instant, EntityId)>,
}

impl Inner {
    /// Drops every record whose deadline is at or before `now`.
    fn purge_expired(&mut self, now: Instant) {
        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            if self.records.get(&id).and_then(|r| r.expires_at) == Some(deadline) {
                self.records.remove(&id);
            }
        }
    }

    fn clear_deadline(&mut self, id: EntityId) {
        if let Some(deadline) = self.records.get(&id).and_then(|r| r.expires_at) {
            self.deadlines.remove(&(deadline, id));
        }
    }
}

/// `HashMap`-backed [`SnapshotStore`].
///
/// Expired records are reclaimed on every store call, not only when the
/// same id is read back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.records.len()
    }

    /// Returns true if no live record exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `id` has an expiry scheduled.
    #[must_use]
    pub fn has_expiry(&self, id: EntityId) -> bool {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.records.get(&id).is_some_and(|r| r.expires_at.is_some())
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, id: EntityId) -> StoreResult<Option<Snapshot>> {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        Ok(inner.records.get(&id).map(|r| r.snapshot))
    }

    fn set(&self, id: EntityId, snapshot: &Snapshot) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.clear_deadline(id);
        inner.records.insert(
            id,
            Record {
                snapshot: *snapshot,
                expires_at: None,
            },
        );
        Ok(())
    }

    fn expire(&self, id: EntityId, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.purge_expired(now);
        inner.clear_deadline(id);
        if ttl.is_zero() {
            inner.records.remove(&id);
        } else if let Some(record) = inner.records.get_mut(&id) {
            let deadline = now + ttl;
            record.expires_at = Some(deadline);
            inner.deadlines.insert((deadline, id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::Position;

    fn snapshot(raw: u128, x: f32) -> Snapshot {
        Snapshot {
            id: EntityId::new(raw),
            position: Position::new(x, 0.0),
            last_input_seq: 3,
            last_heartbeat_ms: 1,
        }
    }

    #[test]
    fn test_set_get_overwrite() {
        let store = MemoryStore::new();
        let id = EntityId::new(1);
        assert_eq!(store.get(id).unwrap(), None);

        store.set(id, &snapshot(1, 1.0)).unwrap();
        store.set(id, &snapshot(1, 2.0)).unwrap();
        let got = store.get(id).unwrap().unwrap();
        assert!((got.position.x - 2.0).abs() < f32::EPSILON);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expire_zero_removes() {
        let store = MemoryStore::new();
        let id = EntityId::new(1);
        store.set(id, &snapshot(1, 1.0)).unwrap();
        store.expire(id, Duration::ZERO).unwrap();
        assert_eq!(store.get(id).unwrap(), None);
    }

    #[test]
    fn test_expiry_elapses() {
        let store = MemoryStore::new();
        let id = EntityId::new(1);
        store.set(id, &snapshot(1, 1.0)).unwrap();
        store.expire(id, Duration::from_millis(20)).unwrap();
        assert!(store.has_expiry(id));
        assert!(store.get(id).unwrap().is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.get(id).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_clears_expiry() {
        let store = MemoryStore::new();
        let id = EntityId::new(1);
        store.set(id, &snapshot(1, 1.0)).unwrap();
        store.expire(id, Duration::from_secs(60)).unwrap();
        store.set(id, &snapshot(1, 5.0)).unwrap();
        assert!(!store.has_expiry(id));
    }

    #[test]
    fn test_expired_records_reclaimed_without_reads() {
        let store = MemoryStore::new();
        for raw in 0..1000u128 {
            let id = EntityId::new(raw);
            store.set(id, &snapshot(raw, 0.0)).unwrap();
            store.expire(id, Duration::from_millis(1)).unwrap();
        }
        std::thread::sleep(Duration::from_millis(20));

        // A write for an unrelated id is enough to reclaim the backlog.
        store.set(EntityId::new(5000), &snapshot(5000, 0.0)).unwrap();
        let inner = store.inner.lock();
        assert_eq!(inner.records.len(), 1);
        assert!(inner.deadlines.is_empty());
    }

    #[test]
    fn test_rearmed_expiry_keeps_one_deadline() {
        let store = MemoryStore::new();
        let id = EntityId::new(1);
        store.set(id, &snapshot(1, 1.0)).unwrap();
        store.expire(id, Duration::from_millis(5)).unwrap();
        store.expire(id, Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(store.get(id).unwrap().is_some());
        assert_eq!(store.inner.lock().deadlines.len(), 1);
    }
}
