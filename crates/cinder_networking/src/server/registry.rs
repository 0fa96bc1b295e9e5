//! # Session Registry
//!
//! Live sessions keyed by entity id, with a reverse index by connection.
//! Iteration order is by id, so fan-out order is stable across ticks.

use super::session::Session;
use crate::transport::ConnectionId;
use cinder_core::{EntityId, Position};
use std::collections::{BTreeMap, HashMap};

/// All live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<EntityId, Session>,
    by_conn: HashMap<ConnectionId, EntityId>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session.
    ///
    /// Returns the session back if its id or connection is already live.
    pub fn add(&mut self, session: Session) -> Result<(), Session> {
        if self.sessions.contains_key(&session.id) || self.by_conn.contains_key(&session.conn) {
            return Err(session);
        }
        self.by_conn.insert(session.conn, session.id);
        self.sessions.insert(session.id, session);
        Ok(())
    }

    /// Removes and returns a session.
    pub fn remove(&mut self, id: EntityId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_conn.remove(&session.conn);
        Some(session)
    }

    /// Returns true if `id` is live.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Session by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Mutable session by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Entity carried by a connection.
    #[must_use]
    pub fn id_for(&self, conn: ConnectionId) -> Option<EntityId> {
        self.by_conn.get(&conn).copied()
    }

    /// Stable copy of every live id, for iteration that mutates sessions.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.sessions.keys().copied().collect()
    }

    /// Connections of every session except `origin`.
    #[must_use]
    pub fn connections_except(&self, origin: EntityId) -> Vec<ConnectionId> {
        self.sessions
            .values()
            .filter(|s| s.id != origin)
            .map(|s| s.conn)
            .collect()
    }

    /// Positions of every session except `origin`, for collision.
    #[must_use]
    pub fn positions_except(&self, origin: EntityId) -> Vec<Position> {
        self.sessions
            .values()
            .filter(|s| s.id != origin)
            .map(|s| s.position)
            .collect()
    }

    /// Iterates live sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::WorldConfig;
    use std::time::Instant;

    fn session(id: u128, conn: u64, x: f32) -> Session {
        Session::new(
            EntityId::new(id),
            ConnectionId(conn),
            Position::new(x, 0.0),
            &WorldConfig::default(),
            Instant::now(),
        )
    }

    #[test]
    fn test_add_remove() {
        let mut registry = SessionRegistry::new();
        assert!(registry.add(session(1, 10, 0.0)).is_ok());
        assert!(registry.add(session(2, 20, 100.0)).is_ok());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_for(ConnectionId(20)), Some(EntityId::new(2)));

        let removed = registry.remove(EntityId::new(1)).unwrap();
        assert_eq!(removed.conn, ConnectionId(10));
        assert_eq!(registry.id_for(ConnectionId(10)), None);
        assert!(registry.remove(EntityId::new(1)).is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = SessionRegistry::new();
        registry.add(session(1, 10, 0.0)).unwrap();
        assert!(registry.add(session(1, 11, 0.0)).is_err());
        assert!(registry.add(session(2, 10, 0.0)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_views_exclude_origin() {
        let mut registry = SessionRegistry::new();
        registry.add(session(1, 10, 0.0)).unwrap();
        registry.add(session(2, 20, 100.0)).unwrap();
        registry.add(session(3, 30, 200.0)).unwrap();

        let origin = EntityId::new(2);
        assert_eq!(registry.connections_except(origin), vec![ConnectionId(10), ConnectionId(30)]);
        assert_eq!(
            registry.positions_except(origin),
            vec![Position::new(0.0, 0.0), Position::new(200.0, 0.0)]
        );
        assert_eq!(registry.ids(), vec![EntityId::new(1), origin, EntityId::new(3)]);
    }
}
