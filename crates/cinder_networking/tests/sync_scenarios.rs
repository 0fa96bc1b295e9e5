//! End-to-end synchronization scenarios.
//!
//! The server core and real `GameClient`s exchange frames in-process, with
//! the test deciding when frames are delivered and when ticks run.

use cinder_core::{EntityId, Intent, Position, TileCell, TileMap, WorldConfig};
use cinder_networking::{
    ClientConfig, ClientEvent, ConnectionId, GameClient, GameServer, MemoryStore, NetworkCommand, NetworkEvent,
    ReconciliationResult, ServerConfig, Snapshot, SnapshotStore, StreamId, WriteBehindQueue,
};
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Cluster {
    server: GameServer,
    commands: Receiver<NetworkCommand>,
    store: Arc<MemoryStore>,
    clients: HashMap<u64, GameClient>,
    events: HashMap<u64, Vec<ClientEvent>>,
    closed: Vec<u64>,
    now: Instant,
}

impl Cluster {
    fn new(terrain: TileMap) -> Self {
        let config = ServerConfig::default();
        let store = Arc::new(MemoryStore::new());
        let queue = WriteBehindQueue::start(store.clone(), &config.persistence).unwrap();
        let (server, commands) = GameServer::new(config, Arc::new(terrain), store.clone(), queue);
        Self {
            server,
            commands,
            store,
            clients: HashMap::new(),
            events: HashMap::new(),
            closed: Vec::new(),
            now: Instant::now(),
        }
    }

    /// Seeds a snapshot so the next connection resuming `id` starts at `position`.
    fn seed(&self, id: EntityId, position: Position) {
        let snapshot = Snapshot {
            id,
            position,
            last_input_seq: 0,
            last_heartbeat_ms: 0,
        };
        self.store.set(id, &snapshot).unwrap();
    }

    fn connect(&mut self, conn: u64, resume: Option<EntityId>) -> EntityId {
        self.clients.insert(conn, GameClient::new(&ClientConfig::default(), self.now));
        self.server.handle_event(NetworkEvent::Connected { conn: ConnectionId(conn), resume }, self.now);
        self.deliver();
        self.client(conn).local_id().unwrap()
    }

    fn client(&self, conn: u64) -> &GameClient {
        &self.clients[&conn]
    }

    fn client_mut(&mut self, conn: u64) -> &mut GameClient {
        self.clients.get_mut(&conn).unwrap()
    }

    /// Hands a client frame to the server.
    fn upload(&mut self, conn: u64, frame: Vec<u8>) {
        self.server.handle_event(
            NetworkEvent::Received {
                conn: ConnectionId(conn),
                stream: StreamId(0),
                bytes: frame,
            },
            self.now,
        );
    }

    /// Routes every pending server command to its client.
    fn deliver(&mut self) {
        let commands: Vec<NetworkCommand> = self.commands.try_iter().collect();
        for command in commands {
            match command {
                NetworkCommand::Send { conn, frame, .. } => {
                    if let Some(client) = self.clients.get_mut(&conn.0) {
                        let events = client.receive(&frame, self.now);
                        self.events.entry(conn.0).or_default().extend(events);
                    }
                }
                NetworkCommand::Close { conn } => self.closed.push(conn.0),
            }
        }
    }

    fn take_events(&mut self, conn: u64) -> Vec<ClientEvent> {
        self.events.remove(&conn).unwrap_or_default()
    }
}

#[test]
fn test_single_step_right() {
    let mut cluster = Cluster::new(TileMap::empty());
    let a = EntityId::new(0xA);
    cluster.seed(a, Position::new(0.0, 0.0));
    assert_eq!(cluster.connect(1, Some(a)), a);

    let frame = cluster.client_mut(1).send_intent(Intent::RIGHT).unwrap();
    cluster.upload(1, frame);
    cluster.server.movement_tick();
    cluster.deliver();

    let mirror = cluster.client(1).mirror().unwrap();
    assert_eq!(mirror.position(), Position::new(3.0, 0.0));
    assert_eq!(mirror.pending_input_count(), 0);
    assert_eq!(cluster.server.registry().get(a).unwrap().position, Position::new(3.0, 0.0));
}

#[test]
fn test_overlapping_entities_only_separate() {
    let mut cluster = Cluster::new(TileMap::empty());
    let a = EntityId::new(0xA);
    let b = EntityId::new(0xB);
    cluster.seed(a, Position::new(0.0, 0.0));
    cluster.seed(b, Position::new(10.0, 0.0));
    cluster.connect(1, Some(a));
    cluster.connect(2, Some(b));
    assert_eq!(cluster.client(1).peers()[&b].position, Position::new(10.0, 0.0));

    let toward = cluster.client_mut(1).send_intent(Intent::RIGHT).unwrap();
    cluster.upload(1, toward);
    cluster.server.movement_tick();
    cluster.deliver();
    assert_eq!(cluster.server.registry().get(a).unwrap().position, Position::new(0.0, 0.0));
    assert_eq!(cluster.client(1).mirror().unwrap().position(), Position::new(0.0, 0.0));

    let away = cluster.client_mut(1).send_intent(Intent::LEFT).unwrap();
    cluster.upload(1, away);
    cluster.server.movement_tick();
    cluster.deliver();
    assert_eq!(cluster.server.registry().get(a).unwrap().position, Position::new(-3.0, 0.0));
    assert_eq!(cluster.client(1).mirror().unwrap().position(), Position::new(-3.0, 0.0));
    assert_eq!(cluster.client(2).peers()[&a].position, Position::new(-3.0, 0.0));
}

#[test]
fn test_echo_under_latency_replays_unconfirmed() {
    let mut cluster = Cluster::new(TileMap::empty());
    let a = EntityId::new(0xA);
    cluster.seed(a, Position::new(0.0, 0.0));
    cluster.connect(1, Some(a));
    assert_eq!(cluster.take_events(1), vec![ClientEvent::Welcomed { id: a }]);

    let frames: Vec<Vec<u8>> = (0..3)
        .map(|_| cluster.client_mut(1).send_intent(Intent::RIGHT).unwrap())
        .collect();
    assert_eq!(cluster.client(1).mirror().unwrap().position(), Position::new(9.0, 0.0));

    // Only the first intent reaches the server before the tick.
    let mut frames = frames.into_iter();
    cluster.upload(1, frames.next().unwrap());
    cluster.server.movement_tick();
    cluster.deliver();

    let mirror = cluster.client(1).mirror().unwrap();
    assert_eq!(mirror.position(), Position::new(9.0, 0.0));
    assert_eq!(mirror.pending_input_count(), 2);
    assert_eq!(
        cluster.take_events(1),
        vec![ClientEvent::Reconciled(ReconciliationResult::NoCorrection)]
    );

    for frame in frames {
        cluster.upload(1, frame);
    }
    cluster.server.movement_tick();
    cluster.deliver();

    let mirror = cluster.client(1).mirror().unwrap();
    assert_eq!(mirror.position(), Position::new(9.0, 0.0));
    assert_eq!(mirror.pending_input_count(), 0);
}

#[test]
fn test_join_and_leave_fanout() {
    let mut cluster = Cluster::new(TileMap::empty());
    let a = cluster.connect(1, None);
    let b = cluster.connect(2, None);
    let c = cluster.connect(3, None);

    assert_eq!(cluster.client(1).peers().len(), 2);
    assert!(cluster.client(3).peers().contains_key(&a));
    assert!(cluster.client(3).peers().contains_key(&b));

    let bye = cluster.client_mut(2).disconnect();
    cluster.upload(2, bye);
    cluster.deliver();

    assert_eq!(cluster.closed, vec![2]);
    assert!(!cluster.client(1).peers().contains_key(&b));
    assert!(!cluster.client(3).peers().contains_key(&b));
    assert!(cluster.client(1).peers().contains_key(&c));
    assert_eq!(cluster.server.session_count(), 2);
}

#[test]
fn test_hazard_prediction_through_respawn() {
    let world = WorldConfig::default();
    let lava = Position::new(400.0, 400.0);
    let mut terrain = TileMap::empty();
    terrain.set(TileCell::under(lava, &world), false);

    let mut cluster = Cluster::new(terrain.clone());
    let a = EntityId::new(0xA);
    cluster.seed(a, lava);
    cluster.connect(1, Some(a));
    cluster.connect(2, None);

    for tick in 1..40u16 {
        assert!(cluster.client_mut(1).predict_hazard(&terrain));
        cluster.server.hazard_tick();
        cluster.deliver();

        let mirror = cluster.client(1).mirror().unwrap();
        assert_eq!(mirror.pending_damage_count(), 0, "tick {tick}");
        assert_eq!(mirror.damage_seq(), tick);
        let expected = 100.0 - 2.5 * f32::from(tick);
        assert!((mirror.health() - expected).abs() < 1e-3);
        assert!((cluster.client(2).peers()[&a].health - expected).abs() < 1e-3);
    }

    // Fortieth tick empties the health bar.
    assert!(cluster.client_mut(1).predict_hazard(&terrain));
    assert!(cluster.client(1).mirror().unwrap().health().abs() < f32::EPSILON);
    cluster.server.hazard_tick();
    cluster.deliver();

    let spawn = world.spawn();
    let mirror = cluster.client(1).mirror().unwrap();
    assert!((mirror.health() - 100.0).abs() < f32::EPSILON);
    assert_eq!(mirror.pending_damage_count(), 0);
    assert_eq!(mirror.damage_seq(), 41);
    assert_eq!(mirror.position(), spawn);

    let seen_by_b = cluster.client(2).peers()[&a];
    assert_eq!(seen_by_b.position, spawn);
    assert!((seen_by_b.health - 100.0).abs() < f32::EPSILON);
    assert_eq!(seen_by_b.damage_seq, 41);
    assert_eq!(cluster.server.stats().respawns, 1);
}

#[test]
fn test_silent_client_is_evicted() {
    let mut cluster = Cluster::new(TileMap::empty());
    let a = cluster.connect(1, None);
    cluster.connect(2, None);
    let start = cluster.now;

    cluster.now = start + Duration::from_secs(5);
    let now = cluster.now;
    let ping = cluster.client_mut(2).heartbeat(now).unwrap();
    cluster.upload(2, ping);
    cluster.deliver();
    assert_eq!(cluster.take_events(2).last(), Some(&ClientEvent::Pong));

    cluster.now = start + Duration::from_millis(7_500);
    cluster.server.heartbeat_sweep(cluster.now);
    cluster.deliver();

    assert_eq!(cluster.closed, vec![1]);
    assert_eq!(cluster.take_events(2), vec![ClientEvent::PeerLeft { id: a }]);
    assert_eq!(cluster.server.session_count(), 1);

    assert!(cluster.server.persistence().flush(Duration::from_secs(5)));
    assert!(cluster.store.has_expiry(a));
}

#[test]
fn test_reconnect_resumes_position() {
    let mut cluster = Cluster::new(TileMap::empty());
    let a = cluster.connect(1, None);
    for _ in 0..5 {
        let frame = cluster.client_mut(1).send_intent(Intent::DOWN | Intent::SPRINT).unwrap();
        cluster.upload(1, frame);
    }
    cluster.server.movement_tick();
    cluster.deliver();
    let left_at = cluster.client(1).mirror().unwrap().position();

    let bye = cluster.client_mut(1).disconnect();
    cluster.upload(1, bye);
    assert!(cluster.server.persistence().flush(Duration::from_secs(5)));

    assert_eq!(cluster.connect(7, Some(a)), a);
    assert_eq!(cluster.client(7).mirror().unwrap().position(), left_at);

    // A fresh client numbers from 1 again and the server accepts it.
    let frame = cluster.client_mut(7).send_intent(Intent::UP).unwrap();
    cluster.upload(7, frame);
    cluster.server.movement_tick();
    cluster.deliver();
    assert_eq!(
        cluster.client(7).mirror().unwrap().position(),
        Position::new(left_at.x, left_at.y - 3.0)
    );
}
