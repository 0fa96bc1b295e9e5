//! # Write-Behind Queue
//!
//! Bounded, never-blocking handoff from the simulation to the store.
//!
//! Producers call [`WriteBehindQueue::enqueue`] from the tick. If the ring is
//! full the snapshot is dropped on the spot: a newer one for the same entity
//! is at most one tick away, so losing one costs nothing but freshness.
//!
//! A single writer thread drains the ring in batches and applies each op to
//! the store in order. Store errors are logged and the op is discarded.

use super::{Snapshot, SnapshotStore};
use crate::config::PersistenceConfig;
use cinder_core::EntityId;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One unit of work for the writer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PersistOp {
    /// Overwrite the entity's snapshot.
    Save(Snapshot),
    /// Schedule the entity's snapshot to expire.
    Expire {
        /// Entity to expire.
        id: EntityId,
        /// Delay before expiry.
        ttl: Duration,
    },
}

/// Counters for the queue and its writer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Ops accepted into the ring.
    pub enqueued: u64,
    /// Ops refused because the ring was full.
    pub dropped: u64,
    /// Snapshots written to the store.
    pub saved: u64,
    /// Expiries scheduled in the store.
    pub expired: u64,
    /// Ops the store rejected.
    pub failed: u64,
    /// Writer batches processed.
    pub batches: u64,
}

#[derive(Debug, Default)]
struct RingState {
    ops: VecDeque<PersistOp>,
    /// Ops taken by the writer and not yet applied.
    in_flight: usize,
}

/// Thread-safe ring buffer between producers and the writer.
#[derive(Debug)]
struct OpRing {
    state: Mutex<RingState>,
    not_empty: Condvar,
    idle: Condvar,
    max_size: usize,
}

impl OpRing {
    fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                ops: VecDeque::with_capacity(max_size),
                in_flight: 0,
            }),
            not_empty: Condvar::new(),
            idle: Condvar::new(),
            max_size,
        }
    }

    /// Appends an op. Returns it back if the ring is full.
    fn push(&self, op: PersistOp) -> Result<(), PersistOp> {
        let mut state = self.state.lock();
        if state.ops.len() >= self.max_size {
            return Err(op);
        }
        state.ops.push_back(op);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes up to `max_count` ops, waiting up to `timeout` for the first.
    fn drain(&self, max_count: usize, timeout: Duration) -> Vec<PersistOp> {
        let mut state = self.state.lock();
        if state.ops.is_empty() {
            self.not_empty.wait_for(&mut state, timeout);
        }
        let count = state.ops.len().min(max_count);
        state.in_flight = count;
        state.ops.drain(..count).collect()
    }

    fn finish_batch(&self) {
        let mut state = self.state.lock();
        state.in_flight = 0;
        if state.ops.is_empty() {
            self.idle.notify_all();
        }
    }

    fn len(&self) -> usize {
        self.state.lock().ops.len()
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !(state.ops.is_empty() && state.in_flight == 0) {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.ops.is_empty() && state.in_flight == 0;
            }
        }
        true
    }
}

/// Bounded write-behind queue with one background writer.
pub struct WriteBehindQueue {
    ring: Arc<OpRing>,
    writer_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    stats: Arc<Mutex<PersistStats>>,
}

impl WriteBehindQueue {
    /// Starts the writer thread against `store`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the writer thread cannot be spawned.
    pub fn start(store: Arc<dyn SnapshotStore>, config: &PersistenceConfig) -> std::io::Result<Self> {
        let ring = Arc::new(OpRing::new(config.queue_capacity.max(1)));
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(PersistStats::default()));

        let writer_ring = Arc::clone(&ring);
        let writer_shutdown = Arc::clone(&shutdown);
        let writer_stats = Arc::clone(&stats);
        let batch_size = config.max_batch_size.max(1);
        let idle_wait = config.idle_wait();

        let writer_handle = thread::Builder::new()
            .name("cinder-persist".to_string())
            .spawn(move || {
                Self::writer_loop(&*store, &writer_ring, &writer_shutdown, &writer_stats, batch_size, idle_wait);
            })?;

        Ok(Self {
            ring,
            writer_handle: Some(writer_handle),
            shutdown,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            stats,
        })
    }

    fn writer_loop(
        store: &dyn SnapshotStore,
        ring: &OpRing,
        shutdown: &AtomicBool,
        stats: &Mutex<PersistStats>,
        batch_size: usize,
        idle_wait: Duration,
    ) {
        loop {
            let stopping = shutdown.load(Ordering::Acquire);
            let batch = ring.drain(batch_size, idle_wait);
            if batch.is_empty() {
                ring.finish_batch();
                if stopping {
                    break;
                }
                continue;
            }

            let mut batch_stats = PersistStats::default();
            for op in &batch {
                Self::apply(store, op, &mut batch_stats);
            }
            {
                let mut s = stats.lock();
                s.saved += batch_stats.saved;
                s.expired += batch_stats.expired;
                s.failed += batch_stats.failed;
                s.batches += 1;
            }
            ring.finish_batch();
        }
        tracing::debug!("persistence writer stopped");
    }

    fn apply(store: &dyn SnapshotStore, op: &PersistOp, stats: &mut PersistStats) {
        let result = match op {
            PersistOp::Save(snapshot) => store.set(snapshot.id, snapshot).map(|()| stats.saved += 1),
            PersistOp::Expire { id, ttl } => store.expire(*id, *ttl).map(|()| stats.expired += 1),
        };
        if let Err(error) = result {
            stats.failed += 1;
            tracing::warn!(?op, %error, "snapshot store rejected write");
        }
    }

    fn push(&self, op: PersistOp) -> bool {
        match self.ring.push(op) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(op) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(?op, "persistence queue full, dropping");
                false
            }
        }
    }

    /// Queues a snapshot write. Never blocks.
    ///
    /// Returns `false` if the queue was full and the snapshot was dropped.
    pub fn enqueue(&self, snapshot: Snapshot) -> bool {
        self.push(PersistOp::Save(snapshot))
    }

    /// Queues a delayed expiry for `id`. Never blocks.
    ///
    /// Returns `false` if the queue was full.
    pub fn schedule_expiry(&self, id: EntityId, ttl: Duration) -> bool {
        let accepted = self.push(PersistOp::Expire { id, ttl });
        if !accepted {
            tracing::warn!(%id, "persistence queue full, snapshot expiry not scheduled");
        }
        accepted
    }

    /// Ops waiting for the writer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ring.len()
    }

    /// Blocks until the writer has applied everything queued so far, or
    /// `timeout` elapses. Returns `true` if the queue drained.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.ring.wait_idle(timeout)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PersistStats {
        let mut stats = self.stats.lock().clone();
        stats.enqueued = self.enqueued.load(Ordering::Relaxed);
        stats.dropped = self.dropped.load(Ordering::Relaxed);
        stats
    }
}

impl Drop for WriteBehindQueue {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        {
            let _state = self.ring.state.lock();
            self.ring.not_empty.notify_all();
        }
        if let Some(handle) = self.writer_handle.take() {
            let _ = handle.join();
        }
    }
}
