//! # Client-Side Prediction
//!
//! The client's mirror of its own entity: predicted position and health,
//! plus the inputs and damage events the server has not confirmed yet.
//!
//! ## How It Works
//!
//! 1. Client numbers an intent, simulates it locally and sends it
//! 2. Server applies it and echoes `(x, y, lastSeq)`
//! 3. Client snaps to the echo and replays every input newer than `lastSeq`
//!
//! ```text
//! Input:      [1] [2] [3] [4] [5]
//!              │   │   │   │   │
//! Prediction: [P1][P2][P3][P4][P5]
//!                      │
//! Server Echo: ───────[S3]────────
//!                      │
//! Reconcile:  snap to S3, replay [4,5]
//! ```
//!
//! Hazard damage follows the same pattern with its own counter, except that
//! at most one predicted damage event is ever outstanding.

use cinder_core::{seq_newer, seq_next, step, EntityId, Intent, Position, SequenceNumber, WorldConfig};
use std::collections::VecDeque;

/// Unconfirmed inputs kept for replay. Older ones are forgotten.
pub const MAX_PENDING_INPUTS: usize = 1024;

/// Snap distance under which a correction counts as none.
const CORRECTION_EPSILON: f32 = 0.01;

/// Input stored for prediction replay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingInput {
    /// Sequence number sent with the intent.
    pub seq: SequenceNumber,
    /// The intent.
    pub intent: Intent,
}

/// Result of a movement reconciliation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReconciliationResult {
    /// Prediction matched the server.
    NoCorrection,
    /// The predicted position moved by `error` units.
    Corrected {
        /// Distance between the old and new prediction.
        error: f32,
    },
}

/// Predicted state of the local entity.
#[derive(Clone, Debug)]
pub struct Mirror {
    id: EntityId,
    position: Position,
    health: f32,
    input_seq: SequenceNumber,
    damage_seq: SequenceNumber,
    pending_inputs: VecDeque<PendingInput>,
    pending_damage: VecDeque<SequenceNumber>,
}

impl Mirror {
    /// Creates a mirror from the server's welcome.
    #[must_use]
    pub fn new(id: EntityId, position: Position, health: f32) -> Self {
        Self {
            id,
            position,
            health,
            input_seq: 0,
            damage_seq: 0,
            pending_inputs: VecDeque::with_capacity(64),
            pending_damage: VecDeque::with_capacity(1),
        }
    }

    /// Local entity id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Predicted position.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Predicted health.
    #[must_use]
    pub const fn health(&self) -> f32 {
        self.health
    }

    /// Last issued input sequence.
    #[must_use]
    pub const fn input_seq(&self) -> SequenceNumber {
        self.input_seq
    }

    /// Local damage counter.
    #[must_use]
    pub const fn damage_seq(&self) -> SequenceNumber {
        self.damage_seq
    }

    /// Unconfirmed inputs, oldest first.
    pub fn pending_inputs(&self) -> impl Iterator<Item = &PendingInput> {
        self.pending_inputs.iter()
    }

    /// Number of unconfirmed inputs.
    #[must_use]
    pub fn pending_input_count(&self) -> usize {
        self.pending_inputs.len()
    }

    /// Number of unconfirmed damage events (0 or 1).
    #[must_use]
    pub fn pending_damage_count(&self) -> usize {
        self.pending_damage.len()
    }

    /// Numbers and predicts a local intent.
    ///
    /// Returns the sequence to send, or `None` for an intent with no
    /// direction bit, which the server would ignore.
    pub fn apply_local_intent(&mut self, intent: Intent, peers: &[Position], world: &WorldConfig) -> Option<SequenceNumber> {
        if !intent.has_direction() {
            return None;
        }

        let seq = seq_next(self.input_seq);
        self.input_seq = seq;
        self.position = step(self.position, intent, peers, world);

        if self.pending_inputs.len() >= MAX_PENDING_INPUTS {
            self.pending_inputs.pop_front();
        }
        self.pending_inputs.push_back(PendingInput { seq, intent });
        Some(seq)
    }

    /// Applies an authoritative echo of the local entity.
    ///
    /// Snaps to the server position, forgets every input the echo covers and
    /// replays the rest in order.
    pub fn reconcile_movement(
        &mut self,
        position: Position,
        last_seq: SequenceNumber,
        peers: &[Position],
        world: &WorldConfig,
    ) -> ReconciliationResult {
        let predicted = self.position;

        self.pending_inputs.retain(|input| seq_newer(input.seq, last_seq));
        self.position = self
            .pending_inputs
            .iter()
            .fold(position, |at, input| step(at, input.intent, peers, world));

        let error = predicted.distance_squared(self.position).sqrt();
        if error < CORRECTION_EPSILON {
            ReconciliationResult::NoCorrection
        } else {
            ReconciliationResult::Corrected { error }
        }
    }

    /// Predicts one hazard tick.
    ///
    /// Returns true if damage was predicted. A prediction the server has not
    /// confirmed by the next call is rolled back first, so a hit the server
    /// never made (the entity left the hazard in between) costs one interval
    /// of wrong health instead of freezing prediction. At most one prediction
    /// is pending afterwards.
    pub fn predict_hazard(&mut self, walkable: bool, world: &WorldConfig) -> bool {
        if let Some(stale) = self.pending_damage.pop_front() {
            self.health = (self.health + world.hazard_damage).min(world.full_health);
            if self.damage_seq == stale {
                self.damage_seq = stale.wrapping_sub(1);
            }
        }
        if walkable {
            return false;
        }
        self.damage_seq = seq_next(self.damage_seq);
        self.health = (self.health - world.hazard_damage).max(0.0);
        self.pending_damage.push_back(self.damage_seq);
        true
    }

    /// Applies an authoritative health update for the local entity.
    ///
    /// Full health means the server respawned the entity: pending damage is
    /// discarded and the counter adopts the server's.
    pub fn reconcile_health(&mut self, health: f32, damage_seq: SequenceNumber, world: &WorldConfig) {
        self.health = health;

        if health >= world.full_health {
            self.pending_damage.clear();
            self.damage_seq = damage_seq;
            return;
        }

        self.pending_damage.retain(|&seq| seq_newer(seq, damage_seq));
        for _ in &self.pending_damage {
            self.health -= world.hazard_damage;
        }
        self.health = self.health.max(0.0);

        if seq_newer(damage_seq, self.damage_seq) {
            self.damage_seq = damage_seq;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror_at(x: f32, y: f32) -> Mirror {
        Mirror::new(EntityId::new(1), Position::new(x, y), 100.0)
    }

    #[test]
    fn test_predict_then_confirm() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);

        let seq = mirror.apply_local_intent(Intent::RIGHT, &[], &world);
        assert_eq!(seq, Some(1));
        assert_eq!(mirror.position(), Position::new(3.0, 0.0));

        let result = mirror.reconcile_movement(Position::new(3.0, 0.0), 1, &[], &world);
        assert_eq!(result, ReconciliationResult::NoCorrection);
        assert_eq!(mirror.position(), Position::new(3.0, 0.0));
        assert_eq!(mirror.pending_input_count(), 0);
    }

    #[test]
    fn test_replay_unconfirmed() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        for _ in 0..3 {
            mirror.apply_local_intent(Intent::RIGHT, &[], &world);
        }
        assert_eq!(mirror.position(), Position::new(9.0, 0.0));

        // Server only saw seq 1 and put us somewhere else.
        let result = mirror.reconcile_movement(Position::new(100.0, 0.0), 1, &[], &world);
        assert_eq!(mirror.position(), Position::new(106.0, 0.0));
        assert_eq!(mirror.pending_input_count(), 2);
        assert!(matches!(result, ReconciliationResult::Corrected { error } if (error - 97.0).abs() < 1e-3));
    }

    #[test]
    fn test_confirmed_input_never_replayed_twice() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.apply_local_intent(Intent::DOWN, &[], &world);
        mirror.apply_local_intent(Intent::DOWN, &[], &world);

        mirror.reconcile_movement(Position::new(0.0, 3.0), 1, &[], &world);
        // Duplicate echo for the same sequence.
        mirror.reconcile_movement(Position::new(0.0, 3.0), 1, &[], &world);
        assert_eq!(mirror.position(), Position::new(0.0, 6.0));

        mirror.reconcile_movement(Position::new(0.0, 6.0), 2, &[], &world);
        assert_eq!(mirror.position(), Position::new(0.0, 6.0));
        assert_eq!(mirror.pending_input_count(), 0);
    }

    #[test]
    fn test_sequence_wraps() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.input_seq = 65_534;
        assert_eq!(mirror.apply_local_intent(Intent::LEFT, &[], &world), Some(65_535));
        assert_eq!(mirror.apply_local_intent(Intent::LEFT, &[], &world), Some(0));

        mirror.reconcile_movement(Position::new(-3.0, 0.0), 65_535, &[], &world);
        let pending: Vec<_> = mirror.pending_inputs().map(|p| p.seq).collect();
        assert_eq!(pending, vec![0]);
        assert_eq!(mirror.position(), Position::new(-6.0, 0.0));
    }

    #[test]
    fn test_directionless_intent_not_sent() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        assert_eq!(mirror.apply_local_intent(Intent::SPRINT, &[], &world), None);
        assert_eq!(mirror.input_seq(), 0);
        assert_eq!(mirror.pending_input_count(), 0);
    }

    #[test]
    fn test_single_outstanding_damage() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        assert!(mirror.predict_hazard(false, &world));
        // Unconfirmed hit is replaced, not stacked.
        assert!(mirror.predict_hazard(false, &world));
        assert_eq!(mirror.pending_damage_count(), 1);
        assert!((mirror.health() - 97.5).abs() < f32::EPSILON);
        assert_eq!(mirror.damage_seq(), 1);
    }

    #[test]
    fn test_unconfirmed_damage_rolled_back_off_hazard() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        assert!(mirror.predict_hazard(false, &world));

        // Stepped off before the server ticked; no health update ever came.
        assert!(!mirror.predict_hazard(true, &world));
        assert_eq!(mirror.pending_damage_count(), 0);
        assert!((mirror.health() - 100.0).abs() < f32::EPSILON);
        assert_eq!(mirror.damage_seq(), 0);

        // Back on lava, prediction resumes.
        assert!(mirror.predict_hazard(false, &world));
        assert_eq!(mirror.damage_seq(), 1);
        mirror.reconcile_health(97.5, 1, &world);
        assert_eq!(mirror.pending_damage_count(), 0);
        assert!((mirror.health() - 97.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_late_confirmation_after_rollback() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.predict_hazard(false, &world);
        mirror.predict_hazard(false, &world);
        mirror.reconcile_health(97.5, 1, &world);
        assert_eq!(mirror.pending_damage_count(), 0);
        assert!((mirror.health() - 97.5).abs() < f32::EPSILON);

        assert!(mirror.predict_hazard(false, &world));
        assert_eq!(mirror.damage_seq(), 2);
        assert!((mirror.health() - 95.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_damage_confirmed() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.predict_hazard(false, &world);
        mirror.reconcile_health(97.5, 1, &world);
        assert_eq!(mirror.pending_damage_count(), 0);
        assert!((mirror.health() - 97.5).abs() < f32::EPSILON);

        assert!(mirror.predict_hazard(false, &world));
        assert_eq!(mirror.damage_seq(), 2);
    }

    #[test]
    fn test_damage_reapplied_when_server_behind() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.predict_hazard(false, &world);
        mirror.reconcile_health(97.5, 1, &world);
        mirror.predict_hazard(false, &world);

        // Late update for seq 1 arrives again; seq 2 is still pending.
        mirror.reconcile_health(97.5, 1, &world);
        assert_eq!(mirror.pending_damage_count(), 1);
        assert!((mirror.health() - 95.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_counter_resyncs_forward() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.reconcile_health(90.0, 4, &world);
        assert_eq!(mirror.damage_seq(), 4);
        assert!(mirror.predict_hazard(false, &world));
        assert_eq!(mirror.damage_seq(), 5);
    }

    #[test]
    fn test_respawn_clears_pending_damage() {
        let world = WorldConfig::default();
        let mut mirror = mirror_at(0.0, 0.0);
        mirror.health = 2.5;
        mirror.predict_hazard(false, &world);
        assert!(mirror.health().abs() < f32::EPSILON);

        mirror.reconcile_health(100.0, 42, &world);
        assert_eq!(mirror.pending_damage_count(), 0);
        assert_eq!(mirror.damage_seq(), 42);
        assert!((mirror.health() - 100.0).abs() < f32::EPSILON);
    }
}
