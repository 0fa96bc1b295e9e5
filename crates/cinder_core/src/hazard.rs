//! # Hazard Damage
//!
//! Health bookkeeping for one hazard tick. The server applies it
//! authoritatively; the client applies only the damage half as a prediction
//! and lets the server decide deaths.

use crate::sequence::{seq_next, SequenceNumber};
use crate::world::WorldConfig;

/// Health plus the counter that orders damage events.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vitals {
    /// Current health, `0..=full_health`.
    pub health: f32,
    /// Incremented on every damage event and on respawn.
    pub damage_seq: SequenceNumber,
}

impl Vitals {
    /// Full health with a fresh damage counter.
    #[must_use]
    pub fn full(world: &WorldConfig) -> Self {
        Self {
            health: world.full_health,
            damage_seq: 0,
        }
    }

    /// Returns true at exactly full health.
    #[inline]
    #[must_use]
    pub fn is_full(&self, world: &WorldConfig) -> bool {
        self.health >= world.full_health
    }
}

/// What a hazard tick did to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HazardOutcome {
    /// Standing on walkable ground.
    Safe,
    /// Took damage and survived.
    Damaged,
    /// Health reached zero; vitals were reset to full. The caller moves the
    /// entity back to spawn.
    Respawned,
}

/// Runs one hazard tick against `vitals`.
pub fn apply_hazard(vitals: &mut Vitals, walkable: bool, world: &WorldConfig) -> HazardOutcome {
    if walkable {
        return HazardOutcome::Safe;
    }

    vitals.damage_seq = seq_next(vitals.damage_seq);
    vitals.health -= world.hazard_damage;
    if vitals.health > 0.0 {
        return HazardOutcome::Damaged;
    }

    vitals.health = world.full_health;
    vitals.damage_seq = seq_next(vitals.damage_seq);
    HazardOutcome::Respawned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walkable_is_safe() {
        let world = WorldConfig::default();
        let mut vitals = Vitals::full(&world);
        assert_eq!(apply_hazard(&mut vitals, true, &world), HazardOutcome::Safe);
        assert_eq!(vitals, Vitals::full(&world));
    }

    #[test]
    fn test_damage_increments_sequence() {
        let world = WorldConfig::default();
        let mut vitals = Vitals::full(&world);
        assert_eq!(apply_hazard(&mut vitals, false, &world), HazardOutcome::Damaged);
        assert!((vitals.health - 97.5).abs() < f32::EPSILON);
        assert_eq!(vitals.damage_seq, 1);
    }

    #[test]
    fn test_lethal_damage_respawns() {
        let world = WorldConfig::default();
        let mut vitals = Vitals {
            health: 2.5,
            damage_seq: 10,
        };
        assert_eq!(apply_hazard(&mut vitals, false, &world), HazardOutcome::Respawned);
        assert!(vitals.is_full(&world));
        // One for the hit, one for the respawn.
        assert_eq!(vitals.damage_seq, 12);
    }

    #[test]
    fn test_forty_ticks_to_die() {
        let world = WorldConfig::default();
        let mut vitals = Vitals::full(&world);
        for _ in 0..39 {
            assert_eq!(apply_hazard(&mut vitals, false, &world), HazardOutcome::Damaged);
        }
        assert_eq!(apply_hazard(&mut vitals, false, &world), HazardOutcome::Respawned);
    }
}
