//! # Movement Intent
//!
//! One byte of input per tick: four direction bits and two modifiers.
//!
//! ```text
//! bit  5       4       3      2     1     0
//!    CROUCH  SPRINT  RIGHT  DOWN  LEFT  UP
//! ```

use crate::world::WorldConfig;
use std::ops::BitOr;

/// Bitmask of movement intentions for one input interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Intent(pub u8);

impl Intent {
    /// No input.
    pub const NONE: Self = Self(0);
    /// Move toward negative y.
    pub const UP: Self = Self(1 << 0);
    /// Move toward negative x.
    pub const LEFT: Self = Self(1 << 1);
    /// Move toward positive y.
    pub const DOWN: Self = Self(1 << 2);
    /// Move toward positive x.
    pub const RIGHT: Self = Self(1 << 3);
    /// Sprint modifier.
    pub const SPRINT: Self = Self(1 << 4);
    /// Crouch modifier.
    pub const CROUCH: Self = Self(1 << 5);
    /// All four direction bits.
    pub const DIRECTION_MASK: u8 = Self::UP.0 | Self::LEFT.0 | Self::DOWN.0 | Self::RIGHT.0;

    /// Wraps a raw wire byte.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw wire byte.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if at least one direction bit is set.
    #[inline]
    #[must_use]
    pub const fn has_direction(self) -> bool {
        self.0 & Self::DIRECTION_MASK != 0
    }

    /// Speed selected by the modifier bits.
    ///
    /// SPRINT alone sprints, CROUCH alone crouches. Both together cancel out
    /// to normal speed.
    #[inline]
    #[must_use]
    pub fn speed(self, world: &WorldConfig) -> f32 {
        match (self.contains(Self::SPRINT), self.contains(Self::CROUCH)) {
            (true, false) => world.sprint_speed,
            (false, true) => world.crouch_speed,
            _ => world.normal_speed,
        }
    }
}

impl BitOr for Intent {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_selection() {
        let world = WorldConfig::default();
        assert!((Intent::RIGHT.speed(&world) - world.normal_speed).abs() < f32::EPSILON);
        assert!(((Intent::RIGHT | Intent::SPRINT).speed(&world) - world.sprint_speed).abs() < f32::EPSILON);
        assert!(((Intent::RIGHT | Intent::CROUCH).speed(&world) - world.crouch_speed).abs() < f32::EPSILON);
        let both = Intent::RIGHT | Intent::SPRINT | Intent::CROUCH;
        assert!((both.speed(&world) - world.normal_speed).abs() < f32::EPSILON);
    }

    #[test]
    fn test_direction_mask() {
        assert!(!Intent::SPRINT.has_direction());
        assert!(!(Intent::SPRINT | Intent::CROUCH).has_direction());
        assert!((Intent::UP | Intent::SPRINT).has_direction());
        assert_eq!(Intent::DIRECTION_MASK, 0b1111);
    }
}
