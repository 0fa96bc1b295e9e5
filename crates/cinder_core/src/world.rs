//! # World Configuration
//!
//! Map bounds, entity size, speeds, spawn point and hazard damage.
//!
//! The map is centered on the origin. An entity's position is the top-left
//! corner of its box, so the reachable range is
//! `[-half_width, half_width - entity_width]` on x and the same shape on y.

use crate::entity::Position;
use serde::Deserialize;

/// Tunable constants of the shared simulation.
///
/// Server and client must load identical values, otherwise prediction
/// drifts from authority on every replay.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Units per step without modifiers.
    pub normal_speed: f32,
    /// Units per step with SPRINT.
    pub sprint_speed: f32,
    /// Units per step with CROUCH.
    pub crouch_speed: f32,
    /// Entity bounding box width.
    pub entity_width: f32,
    /// Entity bounding box height.
    pub entity_height: f32,
    /// Full map width.
    pub map_width: f32,
    /// Full map height.
    pub map_height: f32,
    /// Edge length of one terrain tile.
    pub tile_size: f32,
    /// Distance from the bottom of the box to the sampled "feet" row.
    pub foot_offset: f32,
    /// Health removed per hazard tick spent on a non-walkable tile.
    pub hazard_damage: f32,
    /// Health at spawn.
    pub full_health: f32,
    /// Spawn x.
    pub spawn_x: f32,
    /// Spawn y.
    pub spawn_y: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            normal_speed: 3.0,
            sprint_speed: 60.0,
            crouch_speed: 1.0,
            entity_width: 37.0,
            entity_height: 56.0,
            map_width: 76_800.0,
            map_height: 43_200.0,
            tile_size: 40.0,
            foot_offset: 15.0,
            hazard_damage: 2.5,
            full_health: 100.0,
            // Box centered on the origin, rounded toward negative infinity.
            spawn_x: -19.0,
            spawn_y: -28.0,
        }
    }
}

impl WorldConfig {
    /// Half of the map width.
    #[inline]
    #[must_use]
    pub fn half_width(&self) -> f32 {
        (self.map_width / 2.0).floor()
    }

    /// Half of the map height.
    #[inline]
    #[must_use]
    pub fn half_height(&self) -> f32 {
        (self.map_height / 2.0).floor()
    }

    /// Where new and respawned entities appear.
    #[inline]
    #[must_use]
    pub const fn spawn(&self) -> Position {
        Position::new(self.spawn_x, self.spawn_y)
    }

    /// Clamps a position into the reachable map area.
    #[must_use]
    pub fn clamp(&self, position: Position) -> Position {
        let hw = self.half_width();
        let hh = self.half_height();
        Position::new(
            position.x.max(-hw).min(hw - self.entity_width),
            position.y.max(-hh).min(hh - self.entity_height),
        )
    }

    /// Returns true if the position lies inside the reachable map area.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        self.clamp(position) == position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let world = WorldConfig::default();
        assert!((world.half_width() - 38_400.0).abs() < f32::EPSILON);
        assert!((world.half_height() - 21_600.0).abs() < f32::EPSILON);
        assert!(world.contains(world.spawn()));
    }

    #[test]
    fn test_clamp_edges() {
        let world = WorldConfig::default();
        let clamped = world.clamp(Position::new(1.0e9, -1.0e9));
        assert!((clamped.x - (38_400.0 - 37.0)).abs() < f32::EPSILON);
        assert!((clamped.y + 21_600.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let world: WorldConfig = toml::from_str("normal_speed = 5.0").unwrap();
        assert!((world.normal_speed - 5.0).abs() < f32::EPSILON);
        assert!((world.sprint_speed - 60.0).abs() < f32::EPSILON);
        assert!((world.entity_width - 37.0).abs() < f32::EPSILON);
    }
}
