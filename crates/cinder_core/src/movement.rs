//! # Movement & Collision
//!
//! [`step`] turns one intent into one new position. The server calls it to
//! decide the truth; the client calls it to guess the truth early and again to
//! replay unconfirmed inputs after a correction. Keep it a pure function.
//!
//! ## Collision Rules
//!
//! Boxes overlap when `|dx| < width && |dy| < height` (strict, so touching
//! edges do not count). Axes are resolved independently against every peer:
//!
//! ```text
//! already overlapping?  ── yes ──▶ forbid the axis only if it closes the gap
//!         │
//!         no ──▶ forbid the axis if moving along it alone would overlap
//! ```
//!
//! A diagonal move whose single-axis halves are both clear can still clip a
//! peer's corner. That case drops the dominant axis (y on a tie) so the entity
//! slides instead of entering the peer.

use crate::entity::Position;
use crate::intent::Intent;
use crate::world::WorldConfig;
use std::f32::consts::FRAC_1_SQRT_2;

/// Strict AABB overlap of two entity boxes.
#[inline]
#[must_use]
pub fn overlaps(a: Position, b: Position, world: &WorldConfig) -> bool {
    (a.x - b.x).abs() < world.entity_width && (a.y - b.y).abs() < world.entity_height
}

/// Raw displacement requested by an intent, before collision.
///
/// Returns `None` when the direction bits cancel out or are absent.
#[must_use]
pub fn displacement(intent: Intent, world: &WorldConfig) -> Option<(f32, f32)> {
    let horizontal = i8::from(intent.contains(Intent::RIGHT)) - i8::from(intent.contains(Intent::LEFT));
    let vertical = i8::from(intent.contains(Intent::DOWN)) - i8::from(intent.contains(Intent::UP));
    if horizontal == 0 && vertical == 0 {
        return None;
    }

    let mut speed = intent.speed(world);
    if horizontal != 0 && vertical != 0 {
        speed *= FRAC_1_SQRT_2;
    }
    Some((f32::from(horizontal) * speed, f32::from(vertical) * speed))
}

/// Advances `position` by one intent, resolving collisions against `peers`.
///
/// `peers` must not contain the moving entity itself.
#[must_use]
pub fn step(position: Position, intent: Intent, peers: &[Position], world: &WorldConfig) -> Position {
    let Some((dx, dy)) = displacement(intent, world) else {
        return position;
    };

    let (allow_x, allow_y) = allowed_axes(position, dx, dy, peers, world);
    let next = Position::new(
        if allow_x { position.x + dx } else { position.x },
        if allow_y { position.y + dy } else { position.y },
    );
    world.clamp(next)
}

/// Per-axis permission flags for a move of `(dx, dy)` from `position`.
fn allowed_axes(position: Position, dx: f32, dy: f32, peers: &[Position], world: &WorldConfig) -> (bool, bool) {
    let moving_x = dx != 0.0;
    let moving_y = dy != 0.0;
    let mut allow_x = moving_x;
    let mut allow_y = moving_y;

    let slide_x = Position::new(position.x + dx, position.y);
    let slide_y = Position::new(position.x, position.y + dy);

    for &other in peers {
        if overlaps(position, other, world) {
            // Stuck inside someone: only separating moves are allowed.
            if (position.x - other.x) * dx < 0.0 {
                allow_x = false;
            }
            if (position.y - other.y) * dy < 0.0 {
                allow_y = false;
            }
            continue;
        }

        if allow_x && overlaps(slide_x, other, world) {
            allow_x = false;
        }
        if allow_y && overlaps(slide_y, other, world) {
            allow_y = false;
        }
    }

    if allow_x && allow_y {
        let target = Position::new(position.x + dx, position.y + dy);
        let clips_corner = peers
            .iter()
            .any(|&other| !overlaps(position, other, world) && overlaps(target, other, world));
        if clips_corner {
            if dx.abs() > dy.abs() {
                allow_x = false;
            } else {
                allow_y = false;
            }
        }
    }

    (allow_x, allow_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn world() -> WorldConfig {
        WorldConfig::default()
    }

    fn approx(a: Position, b: Position) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn test_step_right_normal_speed() {
        let moved = step(Position::new(0.0, 0.0), Intent::RIGHT, &[], &world());
        assert_eq!(moved, Position::new(3.0, 0.0));
    }

    #[test]
    fn test_step_speeds() {
        let w = world();
        let origin = Position::new(0.0, 0.0);
        assert_eq!(step(origin, Intent::LEFT | Intent::SPRINT, &[], &w), Position::new(-60.0, 0.0));
        assert_eq!(step(origin, Intent::UP | Intent::CROUCH, &[], &w), Position::new(0.0, -1.0));
        assert_eq!(
            step(origin, Intent::DOWN | Intent::SPRINT | Intent::CROUCH, &[], &w),
            Position::new(0.0, 3.0)
        );
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let moved = step(Position::new(0.0, 0.0), Intent::UP | Intent::RIGHT, &[], &world());
        let expected = 3.0 * FRAC_1_SQRT_2;
        assert!(approx(moved, Position::new(expected, -expected)));
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let start = Position::new(5.0, 5.0);
        let w = world();
        assert_eq!(step(start, Intent::NONE, &[], &w), start);
        assert_eq!(step(start, Intent::SPRINT, &[], &w), start);
        assert_eq!(step(start, Intent::UP | Intent::DOWN, &[], &w), start);
        assert_eq!(step(start, Intent::LEFT | Intent::RIGHT, &[], &w), start);
    }

    #[test]
    fn test_overlapping_peer_blocks_approach_only() {
        let w = world();
        let a = Position::new(0.0, 0.0);
        let b = Position::new(10.0, 0.0);
        assert!(overlaps(a, b, &w));

        // Toward B: x stays put.
        assert_eq!(step(a, Intent::RIGHT, &[b], &w), a);
        // Away from B: normal move.
        assert_eq!(step(a, Intent::LEFT, &[b], &w), Position::new(-3.0, 0.0));
    }

    #[test]
    fn test_prospective_overlap_blocks_axis() {
        let w = world();
        let a = Position::new(0.0, 0.0);
        let b = Position::new(38.0, 0.0);
        assert!(!overlaps(a, b, &w));

        assert_eq!(step(a, Intent::RIGHT, &[b], &w), a);
        // The y half of a diagonal is unaffected by B.
        let moved = step(a, Intent::RIGHT | Intent::DOWN, &[b], &w);
        assert!((moved.x - 0.0).abs() < f32::EPSILON);
        assert!(moved.y > 0.0);
    }

    #[test]
    fn test_touching_edges_do_not_overlap() {
        let w = world();
        assert!(!overlaps(Position::new(0.0, 0.0), Position::new(37.0, 0.0), &w));
        assert!(!overlaps(Position::new(0.0, 0.0), Position::new(0.0, 56.0), &w));
    }

    #[test]
    fn test_corner_clip_slides() {
        let w = world();
        let a = Position::new(0.0, 0.0);
        let b = Position::new(38.5, 57.0);
        let moved = step(a, Intent::RIGHT | Intent::DOWN, &[b], &w);
        assert!(!overlaps(moved, b, &w));
        assert!(moved.x > 0.0);
        assert!((moved.y - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_clamped_to_map() {
        let w = world();
        let near_edge = Position::new(w.half_width() - w.entity_width - 1.0, 0.0);
        let moved = step(near_edge, Intent::RIGHT | Intent::SPRINT, &[], &w);
        assert!((moved.x - (w.half_width() - w.entity_width)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_never_enters_peer() {
        let w = world();
        let mut rng = StdRng::seed_from_u64(0x00C1_4DE2);
        for _ in 0..20_000 {
            let a = Position::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));
            let b = Position::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));
            if overlaps(a, b, &w) {
                continue;
            }
            let intent = Intent::from_bits(rng.gen_range(0..64));
            let moved = step(a, intent, &[b], &w);
            assert!(!overlaps(moved, b, &w), "a={a:?} b={b:?} intent={intent:?} moved={moved:?}");
        }
    }

    #[test]
    fn test_never_enters_any_peer_in_crowd() {
        let w = world();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let a = Position::new(rng.gen_range(-150.0..150.0), rng.gen_range(-150.0..150.0));
            let peers: Vec<Position> = (0..6)
                .map(|_| Position::new(rng.gen_range(-150.0..150.0), rng.gen_range(-150.0..150.0)))
                .filter(|p| !overlaps(a, *p, &w))
                .collect();
            let intent = Intent::from_bits(rng.gen_range(0..64));
            let moved = step(a, intent, &peers, &w);
            for p in &peers {
                assert!(!overlaps(moved, *p, &w));
            }
        }
    }
}
