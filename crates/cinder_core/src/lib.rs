//! # Cinder Core
//!
//! The deterministic simulation shared by the authoritative server and every
//! predicting client.
//!
//! ## Architecture Rules
//!
//! 1. **One simulator** - the server and the client call the exact same
//!    [`step`] function, so a replayed input lands on the same coordinates
//! 2. **No sockets, no clocks** - the only I/O is [`TileMap::load`], and
//!    the parser behind it takes a `&str`
//! 3. **Wraparound everywhere** - every sequence comparison goes through
//!    [`seq_newer`]
//!
//! ## Example
//!
//! ```rust
//! use cinder_core::{step, Intent, Position, WorldConfig};
//!
//! let world = WorldConfig::default();
//! let moved = step(Position::new(0.0, 0.0), Intent::RIGHT, &[], &world);
//! assert_eq!(moved, Position::new(3.0, 0.0));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod entity;
pub mod hazard;
pub mod intent;
pub mod movement;
pub mod sequence;
pub mod terrain;
pub mod world;

pub use entity::{EntityId, Position};
pub use hazard::{apply_hazard, HazardOutcome, Vitals};
pub use intent::Intent;
pub use movement::{displacement, overlaps, step};
pub use sequence::{seq_newer, seq_next, SequenceNumber};
pub use terrain::{TerrainError, TileCell, TileMap};
pub use world::WorldConfig;
