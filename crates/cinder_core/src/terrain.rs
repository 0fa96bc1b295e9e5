//! # Terrain
//!
//! Text tile maps. One character is one tile; rows are lines.
//!
//! | Glyph | Meaning |
//! |-------|---------|
//! | `#` | hazard (non-walkable) |
//! | `.` | floor |
//! | `← → ↑ ↓ ↖ ↗ ↘ ↙ ⇦ ⇨ ⇧ ⇩` | floor with a direction marker |
//!
//! Anything else is skipped and behaves like a cell that was never defined:
//! walkable.

use crate::entity::Position;
use crate::world::WorldConfig;
use std::collections::HashMap;
use thiserror::Error;

/// Glyphs that mark a walkable floor tile.
const FLOOR_GLYPHS: [char; 13] = ['.', '←', '→', '↑', '↓', '↖', '↗', '↘', '↙', '⇦', '⇨', '⇧', '⇩'];

/// Glyph that marks a hazard tile.
const HAZARD_GLYPH: char = '#';

/// Errors raised while loading a tile map.
#[derive(Error, Debug)]
pub enum TerrainError {
    /// The map source could not be read.
    #[error("failed to read tile map {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Column/row index of a terrain tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCell {
    /// Column.
    pub tx: i32,
    /// Row.
    pub ty: i32,
}

impl TileCell {
    /// Creates a cell index.
    #[inline]
    #[must_use]
    pub const fn new(tx: i32, ty: i32) -> Self {
        Self { tx, ty }
    }

    /// Cell under an entity's feet.
    ///
    /// Samples the row `foot_offset` units above the bottom of the box so an
    /// entity standing at the edge of a hazard is judged by where it stands.
    #[must_use]
    pub fn under(position: Position, world: &WorldConfig) -> Self {
        let feet_y = position.y + (world.entity_height - world.foot_offset);
        let tx = ((position.x + world.half_width()) / world.tile_size).floor();
        let ty = ((feet_y + world.half_height()) / world.tile_size).floor();
        Self::new(tx as i32, ty as i32)
    }
}

/// Walkability lookup for every defined tile.
#[derive(Clone, Debug, Default)]
pub struct TileMap {
    cells: HashMap<TileCell, bool>,
}

impl TileMap {
    /// A map with no defined cells. Everything is walkable.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a text map.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut cells = HashMap::new();
        for (row, line) in source.lines().enumerate() {
            for (col, glyph) in line.chars().enumerate() {
                let walkable = if glyph == HAZARD_GLYPH {
                    false
                } else if FLOOR_GLYPHS.contains(&glyph) {
                    true
                } else {
                    continue;
                };
                cells.insert(TileCell::new(col as i32, row as i32), walkable);
            }
        }
        Self { cells }
    }

    /// Reads and parses a text map from disk.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Io`] if the file cannot be read.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, TerrainError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TerrainError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&source))
    }

    /// Marks a single cell. Used by tests and map tooling.
    pub fn set(&mut self, cell: TileCell, walkable: bool) {
        self.cells.insert(cell, walkable);
    }

    /// Walkability of a cell. Undefined cells are walkable.
    #[inline]
    #[must_use]
    pub fn is_walkable(&self, cell: TileCell) -> bool {
        self.cells.get(&cell).copied().unwrap_or(true)
    }

    /// Walkability of the cell under an entity at `position`.
    #[inline]
    #[must_use]
    pub fn is_walkable_at(&self, position: Position, world: &WorldConfig) -> bool {
        self.is_walkable(TileCell::under(position, world))
    }

    /// Number of defined cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if no cell is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
