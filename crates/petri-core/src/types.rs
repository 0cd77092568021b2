//! Core type definitions for the simulation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag distinguishing colonies; inherited by offspring, possibly mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LineageId(pub u64);

impl LineageId {
    /// Lineage carried by dead cells.
    pub const NONE: LineageId = LineageId(0);
    /// Lineage given to cells placed without an explicit tag.
    pub const FOUNDER: LineageId = LineageId(1);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 2D position in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, offset: Offset) -> Self {
        Self {
            x: self.x + offset.dx,
            y: self.y + offset.dy,
        }
    }

    /// Apply toroidal wrapping for given world dimensions
    pub fn wrap(&self, width: i32, height: i32) -> Self {
        Self {
            x: self.x.rem_euclid(width),
            y: self.y.rem_euclid(height),
        }
    }

    pub fn in_bounds(&self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.x < width && self.y >= 0 && self.y < height
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Relative displacement from a cell to one of its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Offset {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

const MOORE: [Offset; 8] = [
    Offset::new(-1, -1),
    Offset::new(0, -1),
    Offset::new(1, -1),
    Offset::new(-1, 0),
    Offset::new(1, 0),
    Offset::new(-1, 1),
    Offset::new(0, 1),
    Offset::new(1, 1),
];

const VON_NEUMANN: [Offset; 4] = [
    Offset::new(0, -1),
    Offset::new(-1, 0),
    Offset::new(1, 0),
    Offset::new(0, 1),
];

/// Which surrounding cells count as neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// The 8 surrounding cells.
    #[default]
    Moore,
    /// The 4 orthogonally adjacent cells.
    VonNeumann,
}

impl Neighborhood {
    /// Offsets in canonical enumeration order (row-major around the cell).
    pub fn offsets(&self) -> &'static [Offset] {
        match self {
            Neighborhood::Moore => &MOORE,
            Neighborhood::VonNeumann => &VON_NEUMANN,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Canonical index of `offset`, if it belongs to this neighborhood.
    pub fn index_of(&self, offset: Offset) -> Option<usize> {
        self.offsets().iter().position(|o| *o == offset)
    }
}

/// Neighbor lookup at the grid edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Edges wrap around.
    #[default]
    Torus,
    /// Off-grid neighbors read as dead and cannot be written.
    DeadBorder,
}

/// State of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub alive: bool,
    /// Generations survived since birth
    pub age: u32,
    pub energy: f32,
    pub lineage: LineageId,
    /// Generations left before the cell may replicate again
    pub cooldown: u32,
}

impl Cell {
    pub const fn dead() -> Self {
        Self {
            alive: false,
            age: 0,
            energy: 0.0,
            lineage: LineageId::NONE,
            cooldown: 0,
        }
    }

    pub fn newborn(lineage: LineageId, energy: f32) -> Self {
        Self {
            alive: true,
            age: 0,
            energy,
            lineage,
            cooldown: 0,
        }
    }

    pub fn with_cooldown(mut self, cooldown: u32) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Chemical contents of one grid site, independent of the cell on it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Site {
    pub nutrient: f32,
    pub waste: f32,
}

impl Site {
    pub const fn new(nutrient: f32, waste: f32) -> Self {
        Self { nutrient, waste }
    }

    pub fn is_valid(&self) -> bool {
        self.nutrient.is_finite() && self.nutrient >= 0.0 && self.waste.is_finite() && self.waste >= 0.0
    }
}

/// Initial population handed to `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedPattern {
    /// Explicit living coordinates, all of the founder lineage.
    Cells { cells: Vec<Position> },
    /// Explicit living coordinates with their lineage tags.
    Colonies { cells: Vec<(Position, LineageId)> },
    /// Each cell is alive with probability `density`.
    Random { density: f32, seed: u64 },
}

impl SeedPattern {
    pub fn empty() -> Self {
        SeedPattern::Cells { cells: Vec::new() }
    }

    pub fn cells<I, P>(cells: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Position>,
    {
        SeedPattern::Cells {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    pub fn random(density: f32, seed: u64) -> Self {
        SeedPattern::Random { density, seed }
    }
}

impl Default for SeedPattern {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_wrap() {
        let pos = Position::new(5, 5);
        assert_eq!(pos.wrap(10, 10), Position::new(5, 5));

        let pos = Position::new(-1, -1);
        assert_eq!(pos.wrap(10, 10), Position::new(9, 9));

        let pos = Position::new(10, 10);
        assert_eq!(pos.wrap(10, 10), Position::new(0, 0));
    }

    #[test]
    fn test_in_bounds() {
        assert!(Position::new(0, 0).in_bounds(3, 3));
        assert!(Position::new(2, 2).in_bounds(3, 3));
        assert!(!Position::new(3, 0).in_bounds(3, 3));
        assert!(!Position::new(0, -1).in_bounds(3, 3));
    }

    #[test]
    fn test_canonical_offsets() {
        assert_eq!(Neighborhood::Moore.len(), 8);
        assert_eq!(Neighborhood::VonNeumann.len(), 4);
        assert_eq!(Neighborhood::Moore.offsets()[0], Offset::new(-1, -1));
        assert_eq!(Neighborhood::Moore.index_of(Offset::new(1, 1)), Some(7));
        assert_eq!(Neighborhood::VonNeumann.index_of(Offset::new(1, 1)), None);
        assert_eq!(Neighborhood::Moore.index_of(Offset::new(0, 0)), None);
    }

    #[test]
    fn test_dead_cell_is_zeroed() {
        let cell = Cell::dead();
        assert!(!cell.alive);
        assert_eq!(cell.age, 0);
        assert_eq!(cell.energy, 0.0);
        assert!(cell.lineage.is_none());
        assert_eq!(Cell::default(), cell);
    }

    #[test]
    fn test_seed_pattern_json_shape() {
        let pattern: SeedPattern =
            serde_json::from_str(r#"{"kind":"random","density":0.25,"seed":7}"#).unwrap();
        assert_eq!(pattern, SeedPattern::random(0.25, 7));

        let pattern: SeedPattern =
            serde_json::from_str(r#"{"kind":"cells","cells":[{"x":1,"y":2}]}"#).unwrap();
        assert_eq!(pattern, SeedPattern::cells([(1, 2)]));
    }

    #[test]
    fn test_lineage_ordering() {
        assert!(LineageId::FOUNDER < LineageId::new(2));
        assert!(LineageId::NONE < LineageId::FOUNDER);
    }
}
