//! 2D grid of cells.

use petri_core::{BoundaryPolicy, Cell, Error, Neighborhood, Offset, Position, Result, Site};
use serde::{Deserialize, Serialize};

/// One entry of a cell's neighborhood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Canonical offset from the center cell
    pub offset: Offset,
    /// Resolved coordinate, `None` when it falls off a dead-border grid
    pub position: Option<Position>,
    pub cell: Cell,
}

impl Neighbor {
    /// In-grid and dead: a valid replication target.
    pub fn is_vacant(&self) -> bool {
        self.position.is_some() && !self.cell.alive
    }
}

/// A fixed-size rectangular grid with a neighborhood shape and edge policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    boundary: BoundaryPolicy,
    neighborhood: Neighborhood,
    cells: Vec<Cell>,
    sites: Vec<Site>,
}

/// Dimensions must be positive and the cell count must fit an `i32` index.
fn check_dimensions(width: i32, height: i32) -> Result<usize> {
    if width <= 0 || height <= 0 {
        return Err(Error::Validation(format!(
            "Grid dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    let size = (width as i64) * (height as i64);
    if size > i32::MAX as i64 {
        return Err(Error::Validation(format!(
            "Grid {}x{} is too large",
            width, height
        )));
    }
    Ok(size as usize)
}

impl Grid {
    /// Create an all-dead grid with empty sites.
    pub fn new(
        width: i32,
        height: i32,
        boundary: BoundaryPolicy,
        neighborhood: Neighborhood,
    ) -> Result<Self> {
        let size = check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            boundary,
            neighborhood,
            cells: vec![Cell::dead(); size],
            sites: vec![Site::default(); size],
        })
    }

    /// An all-dead grid with the same shape, policies, and sites.
    pub fn empty_like(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            boundary: self.boundary,
            neighborhood: self.neighborhood,
            cells: vec![Cell::dead(); self.cells.len()],
            sites: self.sites.clone(),
        }
    }

    /// Check a grid built outside [`Grid::new`], such as a deserialized one.
    ///
    /// Dead cells must be exactly [`Cell::dead`], living cells need a lineage
    /// and energy in `0..=max_energy`, and every site must be finite and
    /// non-negative.
    pub fn validate(&self, max_energy: f32) -> Result<()> {
        let size = check_dimensions(self.width, self.height)?;
        if self.cells.len() != size || self.sites.len() != size {
            return Err(Error::Validation(format!(
                "Grid holds {} cells and {} sites for {}x{}",
                self.cells.len(),
                self.sites.len(),
                self.width,
                self.height
            )));
        }

        for (pos, cell) in self.iter() {
            let reason = if !cell.alive {
                (*cell != Cell::dead()).then_some("dead cell carries state")
            } else if cell.lineage.is_none() {
                Some("living cell has no lineage")
            } else if !cell.energy.is_finite() || !(0.0..=max_energy).contains(&cell.energy) {
                Some("energy out of range")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(Error::Validation(format!(
                    "Cell at ({}, {}): {}",
                    pos.x, pos.y, reason
                )));
            }
        }

        if let Some(index) = self.sites.iter().position(|site| !site.is_valid()) {
            let pos = self.index_to_pos(index);
            return Err(Error::Validation(format!(
                "Site at ({}, {}) holds {:?}",
                pos.x, pos.y, self.sites[index]
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    pub fn neighborhood(&self) -> Neighborhood {
        self.neighborhood
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.in_bounds(self.width, self.height)
    }

    fn check(&self, pos: Position) -> Result<usize> {
        if self.contains(pos) {
            Ok(self.pos_to_index(pos))
        } else {
            Err(Error::OutOfBounds {
                x: pos.x,
                y: pos.y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Get the cell at `pos`. Never wraps.
    pub fn get(&self, pos: Position) -> Result<&Cell> {
        let index = self.check(pos)?;
        Ok(&self.cells[index])
    }

    /// Overwrite the cell at `pos`. Never wraps.
    pub fn set(&mut self, pos: Position, cell: Cell) -> Result<()> {
        let index = self.check(pos)?;
        self.cells[index] = cell;
        Ok(())
    }

    /// Coordinate reached from `pos` by `offset` under the boundary policy.
    pub fn resolve(&self, pos: Position, offset: Offset) -> Option<Position> {
        let target = pos.offset(offset);
        match self.boundary {
            BoundaryPolicy::Torus => Some(target.wrap(self.width, self.height)),
            BoundaryPolicy::DeadBorder => self.contains(target).then_some(target),
        }
    }

    /// Neighbors of `pos` in canonical order.
    pub fn neighbors(&self, pos: Position) -> Result<Vec<Neighbor>> {
        let mut out = Vec::with_capacity(self.neighborhood.len());
        self.neighbors_into(pos, &mut out)?;
        Ok(out)
    }

    /// Like [`Grid::neighbors`], reusing `out`.
    pub fn neighbors_into(&self, pos: Position, out: &mut Vec<Neighbor>) -> Result<()> {
        self.check(pos)?;
        out.clear();
        for &offset in self.neighborhood.offsets() {
            let position = self.resolve(pos, offset);
            let cell = match position {
                Some(p) => self.cells[self.pos_to_index(p)],
                None => Cell::dead(),
            };
            out.push(Neighbor {
                offset,
                position,
                cell,
            });
        }
        Ok(())
    }

    /// Chemistry at `pos`. Never wraps.
    pub fn site(&self, pos: Position) -> Result<&Site> {
        let index = self.check(pos)?;
        Ok(&self.sites[index])
    }

    pub fn set_site(&mut self, pos: Position, site: Site) -> Result<()> {
        let index = self.check(pos)?;
        self.sites[index] = site;
        Ok(())
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub(crate) fn sites_mut(&mut self) -> &mut [Site] {
        &mut self.sites
    }

    pub(crate) fn with_sites(mut self, sites: Vec<Site>) -> Self {
        debug_assert_eq!(sites.len(), self.cells.len());
        self.sites = sites;
        self
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut [Cell], &mut [Site]) {
        (&mut self.cells, &mut self.sites)
    }

    pub fn total_nutrient(&self) -> f64 {
        self.sites.iter().map(|s| s.nutrient as f64).sum()
    }

    pub fn total_waste(&self) -> f64 {
        self.sites.iter().map(|s| s.waste as f64).sum()
    }

    pub(crate) fn pos_to_index(&self, pos: Position) -> usize {
        (pos.y * self.width + pos.x) as usize
    }

    /// Get position from index
    pub fn index_to_pos(&self, index: usize) -> Position {
        let x = (index as i32) % self.width;
        let y = (index as i32) / self.width;
        Position::new(x, y)
    }

    /// Iterator over all positions in row-major order
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.cells.len()).map(move |i| self.index_to_pos(i))
    }

    /// Iterator over all cells with positions
    pub fn iter(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (self.index_to_pos(i), cell))
    }

    /// Iterator over living cells only
    pub fn living(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        self.iter().filter(|(_, cell)| cell.alive)
    }

    pub fn living_count(&self) -> usize {
        self.cells.iter().filter(|c| c.alive).count()
    }

    /// A new `width x height` grid with the overlapping region copied over.
    pub fn resized(&self, width: i32, height: i32) -> Result<Self> {
        let mut grid = Self::new(width, height, self.boundary, self.neighborhood)?;
        for y in 0..height.min(self.height) {
            for x in 0..width.min(self.width) {
                let pos = Position::new(x, y);
                let index = grid.pos_to_index(pos);
                let source = self.pos_to_index(pos);
                grid.cells[index] = self.cells[source];
                grid.sites[index] = self.sites[source];
            }
        }
        Ok(grid)
    }
}
