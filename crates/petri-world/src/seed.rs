//! Building initial grids from seed patterns.

use crate::grid::Grid;
use petri_core::{
    Cell, EnergyConfig, Error, LineageId, Position, Result, SeedPattern, WorldConfig,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Build a fresh grid for `world` populated according to `pattern`.
///
/// Fails with `InvalidSeedPattern` on out-of-range coordinates, a reserved
/// lineage, or a density outside `[0, 1]`.
pub fn seed_grid(pattern: &SeedPattern, world: &WorldConfig, energy: &EnergyConfig) -> Result<Grid> {
    let mut grid = Grid::new(world.width, world.height, world.boundary, world.neighborhood)?;

    match pattern {
        SeedPattern::Cells { cells } => {
            for &pos in cells {
                place(&mut grid, pos, LineageId::FOUNDER, energy.birth_energy)?;
            }
        }
        SeedPattern::Colonies { cells } => {
            for &(pos, lineage) in cells {
                if lineage.is_none() {
                    return Err(Error::InvalidSeedPattern(format!(
                        "cell ({}, {}) uses the reserved empty lineage",
                        pos.x, pos.y
                    )));
                }
                place(&mut grid, pos, lineage, energy.birth_energy)?;
            }
        }
        SeedPattern::Random { density, seed } => {
            if !(0.0..=1.0).contains(density) {
                return Err(Error::InvalidSeedPattern(format!(
                    "density must be in [0, 1], got {}",
                    density
                )));
            }
            let mut rng = ChaCha8Rng::seed_from_u64(*seed);
            let founders = world.founder_lineages.max(1) as u64;
            for y in 0..grid.height() {
                for x in 0..grid.width() {
                    let roll = rng.gen::<f32>();
                    if roll < *density {
                        let lineage = LineageId(1 + rng.gen_range(0..founders));
                        let pos = Position::new(x, y);
                        place(&mut grid, pos, lineage, energy.birth_energy)?;
                    }
                }
            }
        }
    }

    Ok(grid)
}

fn place(grid: &mut Grid, pos: Position, lineage: LineageId, energy: f32) -> Result<()> {
    grid.set(pos, Cell::newborn(lineage, energy)).map_err(|_| {
        Error::InvalidSeedPattern(format!(
            "cell ({}, {}) is outside the {}x{} grid",
            pos.x,
            pos.y,
            grid.width(),
            grid.height()
        ))
    })
}
