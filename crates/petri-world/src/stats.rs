//! Per-tick and population statistics.

use crate::grid::Grid;
use petri_core::LineageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happened during one committed tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    /// Generation produced by the tick
    pub generation: u64,
    /// Neighbor-driven births
    pub births: usize,
    /// Living cells that died
    pub deaths: usize,
    /// Children placed by replication
    pub replications: usize,
    /// Replication claims that were discarded
    pub conflicts: usize,
    /// Placed children whose lineage mutated
    pub mutations: usize,
    /// Living cells after the tick
    pub population: usize,
}

/// Snapshot of the population on one grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Census {
    pub population: usize,
    pub lineages: BTreeMap<LineageId, usize>,
    pub mean_energy: f32,
    pub mean_age: f32,
    pub max_age: u32,
    /// Nutrient summed over every site
    pub nutrient: f64,
    pub waste: f64,
}

impl Census {
    pub fn of(grid: &Grid) -> Self {
        let mut census = Census::default();
        let mut energy = 0.0f64;
        let mut age = 0u64;

        for (_, cell) in grid.living() {
            census.population += 1;
            *census.lineages.entry(cell.lineage).or_insert(0) += 1;
            energy += cell.energy as f64;
            age += cell.age as u64;
            census.max_age = census.max_age.max(cell.age);
        }

        census.nutrient = grid.total_nutrient();
        census.waste = grid.total_waste();

        if census.population > 0 {
            census.mean_energy = (energy / census.population as f64) as f32;
            census.mean_age = (age as f64 / census.population as f64) as f32;
        }
        census
    }

    /// Largest colony; ties go to the lower lineage id.
    pub fn dominant_lineage(&self) -> Option<(LineageId, usize)> {
        self.lineages
            .iter()
            .fold(None, |best: Option<(LineageId, usize)>, (&id, &count)| match best {
                Some((_, top)) if top >= count => best,
                _ => Some((id, count)),
            })
    }

    pub fn lineage_count(&self) -> usize {
        self.lineages.len()
    }
}
