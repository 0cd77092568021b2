//! Rule evaluation: (cell, neighborhood, site) -> outcome.

use crate::grid::Neighbor;
use crate::random::CellRng;
use petri_core::{Cell, LifeRule, LineageId, MetabolicRule, Offset, Result, RuleSet, Site};

/// What a single cell does this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Keep the current alive/dead state. A living cell ages by one and its
    /// energy changes by `energy_delta`.
    Remain { energy_delta: f32 },
    /// The cell dies.
    Die,
    /// A dead cell comes alive with the given lineage.
    Birth { lineage: LineageId },
    /// A living cell spawns a child at the neighbor reached by `offset`.
    /// The parent still ages and its energy changes by `energy_delta` before
    /// the replication cost is paid.
    Replicate { offset: Offset, energy_delta: f32 },
}

impl Outcome {
    pub const STAY: Outcome = Outcome::Remain { energy_delta: 0.0 };
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::STAY
    }
}

/// Chemistry seen by one cell during a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Environment {
    /// Site contents after this tick's diffusion
    pub site: Site,
    /// Nutrient the cell absorbs unless it dies; zero for dead cells
    pub uptake: f32,
}

/// A pure mapping from a cell, its neighborhood, and its site to an
/// [`Outcome`].
///
/// Implementations must only read their arguments; any randomness comes from
/// `rng`, which is keyed to the cell and the generation being evaluated.
pub trait Rule: Sync {
    fn evaluate(
        &self,
        cell: &Cell,
        neighbors: &[Neighbor],
        env: &Environment,
        rng: &mut CellRng,
    ) -> Result<Outcome>;
}

pub fn living_neighbors(neighbors: &[Neighbor]) -> usize {
    neighbors.iter().filter(|n| n.cell.alive).count()
}

/// Most common lineage among living neighbors.
///
/// Ties go to the lineage seen first in canonical neighbor order.
pub fn majority_lineage(neighbors: &[Neighbor]) -> Option<LineageId> {
    // (lineage, count); insertion order is first-seen order
    let mut tally: Vec<(LineageId, usize)> = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors.iter().filter(|n| n.cell.alive) {
        match tally.iter_mut().find(|(id, _)| *id == neighbor.cell.lineage) {
            Some((_, count)) => *count += 1,
            None => tally.push((neighbor.cell.lineage, 1)),
        }
    }

    let mut best: Option<(LineageId, usize)> = None;
    for (lineage, count) in tally {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((lineage, count));
        }
    }
    best.map(|(lineage, _)| lineage)
}

fn birth_from(neighbors: &[Neighbor]) -> Outcome {
    match majority_lineage(neighbors) {
        Some(lineage) => Outcome::Birth { lineage },
        None => Outcome::STAY,
    }
}

impl Rule for LifeRule {
    fn evaluate(
        &self,
        cell: &Cell,
        neighbors: &[Neighbor],
        _env: &Environment,
        _rng: &mut CellRng,
    ) -> Result<Outcome> {
        let living = living_neighbors(neighbors);
        let outcome = if cell.alive {
            if self.is_survival(living) {
                Outcome::STAY
            } else {
                Outcome::Die
            }
        } else if self.is_birth(living) {
            birth_from(neighbors)
        } else {
            Outcome::STAY
        };
        Ok(outcome)
    }
}

/// Net energy change of a living cell: absorbed nutrient minus dissipation
/// and waste damage.
fn metabolism(rule: &MetabolicRule, cell: &Cell, env: &Environment) -> f32 {
    let gained = env.uptake * rule.nutrient_yield;
    let spent = rule.dissipation_base + rule.dissipation_per_age * cell.age as f32;
    let poisoned = (env.site.waste - rule.toxin_threshold).max(0.0) * rule.toxin_damage;
    gained - spent - poisoned
}

impl Rule for MetabolicRule {
    fn evaluate(
        &self,
        cell: &Cell,
        neighbors: &[Neighbor],
        env: &Environment,
        rng: &mut CellRng,
    ) -> Result<Outcome> {
        let living = living_neighbors(neighbors);

        if !cell.alive {
            if self.birth.iter().any(|&n| n as usize == living) {
                return Ok(birth_from(neighbors));
            }
            return Ok(Outcome::STAY);
        }

        if cell.energy <= 0.0 {
            return Ok(Outcome::Die);
        }

        if living > self.crowding_limit as usize {
            return Ok(Outcome::Die);
        }

        let energy_delta = metabolism(self, cell, env);

        if cell.energy >= self.replication_threshold
            && cell.cooldown == 0
            && rng.chance(self.replication_probability)
        {
            let vacant: Vec<Offset> = neighbors
                .iter()
                .filter(|n| n.is_vacant())
                .map(|n| n.offset)
                .collect();
            if !vacant.is_empty() {
                let offset = vacant[rng.pick(vacant.len())];
                return Ok(Outcome::Replicate {
                    offset,
                    energy_delta,
                });
            }
        }

        Ok(Outcome::Remain { energy_delta })
    }
}

impl Rule for RuleSet {
    fn evaluate(
        &self,
        cell: &Cell,
        neighbors: &[Neighbor],
        env: &Environment,
        rng: &mut CellRng,
    ) -> Result<Outcome> {
        match self {
            RuleSet::Life(rule) => rule.evaluate(cell, neighbors, env, rng),
            RuleSet::Metabolic(rule) => rule.evaluate(cell, neighbors, env, rng),
        }
    }
}
