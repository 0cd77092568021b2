//! Tick engine: produces generation `g + 1` from a read-only view of `g`.
//!
//! A tick runs in three phases. The site field is diffused and every cell is
//! evaluated against the snapshot (optionally one row per rayon task, each
//! task writing only its own row of plans). Replication claims are then
//! resolved in row-major order, and the resolved plans are applied into a
//! freshly allocated grid. Any error in any phase discards the new grid, so a
//! tick either commits completely or not at all.

use crate::field;
use crate::grid::{Grid, Neighbor};
use crate::random::CellRng;
use crate::rules::{Environment, Outcome, Rule};
use crate::stats::TickSummary;
use petri_core::{
    Cell, ChemistryConfig, ChildEnergy, ConflictPolicy, EnergyConfig, Error, LineageId, Position,
    ReplicationConfig, Result, SimulationConfig, Site,
};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Cooperative cancellation for an in-flight tick, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A committed-but-not-yet-swapped generation.
#[derive(Debug, Clone)]
pub struct Tick {
    pub grid: Grid,
    pub summary: TickSummary,
}

/// Validated per-cell result of the evaluation phase.
#[derive(Debug, Clone, Copy, Default)]
struct Plan {
    outcome: Outcome,
    /// Replication target index
    target: Option<usize>,
    /// Lineage the child will carry if the replication wins
    child: LineageId,
    mutated: bool,
    /// Nutrient absorbed from the cell's site if it survives
    uptake: f32,
}

#[derive(Debug, Clone)]
pub struct TickEngine {
    seed: u64,
    energy: EnergyConfig,
    replication: ReplicationConfig,
    chemistry: ChemistryConfig,
    parallel: bool,
}

impl TickEngine {
    /// An engine with chemistry disabled.
    pub fn new(
        seed: u64,
        energy: EnergyConfig,
        replication: ReplicationConfig,
        parallel: bool,
    ) -> Self {
        Self {
            seed,
            energy,
            replication,
            chemistry: ChemistryConfig::disabled(),
            parallel,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.seed,
            config.energy.clone(),
            config.replication.clone(),
            config.engine.parallel,
        )
        .with_chemistry(config.chemistry.clone())
    }

    pub fn with_chemistry(mut self, chemistry: ChemistryConfig) -> Self {
        self.chemistry = chemistry;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluate `rule` over `current` (generation `generation`) and build the
    /// next generation. `current` is never modified.
    pub fn tick<R: Rule + ?Sized>(
        &self,
        current: &Grid,
        generation: u64,
        rule: &R,
        cancel: Option<&CancelFlag>,
    ) -> Result<Tick> {
        let width = current.width() as usize;
        let sites = if self.chemistry.enabled {
            field::diffuse(current, &self.chemistry, self.parallel)
        } else {
            current.sites().to_vec()
        };
        let mut plans = vec![Plan::default(); current.len()];

        let evaluate = |(y, row): (usize, &mut [Plan])| -> Result<()> {
            if cancel.map_or(false, CancelFlag::is_cancelled) {
                return Err(Error::Cancelled);
            }
            self.evaluate_row(current, &sites, generation, rule, y as i32, row)
        };

        if self.parallel {
            // Collect every row's result so the reported error is the first in
            // scan order regardless of which worker finished first.
            let results: Vec<Result<()>> =
                plans.par_chunks_mut(width).enumerate().map(evaluate).collect();
            results.into_iter().collect::<Result<()>>()?;
        } else {
            plans.chunks_mut(width).enumerate().try_for_each(evaluate)?;
        }

        let mut summary = TickSummary {
            generation: generation + 1,
            ..TickSummary::default()
        };
        let claims = self.resolve_claims(current, &plans, &mut summary);
        let grid = self.apply(current, sites, &plans, &claims, &mut summary);
        summary.population = grid.living_count();

        debug!(
            event = "tick_committed",
            generation = summary.generation,
            births = summary.births,
            deaths = summary.deaths,
            replications = summary.replications,
            conflicts = summary.conflicts,
            mutations = summary.mutations,
            population = summary.population,
            "Tick committed"
        );

        Ok(Tick { grid, summary })
    }

    fn evaluate_row<R: Rule + ?Sized>(
        &self,
        current: &Grid,
        sites: &[Site],
        generation: u64,
        rule: &R,
        y: i32,
        row: &mut [Plan],
    ) -> Result<()> {
        let mut neighbors = Vec::with_capacity(current.neighborhood().len());
        for (x, plan) in row.iter_mut().enumerate() {
            let pos = Position::new(x as i32, y);
            let cell = *current.get(pos)?;
            current.neighbors_into(pos, &mut neighbors)?;

            let site = sites[current.pos_to_index(pos)];
            let env = Environment {
                site,
                uptake: if cell.alive {
                    field::uptake(&site, &self.chemistry)
                } else {
                    0.0
                },
            };

            let mut rng = CellRng::for_cell(self.seed, generation, pos);
            let outcome = rule
                .evaluate(&cell, &neighbors, &env, &mut rng)
                .map_err(|e| match e {
                    Error::RuleEvaluation { .. } => e,
                    other => Error::rule(pos.x, pos.y, other.to_string()),
                })?;
            *plan = self.plan(current, pos, &cell, &neighbors, outcome, &mut rng)?;
            plan.uptake = env.uptake;
        }
        Ok(())
    }

    /// Check that `outcome` is legal for `cell` and precompute replication data.
    fn plan(
        &self,
        current: &Grid,
        pos: Position,
        cell: &Cell,
        neighbors: &[Neighbor],
        outcome: Outcome,
        rng: &mut CellRng,
    ) -> Result<Plan> {
        let fail = |reason: String| Error::rule(pos.x, pos.y, reason);
        let mut plan = Plan {
            outcome,
            ..Plan::default()
        };

        match outcome {
            Outcome::Remain { energy_delta } => {
                if !energy_delta.is_finite() {
                    return Err(fail(format!("non-finite energy delta {}", energy_delta)));
                }
            }
            Outcome::Die => {}
            Outcome::Birth { lineage } => {
                if cell.alive {
                    return Err(fail("birth on a living cell".to_string()));
                }
                if lineage.is_none() {
                    return Err(fail("birth without a lineage".to_string()));
                }
            }
            Outcome::Replicate {
                offset,
                energy_delta,
            } => {
                if !cell.alive {
                    return Err(fail("replication from a dead cell".to_string()));
                }
                if !energy_delta.is_finite() {
                    return Err(fail(format!("non-finite energy delta {}", energy_delta)));
                }
                let slot = current.neighborhood().index_of(offset).ok_or_else(|| {
                    fail(format!(
                        "offset ({}, {}) is not in the neighborhood",
                        offset.dx, offset.dy
                    ))
                })?;
                let target = neighbors[slot].position.ok_or_else(|| {
                    fail(format!(
                        "replication target ({}, {}) is off the grid",
                        pos.x + offset.dx,
                        pos.y + offset.dy
                    ))
                })?;
                if neighbors[slot].cell.alive {
                    return Err(fail(format!(
                        "replication target ({}, {}) is already alive",
                        target.x, target.y
                    )));
                }
                if cell.energy < self.replication.cost {
                    return Err(fail(format!(
                        "energy {} is below replication cost {}",
                        cell.energy, self.replication.cost
                    )));
                }

                plan.target = Some(current.pos_to_index(target));
                plan.mutated = rng.chance(self.replication.mutation_rate);
                plan.child = if plan.mutated {
                    rng.next_lineage()
                } else {
                    cell.lineage
                };
            }
        }

        Ok(plan)
    }

    /// Winning parent index per target cell.
    fn resolve_claims(
        &self,
        current: &Grid,
        plans: &[Plan],
        summary: &mut TickSummary,
    ) -> Vec<Option<usize>> {
        let cells = current.cells();
        let mut claims: Vec<Option<usize>> = vec![None; plans.len()];

        for (parent, plan) in plans.iter().enumerate() {
            let Some(target) = plan.target else {
                continue;
            };
            match claims[target] {
                None => claims[target] = Some(parent),
                Some(incumbent) => {
                    summary.conflicts += 1;
                    let challenger_wins = match self.replication.conflict_policy {
                        ConflictPolicy::LowestLineage => {
                            cells[parent].lineage < cells[incumbent].lineage
                        }
                        ConflictPolicy::FirstInScanOrder => false,
                    };
                    trace!(
                        target = target,
                        incumbent = incumbent,
                        challenger = parent,
                        challenger_wins = challenger_wins,
                        "Replication conflict"
                    );
                    if challenger_wins {
                        claims[target] = Some(parent);
                    }
                }
            }
        }

        claims
    }

    fn apply(
        &self,
        current: &Grid,
        sites: Vec<Site>,
        plans: &[Plan],
        claims: &[Option<usize>],
        summary: &mut TickSummary,
    ) -> Grid {
        let max_energy = self.energy.max_energy;
        let birth_energy = self.energy.birth_energy;
        let cooldown = self.replication.cooldown;

        let mut next = current.empty_like().with_sites(sites);
        let (cells, next_sites) = next.parts_mut();

        for (((slot, site), cell), plan) in cells
            .iter_mut()
            .zip(next_sites.iter_mut())
            .zip(current.cells())
            .zip(plans)
        {
            if plan.uptake > 0.0 && !matches!(plan.outcome, Outcome::Die) {
                field::absorb(site, plan.uptake, &self.chemistry);
            }
            *slot = match plan.outcome {
                Outcome::Remain { energy_delta } if cell.alive => Cell {
                    age: cell.age.saturating_add(1),
                    energy: (cell.energy + energy_delta).clamp(0.0, max_energy),
                    cooldown: cell.cooldown.saturating_sub(1),
                    ..*cell
                },
                Outcome::Remain { .. } => Cell::dead(),
                Outcome::Die => {
                    if cell.alive {
                        summary.deaths += 1;
                    }
                    Cell::dead()
                }
                Outcome::Birth { lineage } => {
                    summary.births += 1;
                    Cell::newborn(lineage, birth_energy)
                }
                Outcome::Replicate { energy_delta, .. } => Cell {
                    age: cell.age.saturating_add(1),
                    energy: (cell.energy + energy_delta - self.replication.cost)
                        .clamp(0.0, max_energy),
                    cooldown,
                    ..*cell
                },
            };
        }

        for (target, winner) in claims.iter().enumerate() {
            let Some(parent) = *winner else {
                continue;
            };
            // the target's own birth takes precedence over the replication
            if cells[target].alive {
                summary.conflicts += 1;
                continue;
            }
            let plan = &plans[parent];
            cells[target] = Cell::newborn(plan.child, birth_energy).with_cooldown(cooldown);
            if let ChildEnergy::Split { share } = self.replication.child_energy {
                let energy = cells[parent].energy * share;
                cells[parent].energy = energy;
                cells[target].energy = energy;
            }
            summary.replications += 1;
            if plan.mutated {
                summary.mutations += 1;
            }
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{living_neighbors, majority_lineage};
    use petri_core::{BoundaryPolicy, LifeRule, MetabolicRule, Neighborhood, Offset};

    fn replicate(offset: Offset) -> Outcome {
        Outcome::Replicate {
            offset,
            energy_delta: 0.0,
        }
    }

    /// Replicates every living cell toward a fixed offset.
    struct Push(Offset);

    impl Rule for Push {
        fn evaluate(
            &self,
            cell: &Cell,
            _: &[Neighbor],
            _: &Environment,
            _: &mut CellRng,
        ) -> Result<Outcome> {
            Ok(if cell.alive {
                replicate(self.0)
            } else {
                Outcome::STAY
            })
        }
    }

    /// Replicates right when the right neighbor is vacant, otherwise left.
    struct Converge;

    impl Rule for Converge {
        fn evaluate(
            &self,
            cell: &Cell,
            neighbors: &[Neighbor],
            _: &Environment,
            _: &mut CellRng,
        ) -> Result<Outcome> {
            if !cell.alive {
                return Ok(Outcome::STAY);
            }
            // canonical Moore index 4 is (1, 0)
            let offset = if neighbors[4].is_vacant() {
                Offset::new(1, 0)
            } else {
                Offset::new(-1, 0)
            };
            Ok(replicate(offset))
        }
    }

    /// Dead cells with exactly three living neighbors are born with the
    /// majority lineage; lineage 9 replicates to the right.
    struct Crowd;

    impl Rule for Crowd {
        fn evaluate(
            &self,
            cell: &Cell,
            neighbors: &[Neighbor],
            _: &Environment,
            _: &mut CellRng,
        ) -> Result<Outcome> {
            if !cell.alive {
                return Ok(match majority_lineage(neighbors) {
                    Some(lineage) if living_neighbors(neighbors) == 3 => {
                        Outcome::Birth { lineage }
                    }
                    _ => Outcome::STAY,
                });
            }
            Ok(if cell.lineage == LineageId(9) {
                replicate(Offset::new(1, 0))
            } else {
                Outcome::STAY
            })
        }
    }

    /// Trips the cancel flag the first time any cell is evaluated.
    struct Interrupt(CancelFlag);

    impl Rule for Interrupt {
        fn evaluate(
            &self,
            _: &Cell,
            _: &[Neighbor],
            _: &Environment,
            _: &mut CellRng,
        ) -> Result<Outcome> {
            self.0.cancel();
            Ok(Outcome::STAY)
        }
    }

    fn engine(replication: ReplicationConfig) -> TickEngine {
        TickEngine::new(11, EnergyConfig::default(), replication, false)
    }

    fn grid(width: i32, height: i32) -> Grid {
        Grid::new(width, height, BoundaryPolicy::DeadBorder, Neighborhood::Moore).unwrap()
    }

    fn colonist(lineage: u64) -> Cell {
        Cell::newborn(LineageId(lineage), 10.0)
    }

    fn no_mutation() -> ReplicationConfig {
        ReplicationConfig {
            cost: 2.0,
            cooldown: 3,
            mutation_rate: 0.0,
            ..Default::default()
        }
    }

    /// Uptake without diffusion, inflow, or decay.
    fn still_chemistry() -> ChemistryConfig {
        ChemistryConfig {
            diffusion_rate: 0.0,
            inflow: 0.0,
            waste_decay: 0.0,
            uptake_rate: 0.5,
            waste_ratio: 0.5,
            ..Default::default()
        }
    }

    fn fed_grid(width: i32, height: i32, nutrient: f32) -> Grid {
        let mut grid = grid(width, height);
        for pos in grid.positions().collect::<Vec<_>>() {
            grid.set_site(pos, Site::new(nutrient, 0.0)).unwrap();
        }
        grid
    }

    #[test]
    fn test_snapshot_is_not_modified() {
        let mut current = grid(5, 5);
        current.set(Position::new(1, 2), colonist(1)).unwrap();
        current.set(Position::new(2, 2), colonist(1)).unwrap();
        current.set(Position::new(3, 2), colonist(1)).unwrap();
        let before = current.clone();

        let tick = engine(no_mutation())
            .tick(&current, 0, &LifeRule::conway(), None)
            .unwrap();

        assert_eq!(current, before);
        // blinker flips to vertical
        let living: Vec<_> = tick.grid.living().map(|(p, _)| p).collect();
        assert_eq!(
            living,
            vec![Position::new(2, 1), Position::new(2, 2), Position::new(2, 3)]
        );
        assert_eq!(tick.summary.generation, 1);
        assert_eq!(tick.summary.births, 2);
        assert_eq!(tick.summary.deaths, 2);
        assert_eq!(tick.summary.population, 3);
    }

    #[test]
    fn test_synchronous_update_has_no_order_artifacts() {
        // Each live cell pushes right; with a sequential in-place update the
        // second cell would see the first one's child.
        let mut current = grid(4, 1);
        current.set(Position::new(0, 0), colonist(1)).unwrap();
        current.set(Position::new(2, 0), colonist(1)).unwrap();

        let tick = engine(no_mutation())
            .tick(&current, 0, &Push(Offset::new(1, 0)), None)
            .unwrap();
        assert_eq!(tick.grid.living_count(), 4);
        assert_eq!(tick.summary.replications, 2);
    }

    #[test]
    fn test_replication_commit() {
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(7)).unwrap();

        let tick = engine(no_mutation())
            .tick(&current, 0, &Push(Offset::new(1, 0)), None)
            .unwrap();

        let parent = tick.grid.get(Position::new(0, 0)).unwrap();
        assert_eq!(parent.age, 1);
        assert_eq!(parent.energy, 8.0);
        assert_eq!(parent.cooldown, 3);

        let child = tick.grid.get(Position::new(1, 0)).unwrap();
        assert!(child.alive);
        assert_eq!(child.age, 0);
        assert_eq!(child.lineage, LineageId(7));
        assert_eq!(child.energy, EnergyConfig::default().birth_energy);
        assert_eq!(child.cooldown, 3);
    }

    #[test]
    fn test_conflict_lowest_lineage_wins() {
        // parents at x=0 and x=2 both target x=1
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(9)).unwrap();
        current.set(Position::new(2, 0), colonist(4)).unwrap();

        for _ in 0..3 {
            let tick = engine(no_mutation())
                .tick(&current, 0, &Converge, None)
                .unwrap();
            let child = tick.grid.get(Position::new(1, 0)).unwrap();
            assert_eq!(child.lineage, LineageId(4));
            assert_eq!(tick.summary.conflicts, 1);
            assert_eq!(tick.summary.replications, 1);
            // the loser still paid
            assert_eq!(tick.grid.get(Position::new(0, 0)).unwrap().energy, 8.0);
        }
    }

    #[test]
    fn test_conflict_first_in_scan_order_wins() {
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(9)).unwrap();
        current.set(Position::new(2, 0), colonist(4)).unwrap();

        let replication = ReplicationConfig {
            conflict_policy: ConflictPolicy::FirstInScanOrder,
            ..no_mutation()
        };
        let tick = engine(replication).tick(&current, 0, &Converge, None).unwrap();
        assert_eq!(
            tick.grid.get(Position::new(1, 0)).unwrap().lineage,
            LineageId(9)
        );
    }

    #[test]
    fn test_invalid_outcomes_abort_tick() {
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(1)).unwrap();
        let engine = engine(no_mutation());

        // off the dead border
        let err = engine
            .tick(&current, 0, &Push(Offset::new(-1, 0)), None)
            .unwrap_err();
        assert!(matches!(err, Error::RuleEvaluation { x: 0, y: 0, .. }));

        // not a neighborhood offset
        let err = engine
            .tick(&current, 0, &Push(Offset::new(2, 0)), None)
            .unwrap_err();
        assert!(matches!(err, Error::RuleEvaluation { .. }));

        // onto a living cell
        current.set(Position::new(1, 0), colonist(1)).unwrap();
        let err = engine
            .tick(&current, 0, &Push(Offset::new(1, 0)), None)
            .unwrap_err();
        assert!(matches!(err, Error::RuleEvaluation { .. }));
    }

    #[test]
    fn test_replication_requires_energy() {
        let mut current = grid(3, 1);
        let mut weak = colonist(1);
        weak.energy = 1.0;
        current.set(Position::new(0, 0), weak).unwrap();

        let err = engine(no_mutation())
            .tick(&current, 0, &Push(Offset::new(1, 0)), None)
            .unwrap_err();
        assert!(matches!(err, Error::RuleEvaluation { .. }));
    }

    #[test]
    fn test_mutation_always_changes_lineage() {
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(1)).unwrap();
        let replication = ReplicationConfig {
            mutation_rate: 1.0,
            ..no_mutation()
        };

        let tick = engine(replication)
            .tick(&current, 0, &Push(Offset::new(1, 0)), None)
            .unwrap();
        let child = tick.grid.get(Position::new(1, 0)).unwrap();
        assert_ne!(child.lineage, LineageId(1));
        assert_eq!(tick.summary.mutations, 1);
    }

    #[test]
    fn test_energy_is_clamped() {
        let mut current = fed_grid(1, 1, 4.0);
        current.set(Position::new(0, 0), colonist(1)).unwrap();
        let rule = MetabolicRule {
            nutrient_yield: 1000.0,
            replication_probability: 0.0,
            ..Default::default()
        };

        let tick = engine(no_mutation())
            .with_chemistry(ChemistryConfig::default())
            .tick(&current, 0, &rule, None)
            .unwrap();
        let cell = tick.grid.get(Position::new(0, 0)).unwrap();
        assert_eq!(cell.energy, EnergyConfig::default().max_energy);
        assert_eq!(cell.age, 1);
    }

    #[test]
    fn test_living_cells_draw_from_their_site() {
        let mut current = fed_grid(3, 1, 4.0);
        current.set(Position::new(0, 0), colonist(1)).unwrap();
        let rule = MetabolicRule {
            nutrient_yield: 1.0,
            dissipation_base: 0.0,
            dissipation_per_age: 0.0,
            replication_probability: 0.0,
            ..Default::default()
        };

        let tick = engine(no_mutation())
            .with_chemistry(still_chemistry())
            .tick(&current, 0, &rule, None)
            .unwrap();

        assert_eq!(tick.grid.get(Position::new(0, 0)).unwrap().energy, 12.0);
        assert_eq!(*tick.grid.site(Position::new(0, 0)).unwrap(), Site::new(2.0, 1.0));
        assert_eq!(*tick.grid.site(Position::new(1, 0)).unwrap(), Site::new(4.0, 0.0));
        // the snapshot's field is untouched
        assert_eq!(*current.site(Position::new(0, 0)).unwrap(), Site::new(4.0, 0.0));
    }

    #[test]
    fn test_dying_cell_leaves_its_site_alone() {
        let mut current = fed_grid(3, 1, 4.0);
        let mut starving = colonist(1);
        starving.energy = 0.0;
        current.set(Position::new(1, 0), starving).unwrap();

        let tick = engine(no_mutation())
            .with_chemistry(still_chemistry())
            .tick(&current, 0, &MetabolicRule::default(), None)
            .unwrap();
        assert_eq!(tick.summary.deaths, 1);
        assert_eq!(*tick.grid.site(Position::new(1, 0)).unwrap(), Site::new(4.0, 0.0));
    }

    #[test]
    fn test_replicating_parent_metabolizes() {
        let mut current = fed_grid(3, 1, 4.0);
        current.set(Position::new(0, 0), colonist(5)).unwrap();
        let rule = MetabolicRule {
            nutrient_yield: 1.0,
            dissipation_base: 0.5,
            dissipation_per_age: 0.0,
            replication_threshold: 5.0,
            replication_probability: 1.0,
            ..Default::default()
        };

        let tick = engine(no_mutation())
            .with_chemistry(still_chemistry())
            .tick(&current, 0, &rule, None)
            .unwrap();

        assert_eq!(tick.summary.replications, 1);
        // 10 + (2.0 absorbed - 0.5 dissipated) - 2.0 cost
        let parent = tick.grid.get(Position::new(0, 0)).unwrap();
        assert_eq!(parent.energy, 9.5);
        assert_eq!(parent.age, 1);
        assert_eq!(*tick.grid.site(Position::new(0, 0)).unwrap(), Site::new(2.0, 1.0));

        let child = tick.grid.get(Position::new(1, 0)).unwrap();
        assert_eq!(child.energy, EnergyConfig::default().birth_energy);
        assert_eq!(*tick.grid.site(Position::new(1, 0)).unwrap(), Site::new(4.0, 0.0));
    }

    #[test]
    fn test_split_division_shares_parent_energy() {
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(7)).unwrap();
        let replication = ReplicationConfig {
            child_energy: ChildEnergy::Split { share: 0.45 },
            ..no_mutation()
        };

        let tick = engine(replication)
            .tick(&current, 0, &Push(Offset::new(1, 0)), None)
            .unwrap();
        // (10 - 2) * 0.45 each
        assert_eq!(tick.grid.get(Position::new(0, 0)).unwrap().energy, 3.6);
        assert_eq!(tick.grid.get(Position::new(1, 0)).unwrap().energy, 3.6);
    }

    #[test]
    fn test_split_loser_keeps_its_energy() {
        let mut current = grid(3, 1);
        current.set(Position::new(0, 0), colonist(9)).unwrap();
        current.set(Position::new(2, 0), colonist(4)).unwrap();
        let replication = ReplicationConfig {
            child_energy: ChildEnergy::Split { share: 0.5 },
            ..no_mutation()
        };

        let tick = engine(replication).tick(&current, 0, &Converge, None).unwrap();
        assert_eq!(tick.grid.get(Position::new(0, 0)).unwrap().energy, 8.0);
        assert_eq!(tick.grid.get(Position::new(2, 0)).unwrap().energy, 4.0);
        let child = tick.grid.get(Position::new(1, 0)).unwrap();
        assert_eq!(child.lineage, LineageId(4));
        assert_eq!(child.energy, 4.0);
    }

    #[test]
    fn test_birth_takes_precedence_over_replication() {
        // (1,0) sees lineage 9 once and lineage 4 twice and is also the
        // target of the lineage 9 parent at (0,0)
        let mut current = grid(3, 2);
        current.set(Position::new(0, 0), colonist(9)).unwrap();
        current.set(Position::new(2, 0), colonist(4)).unwrap();
        current.set(Position::new(2, 1), colonist(4)).unwrap();

        let tick = engine(no_mutation()).tick(&current, 0, &Crowd, None).unwrap();

        let born = tick.grid.get(Position::new(1, 0)).unwrap();
        assert_eq!(born.lineage, LineageId(4));
        assert_eq!(born.cooldown, 0);
        assert_eq!(born.energy, EnergyConfig::default().birth_energy);

        assert_eq!(tick.summary.replications, 0);
        assert_eq!(tick.summary.conflicts, 1);
        // (1,0) and (1,1) both have three living neighbors
        assert_eq!(tick.summary.births, 2);

        let parent = tick.grid.get(Position::new(0, 0)).unwrap();
        assert_eq!(parent.energy, 8.0);
        assert_eq!(parent.cooldown, 3);
    }

    #[test]
    fn test_cancel_during_tick_aborts_it() {
        let mut current = grid(4, 4);
        current.set(Position::new(1, 1), colonist(1)).unwrap();
        let cancel = CancelFlag::new();

        let err = engine(no_mutation())
            .tick(&current, 0, &Interrupt(cancel.clone()), Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_cancelled_tick_commits_nothing() {
        let mut current = grid(4, 4);
        current.set(Position::new(1, 1), colonist(1)).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = engine(no_mutation())
            .tick(&current, 0, &LifeRule::conway(), Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut current = Grid::new(16, 12, BoundaryPolicy::Torus, Neighborhood::Moore).unwrap();
        for (i, pos) in current.positions().collect::<Vec<_>>().into_iter().enumerate() {
            if i % 3 == 0 || i % 7 == 0 {
                current.set(pos, colonist((i % 5) as u64 + 1)).unwrap();
            }
        }
        crate::field::seed_field(&mut current, &ChemistryConfig::default(), 8);
        let rule = MetabolicRule {
            replication_probability: 0.7,
            ..Default::default()
        };
        let replication = ReplicationConfig {
            mutation_rate: 0.3,
            ..no_mutation()
        };

        let serial = engine(replication.clone())
            .with_chemistry(ChemistryConfig::default())
            .tick(&current, 5, &rule, None)
            .unwrap();
        let parallel = engine(replication)
            .with_chemistry(ChemistryConfig::default())
            .with_parallel(true)
            .tick(&current, 5, &rule, None)
            .unwrap();
        assert_eq!(serial.grid, parallel.grid);
        assert_eq!(serial.summary, parallel.summary);
    }
}
