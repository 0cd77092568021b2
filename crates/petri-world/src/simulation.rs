//! Simulation controller: owns the current grid and generation counter.

use crate::engine::{CancelFlag, Tick, TickEngine};
use crate::field::{fill_new_sites, seed_field};
use crate::grid::Grid;
use crate::rules::Rule;
use crate::seed::seed_grid;
use crate::stats::{Census, TickSummary};
use petri_core::{Cell, Error, LineageId, Position, Result, SeedPattern, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, event, info, instrument, warn, Level};

/// Read-only view of a committed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    pub grid: Arc<Grid>,
}

/// Result of a `step` call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Advanced(TickSummary),
    /// The controller is halted; nothing happened.
    Halted,
}

impl StepStatus {
    pub fn advanced(&self) -> bool {
        matches!(self, StepStatus::Advanced(_))
    }
}

pub struct Simulation {
    config: SimulationConfig,
    engine: TickEngine,
    grid: Arc<Grid>,
    generation: u64,
    halted: bool,
    cancel: CancelFlag,
    last_summary: Option<TickSummary>,
}

impl Simulation {
    pub fn new(config: SimulationConfig, pattern: &SeedPattern) -> Result<Self> {
        config.validate()?;
        let mut grid = seed_grid(pattern, &config.world, &config.energy)?;
        seed_field(&mut grid, &config.chemistry, config.seed);
        let engine = TickEngine::from_config(&config);

        info!(
            width = grid.width(),
            height = grid.height(),
            rules = config.rules.name(),
            seed = config.seed,
            population = grid.living_count(),
            "Simulation created"
        );

        Ok(Self {
            config,
            engine,
            grid: Arc::new(grid),
            generation: 0,
            halted: false,
            cancel: CancelFlag::new(),
            last_summary: None,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn last_summary(&self) -> Option<&TickSummary> {
        self.last_summary.as_ref()
    }

    /// Advance one generation.
    ///
    /// On error the current grid and generation are left exactly as they were.
    /// A cancel request only affects the step it arrives during.
    pub fn step(&mut self) -> Result<StepStatus> {
        if self.halted {
            return Ok(StepStatus::Halted);
        }
        self.cancel.clear();
        let result = self
            .engine
            .tick(&self.grid, self.generation, &self.config.rules, Some(&self.cancel));
        self.commit(result)
    }

    /// Like [`Simulation::step`], evaluating `rule` instead of the configured
    /// rule set.
    pub fn step_with<R: Rule + ?Sized>(&mut self, rule: &R) -> Result<StepStatus> {
        if self.halted {
            return Ok(StepStatus::Halted);
        }
        self.cancel.clear();
        let result = self
            .engine
            .tick(&self.grid, self.generation, rule, Some(&self.cancel));
        self.commit(result)
    }

    fn commit(&mut self, result: Result<Tick>) -> Result<StepStatus> {
        // a request that arrived after the last row check is spent
        self.cancel.clear();

        let tick = match result {
            Ok(tick) => tick,
            Err(Error::Cancelled) => {
                warn!(generation = self.generation, "Tick cancelled, keeping current generation");
                return Err(Error::Cancelled);
            }
            Err(e) => {
                warn!(generation = self.generation, error = %e, "Tick failed, keeping current generation");
                return Err(e);
            }
        };

        self.grid = Arc::new(tick.grid);
        self.generation += 1;

        let interval = self.config.engine.metrics_interval;
        if interval > 0 && self.generation % interval == 0 {
            self.emit_population_metrics(&tick.summary);
        }

        self.last_summary = Some(tick.summary.clone());
        Ok(StepStatus::Advanced(tick.summary))
    }

    /// Step up to `ticks` times, stopping early if halted. Returns how many
    /// generations were committed.
    #[instrument(skip(self), fields(start = self.generation))]
    pub fn run(&mut self, ticks: u64) -> Result<u64> {
        let mut committed = 0;
        for _ in 0..ticks {
            match self.step()? {
                StepStatus::Advanced(_) => committed += 1,
                StepStatus::Halted => break,
            }
        }
        Ok(committed)
    }

    /// Replace the grid with one built from `pattern` and restart at
    /// generation 0. Existing state is kept if the pattern is invalid.
    #[instrument(skip(self, pattern))]
    pub fn reset(&mut self, pattern: &SeedPattern) -> Result<()> {
        let mut grid = seed_grid(pattern, &self.config.world, &self.config.energy)?;
        seed_field(&mut grid, &self.config.chemistry, self.config.seed);
        info!(
            previous_generation = self.generation,
            population = grid.living_count(),
            "Simulation reset"
        );
        self.grid = Arc::new(grid);
        self.generation = 0;
        self.last_summary = None;
        Ok(())
    }

    /// Kill every cell and restart at generation 0.
    pub fn clear(&mut self) -> Result<()> {
        self.reset(&SeedPattern::empty())
    }

    /// Flip one cell, bypassing the rules. Returns the new cell.
    pub fn toggle(&mut self, x: i32, y: i32) -> Result<Cell> {
        let pos = Position::new(x, y);
        let current = *self.grid.get(pos)?;
        let cell = if current.alive {
            Cell::dead()
        } else {
            Cell::newborn(LineageId::FOUNDER, self.config.energy.birth_energy)
        };

        Arc::make_mut(&mut self.grid).set(pos, cell)?;
        debug!(x, y, alive = cell.alive, "Cell toggled");
        Ok(cell)
    }

    /// Swap in a grid of a different size, keeping the overlapping cells and
    /// sites. New sites start with the initial nutrient.
    #[instrument(skip(self))]
    pub fn resize(&mut self, width: i32, height: i32) -> Result<()> {
        let mut config = self.config.clone();
        config.world.width = width;
        config.world.height = height;
        config.validate()?;

        let mut grid = self.grid.resized(width, height)?;
        fill_new_sites(&mut grid, self.grid.width(), self.grid.height(), &config.chemistry);
        self.config = config;
        self.grid = Arc::new(grid);
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            grid: Arc::clone(&self.grid),
        }
    }

    /// Resume from a previously taken snapshot.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        let grid = &snapshot.grid;
        if grid.boundary() != self.config.world.boundary
            || grid.neighborhood() != self.config.world.neighborhood
        {
            return Err(Error::Validation(
                "Snapshot boundary or neighborhood does not match the configuration".to_string(),
            ));
        }
        grid.validate(self.config.energy.max_energy)?;

        info!(generation = snapshot.generation, "Restoring snapshot");
        self.config.world.width = grid.width();
        self.config.world.height = grid.height();
        self.generation = snapshot.generation;
        self.grid = snapshot.grid;
        self.last_summary = None;
        Ok(())
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Flag that aborts the in-flight `step` when set from another thread.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn census(&self) -> Census {
        Census::of(&self.grid)
    }

    fn emit_population_metrics(&self, summary: &TickSummary) {
        let census = self.census();
        let (dominant, dominant_size) = census
            .dominant_lineage()
            .map(|(id, n)| (id.to_string(), n))
            .unwrap_or_default();

        info!(
            event = "population_metrics",
            generation = self.generation,
            population = census.population,
            lineages = census.lineage_count(),
            dominant_lineage = %dominant,
            dominant_size = dominant_size,
            mean_energy = census.mean_energy,
            mean_age = census.mean_age,
            max_age = census.max_age,
            nutrient = census.nutrient,
            waste = census.waste,
            births = summary.births,
            deaths = summary.deaths,
            replications = summary.replications,
            conflicts = summary.conflicts,
            "Population metrics snapshot"
        );

        event!(
            Level::INFO,
            gauge_name = "population_total",
            gauge_value = census.population,
            generation = self.generation,
            "Population gauge"
        );
    }
}
