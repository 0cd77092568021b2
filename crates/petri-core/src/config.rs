//! Configuration types for the simulation.

use crate::error::{Error, Result};
use crate::types::{BoundaryPolicy, Neighborhood, SeedPattern};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// World configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Width of the world grid
    pub width: i32,
    /// Height of the world grid
    pub height: i32,
    /// Neighbor lookup at the edges
    pub boundary: BoundaryPolicy,
    /// Which surrounding cells count as neighbors
    pub neighborhood: Neighborhood,
    /// Number of distinct lineages handed out by random seeding
    pub founder_lineages: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            boundary: BoundaryPolicy::Torus,
            neighborhood: Neighborhood::Moore,
            founder_lineages: 4,
        }
    }
}

/// Energy bounds for living cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Upper bound on a cell's energy
    pub max_energy: f32,
    /// Energy given to newborn cells (birth, replication, seeding, toggling)
    pub birth_energy: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            max_energy: 20.0,
            birth_energy: 10.0,
        }
    }
}

/// Which parent wins when several replications target the same empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Lowest lineage identifier wins; equal lineages fall back to scan order.
    #[default]
    LowestLineage,
    /// First parent in row-major scan order wins.
    FirstInScanOrder,
}

/// How a replicating parent provisions its child.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChildEnergy {
    /// The child starts with `birth_energy`; the parent keeps what is left.
    #[default]
    Birth,
    /// Parent and child each receive `share` of the parent's remaining
    /// energy. The rest is lost to the division.
    Split { share: f32 },
}

/// Parent-driven replication parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Energy the parent pays per replication attempt, win or lose
    pub cost: f32,
    /// Generations parent and child wait before replicating again
    pub cooldown: u32,
    /// Probability (0.0 to 1.0) that the child's lineage mutates
    pub mutation_rate: f32,
    /// Target conflict tie-break
    pub conflict_policy: ConflictPolicy,
    pub child_energy: ChildEnergy,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            cost: 3.0,
            cooldown: 5,
            mutation_rate: 0.01,
            conflict_policy: ConflictPolicy::LowestLineage,
            child_energy: ChildEnergy::Birth,
        }
    }
}

/// Nutrient and waste carried by every grid site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChemistryConfig {
    /// Disabled fields stay at zero and cells absorb nothing
    pub enabled: bool,
    /// Fraction of each site's contents exchanged with its four orthogonal
    /// neighbors per tick
    pub diffusion_rate: f32,
    /// Fraction of a site's nutrient a living cell absorbs per tick
    pub uptake_rate: f32,
    /// Waste released per unit of nutrient absorbed
    pub waste_ratio: f32,
    /// Fraction of waste that breaks down per tick
    pub waste_decay: f32,
    /// Nutrient added to every site per tick
    pub inflow: f32,
    /// Nutrient on every site at reset
    pub initial_nutrient: f32,
    /// Number of extra nutrient patches scattered at reset
    pub clusters: u32,
    /// Total nutrient shared out among the patches
    pub cluster_amount: f32,
}

impl ChemistryConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ChemistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            diffusion_rate: 0.1,
            uptake_rate: 0.5,
            waste_ratio: 0.5,
            waste_decay: 0.01,
            inflow: 0.15,
            initial_nutrient: 5.0,
            clusters: 5,
            cluster_amount: 2000.0,
        }
    }
}

/// Tick engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate rows on the rayon thread pool
    pub parallel: bool,
    /// Emit population metrics every N generations (0 disables)
    pub metrics_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            metrics_interval: 100,
        }
    }
}

/// Life-like birth/survival rule expressed as living-neighbor counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeRule {
    /// Neighbor counts at which a dead cell is born
    pub birth: Vec<u8>,
    /// Neighbor counts at which a living cell survives
    pub survive: Vec<u8>,
}

impl LifeRule {
    pub fn new(birth: impl Into<Vec<u8>>, survive: impl Into<Vec<u8>>) -> Self {
        Self {
            birth: birth.into(),
            survive: survive.into(),
        }
    }

    /// Conway's B3/S23.
    pub fn conway() -> Self {
        Self::new([3], [2, 3])
    }

    /// HighLife, B36/S23.
    pub fn high_life() -> Self {
        Self::new([3, 6], [2, 3])
    }

    pub fn is_birth(&self, living: usize) -> bool {
        self.birth.iter().any(|&n| n as usize == living)
    }

    pub fn is_survival(&self, living: usize) -> bool {
        self.survive.iter().any(|&n| n as usize == living)
    }
}

impl Default for LifeRule {
    fn default() -> Self {
        Self::conway()
    }
}

impl FromStr for LifeRule {
    type Err = Error;

    /// Parses `B3/S23` notation (case-insensitive, either half may be empty).
    fn from_str(s: &str) -> Result<Self> {
        let (b, s_part) = s
            .split_once('/')
            .ok_or_else(|| Error::Validation(format!("Rule '{}' is missing '/'", s)))?;

        fn digits(part: &str, prefix: char, rule: &str) -> Result<Vec<u8>> {
            let mut chars = part.trim().chars();
            match chars.next() {
                Some(c) if c.eq_ignore_ascii_case(&prefix) => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "Rule '{}' expected '{}' section",
                        rule, prefix
                    )))
                }
            }
            let mut counts = Vec::new();
            for c in chars {
                let n = c.to_digit(10).ok_or_else(|| {
                    Error::Validation(format!("Rule '{}' has non-digit '{}'", rule, c))
                })?;
                if !counts.contains(&(n as u8)) {
                    counts.push(n as u8);
                }
            }
            Ok(counts)
        }

        Ok(Self {
            birth: digits(b, 'B', s)?,
            survive: digits(s_part, 'S', s)?,
        })
    }
}

impl fmt::Display for LifeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B")?;
        for n in &self.birth {
            write!(f, "{}", n)?;
        }
        write!(f, "/S")?;
        for n in &self.survive {
            write!(f, "{}", n)?;
        }
        Ok(())
    }
}

/// Energy-driven growth, replication, and death.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetabolicRule {
    /// Flat energy lost by a living cell each tick
    pub dissipation_base: f32,
    /// Extra energy lost per generation of age
    pub dissipation_per_age: f32,
    /// Energy gained per unit of nutrient absorbed
    pub nutrient_yield: f32,
    /// Waste a cell tolerates on its site before taking damage
    pub toxin_threshold: f32,
    /// Energy lost per unit of waste above the threshold
    pub toxin_damage: f32,
    /// Minimum energy before a cell attempts replication
    pub replication_threshold: f32,
    /// Chance (0.0 to 1.0) an eligible cell replicates this tick
    pub replication_probability: f32,
    /// A cell with more living neighbors than this dies
    pub crowding_limit: u8,
    /// Neighbor counts at which a dead cell is born spontaneously
    pub birth: Vec<u8>,
}

impl Default for MetabolicRule {
    fn default() -> Self {
        Self {
            dissipation_base: 0.1,
            dissipation_per_age: 0.0001,
            nutrient_yield: 1.0,
            toxin_threshold: 10.0,
            toxin_damage: 0.2,
            replication_threshold: 5.0,
            replication_probability: 0.5,
            crowding_limit: 6,
            birth: Vec::new(),
        }
    }
}

/// The closed set of rule sets the engine can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSet {
    Life(LifeRule),
    Metabolic(MetabolicRule),
}

impl RuleSet {
    pub fn name(&self) -> &'static str {
        match self {
            RuleSet::Life(_) => "life",
            RuleSet::Metabolic(_) => "metabolic",
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::Metabolic(MetabolicRule::default())
    }
}

/// Everything needed to construct a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Global seed for per-cell random streams
    pub seed: u64,
    pub world: WorldConfig,
    pub energy: EnergyConfig,
    pub replication: ReplicationConfig,
    pub chemistry: ChemistryConfig,
    pub engine: EngineConfig,
    pub rules: RuleSet,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            world: WorldConfig::default(),
            energy: EnergyConfig::default(),
            replication: ReplicationConfig::default(),
            chemistry: ChemistryConfig::default(),
            engine: EngineConfig::default(),
            rules: RuleSet::default(),
        }
    }
}

fn check(ok: bool, message: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(message()))
    }
}

fn unit_interval(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl SimulationConfig {
    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        let world = &self.world;
        check(world.width > 0 && world.height > 0, || {
            format!(
                "Grid dimensions must be positive, got {}x{}",
                world.width, world.height
            )
        })?;
        check(
            (world.width as i64) * (world.height as i64) <= i32::MAX as i64,
            || format!("Grid {}x{} is too large", world.width, world.height),
        )?;
        check(world.founder_lineages >= 1, || {
            "founder_lineages must be at least 1".to_string()
        })?;

        let energy = &self.energy;
        check(energy.max_energy.is_finite() && energy.max_energy > 0.0, || {
            format!("max_energy must be positive, got {}", energy.max_energy)
        })?;
        check(
            energy.birth_energy.is_finite()
                && energy.birth_energy > 0.0
                && energy.birth_energy <= energy.max_energy,
            || {
                format!(
                    "birth_energy must be in (0, {}], got {}",
                    energy.max_energy, energy.birth_energy
                )
            },
        )?;

        let replication = &self.replication;
        check(replication.cost.is_finite() && replication.cost >= 0.0, || {
            format!("Replication cost must be non-negative, got {}", replication.cost)
        })?;
        check(unit_interval(replication.mutation_rate), || {
            format!(
                "mutation_rate must be in [0, 1], got {}",
                replication.mutation_rate
            )
        })?;

        if let ChildEnergy::Split { share } = replication.child_energy {
            check(share > 0.0 && share <= 0.5, || {
                format!("Split share must be in (0, 0.5], got {}", share)
            })?;
        }

        let chemistry = &self.chemistry;
        check(
            [
                chemistry.diffusion_rate,
                chemistry.uptake_rate,
                chemistry.waste_decay,
            ]
            .into_iter()
            .all(unit_interval),
            || "Chemistry rates must be in [0, 1]".to_string(),
        )?;
        check(
            [
                chemistry.waste_ratio,
                chemistry.inflow,
                chemistry.initial_nutrient,
                chemistry.cluster_amount,
            ]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0),
            || "Chemistry amounts must be finite and non-negative".to_string(),
        )?;

        let neighbors = world.neighborhood.len();
        let counts_fit = |counts: &[u8]| counts.iter().all(|&n| n as usize <= neighbors);

        match &self.rules {
            RuleSet::Life(rule) => {
                check(counts_fit(&rule.birth) && counts_fit(&rule.survive), || {
                    format!("Rule {} uses counts above {}", rule, neighbors)
                })?;
                check(!rule.birth.contains(&0), || {
                    "Birth on zero neighbors has no parent lineage".to_string()
                })?;
            }
            RuleSet::Metabolic(rule) => {
                let finite = [
                    rule.dissipation_base,
                    rule.dissipation_per_age,
                    rule.nutrient_yield,
                    rule.toxin_threshold,
                    rule.toxin_damage,
                    rule.replication_threshold,
                ]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0);
                check(finite, || {
                    "Metabolic parameters must be finite and non-negative".to_string()
                })?;
                check(unit_interval(rule.replication_probability), || {
                    format!(
                        "replication_probability must be in [0, 1], got {}",
                        rule.replication_probability
                    )
                })?;
                check(rule.replication_threshold >= replication.cost, || {
                    format!(
                        "replication_threshold {} is below replication cost {}",
                        rule.replication_threshold, replication.cost
                    )
                })?;
                check(counts_fit(&rule.birth) && !rule.birth.contains(&0), || {
                    format!("Metabolic birth counts must be in 1..={}", neighbors)
                })?;
            }
        }

        Ok(())
    }
}

/// Headless runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub simulation: SimulationConfig,
    /// Population used when no checkpoint is restored
    pub seed_pattern: SeedPattern,
    /// Delay between ticks (milliseconds, 0 runs flat out)
    pub tick_interval_ms: u64,
    /// Stop after this many generations
    pub max_generations: Option<u64>,
    /// Checkpoint directory (None disables checkpoints)
    pub checkpoint_dir: Option<String>,
    /// Checkpoint every N generations
    pub checkpoint_interval: u64,
    /// Number of checkpoint files to keep
    pub keep_checkpoints: usize,
    /// Restore the latest checkpoint on startup
    pub restore_latest: bool,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            seed_pattern: SeedPattern::random(0.2, 0),
            tick_interval_ms: 50,
            max_generations: None,
            checkpoint_dir: Some("./data/checkpoints".to_string()),
            checkpoint_interval: 1000,
            keep_checkpoints: 5,
            restore_latest: true,
            json_logs: false,
        }
    }
}
