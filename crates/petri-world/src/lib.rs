//! Cellular simulation engine.
//!
//! This crate implements the 2D grid where cells grow, replicate, and die,
//! the tick engine that advances it, and the controller that owns it.

pub mod engine;
pub mod field;
pub mod grid;
pub mod handle;
pub mod random;
pub mod rules;
pub mod seed;
pub mod simulation;
pub mod stats;

pub use engine::{CancelFlag, Tick, TickEngine};
pub use grid::{Grid, Neighbor};
pub use handle::SimulationHandle;
pub use random::CellRng;
pub use rules::{Environment, Outcome, Rule};
pub use simulation::{Simulation, Snapshot, StepStatus};
pub use stats::{Census, TickSummary};
