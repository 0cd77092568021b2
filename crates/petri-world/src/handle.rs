//! Shared handle for driving one simulation from several threads.
//!
//! A renderer polls [`SimulationHandle::snapshot`] while an input loop issues
//! commands; both go through the same lock, so a snapshot always shows a
//! fully committed generation.

use crate::engine::CancelFlag;
use crate::simulation::{Simulation, Snapshot, StepStatus};
use crate::stats::Census;
use parking_lot::RwLock;
use petri_core::{Cell, Result, SeedPattern};
use std::sync::Arc;

#[derive(Clone)]
pub struct SimulationHandle {
    inner: Arc<RwLock<Simulation>>,
    cancel: CancelFlag,
}

impl SimulationHandle {
    pub fn new(simulation: Simulation) -> Self {
        let cancel = simulation.cancel_flag();
        Self {
            inner: Arc::new(RwLock::new(simulation)),
            cancel,
        }
    }

    pub fn step(&self) -> Result<StepStatus> {
        self.inner.write().step()
    }

    pub fn reset(&self, pattern: &SeedPattern) -> Result<()> {
        self.inner.write().reset(pattern)
    }

    pub fn toggle(&self, x: i32, y: i32) -> Result<Cell> {
        self.inner.write().toggle(x, y)
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.write().clear()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().snapshot()
    }

    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        self.inner.write().restore(snapshot)
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation()
    }

    pub fn census(&self) -> Census {
        self.inner.read().census()
    }

    pub fn pause(&self) {
        self.inner.write().halt();
    }

    pub fn resume(&self) {
        self.inner.write().resume();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().is_halted()
    }

    /// Abort the step currently holding the lock, if any. Lock-free. A
    /// request made while no step is running is dropped.
    pub fn cancel_step(&self) {
        self.cancel.cancel();
    }

    /// Run `f` with exclusive access to the controller.
    pub fn with<T>(&self, f: impl FnOnce(&mut Simulation) -> T) -> T {
        let mut guard = self.inner.write();
        f(&mut *guard)
    }
}
