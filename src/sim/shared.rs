// Mutex-guarded handle for hosts that share a simulation across threads

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::sim::{
    error::TransportResult,
    simulation::{Simulation, Snapshot},
    stepper::StepReport,
};

/// A cloneable handle to one simulation. Advancing and reading back happen
/// under the same lock, so readers never observe a step in progress.
#[derive(Debug, Clone)]
pub struct SharedSimulation {
    inner: Arc<Mutex<Simulation>>,
}

impl SharedSimulation {
    pub fn new(sim: Simulation) -> Self {
        SharedSimulation {
            inner: Arc::new(Mutex::new(sim)),
        }
    }

    // a step that fails or panics commits nothing, so poisoning from
    // `advance_and_snapshot` leaves a consistent simulation; see `with`
    fn lock(&self) -> MutexGuard<'_, Simulation> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one step and copy out the resulting state as a single unit of work
    pub fn advance_and_snapshot(&self, dt: f64) -> TransportResult<(StepReport, Snapshot)> {
        let mut sim = self.lock();
        let report = sim.advance(dt)?;
        Ok((report, sim.snapshot()))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    /// Exclusive access for perturbations and other reads.
    ///
    /// If `f` panics after a partial mutation (e.g. half of a sequence of
    /// `set_element_value` calls), those writes stay in place: the lock is
    /// recovered, not rolled back.
    pub fn with<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> R {
        f(&mut self.lock())
    }
}
