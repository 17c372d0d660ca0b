use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sim::SolverConfig;

pub mod cli;
pub mod initial;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SnapshotSettings {
    pub snapshots_dir: PathBuf,
    /// Write one snapshot every `every` steps
    pub every: usize,
    pub retain_snapshots: bool,
}

/// Initial velocity field
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VelocityPreset {
    #[default]
    Still,
    Uniform {
        vx: f64,
        vy: f64,
    },
    /// Solid-body rotation about the domain center; `speed` is reached at
    /// the nearest wall
    Vortex {
        speed: f64,
    },
}

/// A single element set to `value` before the first step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Splash {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct InitialConditions {
    pub velocity: VelocityPreset,
    pub splashes: Vec<Splash>,
    /// Number of randomly placed unit splashes
    pub random_splashes: usize,
    pub seed: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SimulationInput {
    pub elements: (usize, usize), // (x, y)
    pub dx: f64,
    pub simulation_time: f64,
    pub cfl: f64,
    pub max_time_step: f64,

    /// How many times a failed step is retried with half the time step
    pub retries: u32,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub initial: InitialConditions,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<SnapshotSettings>,
}

impl SimulationInput {
    pub fn log(&self) {
        info!(
            "Simulation is shown below:\n\n\
        \t elements:   {} x {}\n\
        \t spacing:    {}\n\
        \t time range: {} s\n\
        \t CFL:        {} (max)\n\
        \t max dt:     {} s\n\
        \t retries:    {}\n\
        \t velocity:   {:?}\n\
        \t splashes:   {} fixed, {} random\n\n\
        ",
            self.elements.0,
            self.elements.1,
            self.dx,
            self.simulation_time,
            self.cfl,
            self.max_time_step,
            self.retries,
            self.initial.velocity,
            self.initial.splashes.len(),
            self.initial.random_splashes,
        );

        let solver_str = serde_json::to_string_pretty(&self.solver).unwrap_or_default();
        info!("Solver parameters are:\n\n{}", solver_str);
    }
}
