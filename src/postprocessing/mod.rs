// Contains post-processers for summarizing simulation results

use crate::{preprocessing::SimulationInput, sim::task::SimulationOutput};
use std::fs;
use tracing::{info, warn};

/// Relative change of the head mass over the run; zero for an empty field
pub fn mass_drift(sim_output: &SimulationOutput) -> f64 {
    if sim_output.initial_mass == 0. {
        return 0.;
    }
    (sim_output.final_mass - sim_output.initial_mass) / sim_output.initial_mass
}

pub fn postprocess(sim_input: SimulationInput, sim_output: SimulationOutput) {
    let steps = sim_output.iterations.len();
    let mean_iterations = if steps == 0 {
        0.
    } else {
        sim_output.iterations.iter().sum::<usize>() as f64 / steps as f64
    };

    info!(
        "Run summary:\n\n\
        \t steps:           {}\n\
        \t final time:      {} s\n\
        \t retried steps:   {}\n\
        \t mass drift:      {:e}\n\
        \t mean iterations: {:.1}\n",
        steps,
        sim_output.temporal_map.last().copied().unwrap_or_default(),
        sim_output.retried_steps,
        mass_drift(&sim_output),
        mean_iterations,
    );

    if let Some(settings) = sim_input.snapshots {
        if !settings.retain_snapshots {
            _ = fs::remove_dir_all(settings.snapshots_dir)
                .inspect_err(|err| warn!("Unable to cleanup snapshots output: {:?}", err));
        }
    };
}
