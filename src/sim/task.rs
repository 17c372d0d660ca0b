/// Task runner for the solver thread
use std::{
    sync::mpsc,
    thread::{self, JoinHandle},
};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::{
    observers::snapshots,
    preprocessing::{SimulationInput, initial::apply_initial_conditions},
    sim::{
        error::{TransportError, TransportResult},
        fields::HEAD,
        simulation::{Simulation, Snapshot},
        stepper::StepReport,
    },
};

// remaining time below which the run counts as finished
const TIME_EPSILON: f64 = 1e-12;

pub struct SimulationOutput {
    pub temporal_map: Vec<f64>, // maps step->timestamp
    pub iterations: Vec<usize>,
    pub initial_mass: f64,
    pub final_mass: f64,
    /// Number of steps that had to be retried with a smaller time step
    pub retried_steps: usize,
}

/// Build the simulation described by `simulation_input` with its initial
/// conditions applied
pub fn build_simulation(simulation_input: &SimulationInput) -> TransportResult<Simulation> {
    let (ex, ey) = simulation_input.elements;
    let mut sim = Simulation::with_config(ex, ey, simulation_input.dx, simulation_input.solver)?;
    apply_initial_conditions(&mut sim, &simulation_input.initial)?;
    Ok(sim)
}

/// The time step to attempt next: bounded by the input's maximum, the CFL
/// limit of the current velocity and the time left to simulate.
pub fn next_time_step(sim: &Simulation, simulation_input: &SimulationInput) -> f64 {
    let remaining = simulation_input.simulation_time - sim.time();
    let cfl_limit = simulation_input.cfl * sim.max_stable_dt();

    simulation_input.max_time_step.min(cfl_limit).min(remaining)
}

/// Advance by `dt`, halving it after each recoverable failure. Gives up
/// once `retries` halvings have failed.
fn advance_with_retries(sim: &mut Simulation, mut dt: f64, retries: u32) -> TransportResult<(StepReport, u32)> {
    let mut attempt = 0;
    loop {
        match sim.advance(dt) {
            Ok(report) => return Ok((report, attempt)),
            Err(
                err @ (TransportError::ConvergenceFailure { .. } | TransportError::StabilityBound { .. }),
            ) if attempt < retries => {
                warn!("step {} failed at dt={dt:e}: {err}; retrying", sim.steps() + 1);
                dt *= 0.5;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Step `sim` to the end of the simulated time, forwarding snapshots to
/// `sender` once every given number of steps
pub fn run_task(
    mut sim: Simulation,
    simulation_input: &SimulationInput,
    sender: Option<(mpsc::Sender<Snapshot>, usize)>,
) -> TransportResult<SimulationOutput> {
    let bar = ProgressBar::new(10_000);
    bar.set_style(
        ProgressStyle::with_template(
            "[Elapsed: {elapsed_precise}] [{bar:40.cyan/blue}] {percent}% (Remaining: {eta_precise})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );

    let initial_mass = sim.total_mass(HEAD)?;
    let mut temporal_map = vec![sim.time()];
    let mut iterations = Vec::new();
    let mut retried_steps = 0;

    let forward = |sim: &Simulation| {
        if let Some((sender, every)) = &sender {
            if sim.steps() % (*every).max(1) as u64 == 0 && sender.send(sim.snapshot()).is_err() {
                warn!("snapshot writer hung up; continuing without output");
            }
        }
    };
    forward(&sim);

    while simulation_input.simulation_time - sim.time() > TIME_EPSILON {
        let dt = next_time_step(&sim, simulation_input);
        let (report, attempts) = advance_with_retries(&mut sim, dt, simulation_input.retries)?;
        if attempts > 0 {
            retried_steps += 1;
        }

        forward(&sim);

        let progress = ((report.time / simulation_input.simulation_time) * 10_000.0).round() as u64;
        bar.set_position(progress);
        temporal_map.push(report.time);
        iterations.push(report.iterations);
    }
    bar.finish();

    Ok(SimulationOutput {
        temporal_map,
        iterations,
        initial_mass,
        final_mass: sim.total_mass(HEAD)?,
        retried_steps,
    })
}

/// Spawns the simulation thread and, when snapshots are requested, the
/// thread that writes them
pub fn spawn_sim_thread(simulation_input: SimulationInput) -> JoinHandle<TransportResult<SimulationOutput>> {
    thread::spawn(move || {
        let sim = build_simulation(&simulation_input)?;

        let Some(settings) = simulation_input.snapshots.clone() else {
            return run_task(sim, &simulation_input, None);
        };

        let every = settings.every;
        let (sender, receiver) = mpsc::channel();
        let writer = thread::spawn(move || {
            if let Err(err) = snapshots::snapshot_io_loop(receiver, &settings.snapshots_dir) {
                error!("Snapshot output failed: {err}");
            }
        });

        let output = run_task(sim, &simulation_input, Some((sender, every)));

        if writer.join().is_err() {
            error!("Snapshot writer panicked");
        }
        info!("Solver thread finished");

        output
    })
}
