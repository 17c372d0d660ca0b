use std::{
    error::Error,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use clap::{Parser, command};
use tracing::info;

use crate::{
    preprocessing::{InitialConditions, SimulationInput, SnapshotSettings, Splash, VelocityPreset},
    sim::{MassSolverKind, SolverConfig, StabilityPolicy},
};

static DEFAULT_SNAPSHOTS_PATH: LazyLock<&Path> = LazyLock::new(|| Path::new("sim-snapshots"));

// Raw, CLI input
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    #[arg(long, help = "An input file with pre-loaded parameters.")]
    input_json: Option<PathBuf>,

    #[arg(long, help = "Optional path to save the resolved input file to.")]
    input_json_savepath: Option<PathBuf>,

    #[arg(long, help = "Number of elements in the x axis.", default_value = "64")]
    elements_x: usize,

    #[arg(long, help = "Number of elements in the y axis.", default_value = "64")]
    elements_y: usize,

    #[arg(long, help = "Side length of each element.", default_value = "0.015625")]
    dx: f64,

    #[arg(
        short,
        long,
        default_value = "2",
        help = "Simulation time in seconds."
    )]
    simtime: f64,

    #[arg(long, default_value = "0.5", help = "Maximum CFL")]
    cfl: f64,

    #[arg(long, default_value = "0.01", help = "Largest time step in seconds")]
    max_dt: f64,

    #[arg(
        long,
        help = "The initial velocity field: `still`, `uniform` or `vortex`",
        default_value = "vortex"
    )]
    velocity: String,

    #[arg(long, help = "Uniform x velocity.", default_value = "1.0")]
    velocity_x: f64,

    #[arg(long, help = "Uniform y velocity.", default_value = "0.0")]
    velocity_y: f64,

    #[arg(long, help = "Vortex speed at the nearest wall.", default_value = "1.0")]
    speed: f64,

    #[arg(
        long,
        value_parser = parse_splash,
        help = "A splash `row,col,value`. May be repeated."
    )]
    splash: Vec<Splash>,

    #[arg(long, help = "Number of randomly placed unit splashes.", default_value = "0")]
    splashes: usize,

    #[arg(long, help = "Seed for the random splashes.")]
    seed: Option<u64>,

    #[arg(
        long,
        help = "An optional directory pointing to where snapshots should be saved."
    )]
    snapshots_dir: Option<PathBuf>,

    #[arg(long, help = "Save a snapshot every N steps. 0 disables snapshots.", default_value = "1")]
    snapshot_every: usize,

    #[arg(
        short,
        long,
        help = "Whether or not snapshots should be retained after the run.",
        default_value = "false"
    )]
    retain_snapshots: bool,

    #[arg(long, help = "Mass solver: `jacobi` or `cg`", default_value = "jacobi")]
    solver: String,

    #[arg(long, help = "Mass solver iteration cap.", default_value_t = SolverConfig::default().max_iterations)]
    max_iterations: usize,

    #[arg(long, help = "Mass solver residual tolerance.", default_value_t = SolverConfig::default().tolerance)]
    tolerance: f64,

    #[arg(long, help = "Clamp traced positions instead of rejecting unstable steps.")]
    clamp: bool,

    #[arg(long, help = "Retries with half the time step after a failed step.", default_value = "4")]
    retries: u32,
}

fn parse_splash(raw: &str) -> Result<Splash, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [row, col, value] = parts.as_slice() else {
        return Err(format!("expected `row,col,value`, got '{raw}'"));
    };

    Ok(Splash {
        row: row.parse().map_err(|err| format!("bad row '{row}': {err}"))?,
        col: col.parse().map_err(|err| format!("bad col '{col}': {err}"))?,
        value: value.parse().map_err(|err| format!("bad value '{value}': {err}"))?,
    })
}

impl CliArgs {
    pub fn crate_input(&self) -> Result<SimulationInput, Box<dyn Error>> {
        // if the input file is supplied, just use that
        if let Some(input_filepath) = &self.input_json {
            if !input_filepath.exists() {
                return Err(format!("Input file {:?} does not exist.", input_filepath).into());
            }
            if input_filepath.is_dir() {
                return Err(format!("Input file {:?} is a directory.", input_filepath).into());
            }

            info!(
                "Using input file {}",
                input_filepath.to_str().unwrap_or("<unknown>")
            );

            let reader = BufReader::new(File::open(input_filepath)?);
            let loaded_input: SimulationInput = serde_json::from_reader(reader)
                .map_err(|err| format!("Failed to deserialize input file: {err}"))?;
            loaded_input.solver.validate()?;

            return Ok(loaded_input);
        }

        // otherwise, build the input from the other arguments
        let velocity = match self.velocity.as_str() {
            "still" => VelocityPreset::Still,
            "uniform" => VelocityPreset::Uniform {
                vx: self.velocity_x,
                vy: self.velocity_y,
            },
            "vortex" => VelocityPreset::Vortex { speed: self.speed },
            other => {
                return Err(format!(
                    "'{other}' is not a valid velocity preset. Use --help for info."
                )
                .into());
            }
        };

        let method = match self.solver.as_str() {
            "jacobi" => MassSolverKind::Jacobi,
            "cg" => MassSolverKind::ConjugateGradient,
            other => {
                return Err(format!("'{other}' is not a valid mass solver. Use --help for info.").into());
            }
        };

        let solver = SolverConfig {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            method,
            stability: if self.clamp {
                StabilityPolicy::Clamp
            } else {
                StabilityPolicy::Reject
            },
        };
        solver.validate()?;

        let snapshots = (self.snapshot_every > 0).then(|| SnapshotSettings {
            snapshots_dir: self
                .snapshots_dir
                .clone()
                .unwrap_or((*DEFAULT_SNAPSHOTS_PATH).into()),
            every: self.snapshot_every,
            retain_snapshots: self.retain_snapshots,
        });

        Ok(SimulationInput {
            elements: (self.elements_x, self.elements_y),
            dx: self.dx,
            simulation_time: self.simtime,
            cfl: self.cfl,
            max_time_step: self.max_dt,
            retries: self.retries,
            solver,
            initial: InitialConditions {
                velocity,
                splashes: self.splash.clone(),
                random_splashes: self.splashes,
                seed: self.seed,
            },
            snapshots,
        })
    }

    /// Write the resolved input next to the run, if requested
    pub fn save_input(&self, input: &SimulationInput) -> Result<(), Box<dyn Error>> {
        let Some(path) = &self.input_json_savepath else {
            return Ok(());
        };

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, input)?;
        info!("Saved input file to {:?}", path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_from_arguments() {
        let args = CliArgs::parse_from([
            "remap-2d",
            "--velocity",
            "uniform",
            "--velocity-y",
            "0.5",
            "--splash",
            "3,4,2.5",
            "--solver",
            "cg",
            "--snapshot-every",
            "0",
        ]);

        let input = args.crate_input().unwrap();

        assert_eq!(input.elements, (64, 64));
        assert_eq!(input.initial.velocity, VelocityPreset::Uniform { vx: 1., vy: 0.5 });
        assert_eq!(
            input.initial.splashes,
            vec![Splash {
                row: 3,
                col: 4,
                value: 2.5
            }]
        );
        assert_eq!(input.solver.method, MassSolverKind::ConjugateGradient);
        assert!(input.snapshots.is_none());
    }

    #[test]
    fn test_bad_arguments_are_reported() {
        let args = CliArgs::parse_from(["remap-2d", "--velocity", "swirl"]);
        assert!(args.crate_input().is_err());

        let args = CliArgs::parse_from(["remap-2d", "--tolerance=-1"]);
        assert!(args.crate_input().is_err());

        assert!(parse_splash("1,2").is_err());
        assert!(CliArgs::try_parse_from(["remap-2d", "--splash", "a,2,3"]).is_err());
    }
}
