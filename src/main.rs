use std::process::exit;

use clap::Parser;
use remap_2d::{
    postprocessing::postprocess, preprocessing::cli::CliArgs, sim::task::spawn_sim_thread,
};
use tracing::error;

fn main() {
    tracing_subscriber::fmt::init();

    let args = CliArgs::parse();

    let input = match args.crate_input() {
        Ok(input) => input,
        Err(err) => {
            error!("{err}");
            exit(1);
        }
    };
    input.log();

    if let Err(err) = args.save_input(&input) {
        error!("Failed to save input file: {err}");
        exit(1);
    }

    let output = match spawn_sim_thread(input.clone()).join() {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            error!("Simulation failed: {err}");
            exit(1);
        }
        Err(_) => {
            error!("Solver thread panicked");
            exit(1);
        }
    };

    postprocess(input, output);
}
