//! snobal-sim entry point: config loading, forcing input, run, CSV output.

use std::path::Path;
use std::process;

use snobal_sim::cli::{self, CliCommand, CliOptions};
use snobal_sim::config::{ConfigError, SnobalConfig};
use snobal_sim::error::SnobalError;
use snobal_sim::io::export::export_csv;
use snobal_sim::io::forcing_csv::read_forcing_csv;
use snobal_sim::physics::PointKernel;
use snobal_sim::sim::engine::run_snobal;

fn run(options: &CliOptions) -> Result<(), SnobalError> {
    let config = SnobalConfig::load(&options.config, &options.overrides)?;
    let forcing_path = config
        .forcing_path()
        .map(Path::to_path_buf)
        .ok_or_else(|| missing_path("io.forcing_path", "forcing_path = \"forcing.csv\""))?;
    let output_path = config.output_path().map(Path::to_path_buf);

    let forcing = read_forcing_csv(&forcing_path)?;
    // validation inside the run reports a missing output path
    let output = run_snobal(&forcing, config, PointKernel)?;
    let output_path =
        output_path.ok_or_else(|| missing_path("io.output_path", "output_path = \"output.csv\""))?;

    export_csv(&output, &output_path)?;
    eprintln!(
        "{} output rows written to {}",
        output.len(),
        output_path.display()
    );
    Ok(())
}

fn missing_path(field: &str, example: &str) -> ConfigError {
    ConfigError::new(field, format!("must be provided, e.g. {example}"))
}

fn main() {
    let options = match cli::parse_args() {
        Ok(CliCommand::Run(options)) => options,
        Ok(CliCommand::Help) => {
            cli::print_usage();
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = run(&options) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
