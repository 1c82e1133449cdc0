//! Coupled-Pair Correlation Command-Line Interface
//!
//! Loads a YAML configuration carrying the reference wavefunction and the
//! method options, then solves the coupled-pair amplitude equations
//! against the integral records in the scratch directory.

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use tracing::info;

use cepa::config::{Args, Config};
use cepa::io::{print_results, setup_output};
use cepa::{CoupledPair, EnergyResults, MethodConfig};

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_ref());

    info!("reading configuration from: {}", args.config_file);
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("unable to read configuration file: {}", args.config_file))?;

    let config: Config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("failed to parse configuration file")?
        .with_defaults()
        .apply_args(&args);

    let scratch = config.scratch_dir();
    let method = MethodConfig::from_config(&config)?;
    let reference = config.reference.into_reference()?;

    let mut results = EnergyResults::new();
    let mut solver = CoupledPair::new(&reference, method, &scratch)?;
    let energy = solver.compute_energy(&mut results)?;

    print_results(&results);
    info!("");
    info!("total energy: {:.10} au", energy);

    Ok(())
}
