//! Command-line argument parsing for the coupled-pair solver

use clap::Parser;

/// Coupled-pair correlation energies with YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "cepa.yaml")]
    pub config_file: String,

    /// Override output file (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override the method level (CEPA(0..3), CISD, ACPF, AQCC)
    #[arg(long)]
    pub level: Option<String>,

    /// Override the convergence threshold
    #[arg(long)]
    pub r_convergence: Option<f64>,

    /// Override the maximum number of iterations
    #[arg(long)]
    pub maxiter: Option<usize>,

    /// Override the DIIS history size
    #[arg(long)]
    pub diis_max_vecs: Option<usize>,

    /// Override the memory budget in megabytes
    #[arg(long)]
    pub memory_mb: Option<f64>,

    /// Override the scratch directory
    #[arg(long)]
    pub scratch_dir: Option<String>,

    /// Disable singles amplitudes
    #[arg(long)]
    pub no_singles: bool,

    /// Print spin-component-scaled method energies
    #[arg(long)]
    pub scs_cepa: bool,

    /// Evaluate dipole moments after convergence
    #[arg(long)]
    pub dipmom: bool,
}
