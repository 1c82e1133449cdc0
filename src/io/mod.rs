//! Input/output: logging setup, reference-wavefunction loading, and the
//! results report.

pub mod input;
mod output;

pub use output::{print_results, setup_output};
