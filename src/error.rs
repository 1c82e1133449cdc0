//! Error taxonomy for the coupled-pair solver.
//!
//! Every condition here is fatal for the current run: nothing is retried
//! internally and no partial energy is returned on failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CepaError {
    /// Invalid run configuration, rejected before any iteration starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// No tiling scheme can fit the minimum required buffers in the
    /// configured memory budget.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The amplitude equations did not converge within the iteration cap.
    #[error("iterations did not converge: |d(T)| stayed above {threshold:e} after {iterations} iterations")]
    NotConverged { iterations: usize, threshold: f64 },

    /// The DIIS error norm exceeded the divergence guard.
    #[error("iterations diverged: |d(T)| = {norm:e}")]
    Diverged { norm: f64 },

    /// Failed open/read/write of a scratch record.
    #[error("storage i/o error: {0}")]
    Storage(#[from] std::io::Error),

    /// The DIIS linear system could not be solved.
    #[error("singular linear system: {0}")]
    Singular(String),
}

pub type Result<T> = std::result::Result<T, CepaError>;
