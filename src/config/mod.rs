//! Run configuration.
//!
//! The YAML document names the scratch directory holding the integral
//! records, carries the reference-wavefunction data, and selects the
//! method options. Missing fields are filled by `with_defaults()`;
//! command-line arguments override individual values.

mod args;

pub use args::Args;

use serde::{Deserialize, Serialize};

use crate::io::input::ReferenceInput;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Total memory budget in megabytes.
    pub memory_mb: Option<f64>,
    /// Directory holding the integral records and solver scratch.
    pub scratch_dir: Option<String>,
    pub reference: ReferenceInput,
    pub cepa: Option<CepaParams>,
}

/// Method parameters, every field optional in the document.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CepaParams {
    /// Method level: CEPA(0..3), CISD, ACPF, or AQCC.
    pub level: Option<String>,
    /// Convergence threshold on the amplitude-change norm.
    pub r_convergence: Option<f64>,
    pub maxiter: Option<usize>,
    pub diis_max_vecs: Option<usize>,
    pub no_singles: Option<bool>,
    pub vabcd_direct: Option<bool>,
    pub scs_cepa: Option<bool>,
    pub dipmom: Option<bool>,
    pub mp2_scale_os: Option<f64>,
    pub mp2_scale_ss: Option<f64>,
    pub cepa_scale_os: Option<f64>,
    pub cepa_scale_ss: Option<f64>,
}

impl Default for CepaParams {
    fn default() -> Self {
        CepaParams {
            level: Some("CEPA(0)".to_string()),
            r_convergence: Some(1.0e-7),
            maxiter: Some(100),
            diis_max_vecs: Some(8),
            no_singles: Some(false),
            vabcd_direct: Some(false),
            scs_cepa: Some(false),
            dipmom: Some(false),
            mp2_scale_os: Some(1.2),
            mp2_scale_ss: Some(1.0 / 3.0),
            cepa_scale_os: Some(1.27),
            cepa_scale_ss: Some(1.13),
        }
    }
}

impl CepaParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.level.is_none() {
            self.level = defaults.level;
        }
        if self.r_convergence.is_none() {
            self.r_convergence = defaults.r_convergence;
        }
        if self.maxiter.is_none() {
            self.maxiter = defaults.maxiter;
        }
        if self.diis_max_vecs.is_none() {
            self.diis_max_vecs = defaults.diis_max_vecs;
        }
        if self.no_singles.is_none() {
            self.no_singles = defaults.no_singles;
        }
        if self.vabcd_direct.is_none() {
            self.vabcd_direct = defaults.vabcd_direct;
        }
        if self.scs_cepa.is_none() {
            self.scs_cepa = defaults.scs_cepa;
        }
        if self.dipmom.is_none() {
            self.dipmom = defaults.dipmom;
        }
        if self.mp2_scale_os.is_none() {
            self.mp2_scale_os = defaults.mp2_scale_os;
        }
        if self.mp2_scale_ss.is_none() {
            self.mp2_scale_ss = defaults.mp2_scale_ss;
        }
        if self.cepa_scale_os.is_none() {
            self.cepa_scale_os = defaults.cepa_scale_os;
        }
        if self.cepa_scale_ss.is_none() {
            self.cepa_scale_ss = defaults.cepa_scale_ss;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        if self.memory_mb.is_none() {
            self.memory_mb = Some(256.0);
        }
        if self.scratch_dir.is_none() {
            self.scratch_dir = Some("cepa_scratch".to_string());
        }
        self.cepa = Some(self.cepa.take().unwrap_or_default().with_defaults());
        self
    }

    pub fn scratch_dir(&self) -> String {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| "cepa_scratch".to_string())
    }

    /// Fold command-line overrides into the configuration.
    pub fn apply_args(mut self, args: &Args) -> Self {
        if let Some(mb) = args.memory_mb {
            self.memory_mb = Some(mb);
        }
        if let Some(ref dir) = args.scratch_dir {
            self.scratch_dir = Some(dir.clone());
        }
        let mut cepa = self.cepa.take().unwrap_or_default();
        if let Some(ref level) = args.level {
            cepa.level = Some(level.clone());
        }
        if let Some(conv) = args.r_convergence {
            cepa.r_convergence = Some(conv);
        }
        if let Some(maxiter) = args.maxiter {
            cepa.maxiter = Some(maxiter);
        }
        if let Some(nvecs) = args.diis_max_vecs {
            cepa.diis_max_vecs = Some(nvecs);
        }
        if args.no_singles {
            cepa.no_singles = Some(true);
        }
        if args.scs_cepa {
            cepa.scs_cepa = Some(true);
        }
        if args.dipmom {
            cepa.dipmom = Some(true);
        }
        self.cepa = Some(cepa);
        self
    }
}
