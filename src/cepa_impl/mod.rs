//! Coupled-pair correlation methods.
//!
//! This module implements the CEPA(0..3)/CISD/ACPF/AQCC family of
//! size-extensive correlation methods. The members of the family share one
//! set of amplitude equations and differ only in the energy shift
//! subtracted from the update denominators, so the level is a closed enum
//! carrying the shift formulas, selected once at construction.

mod diagrams;
mod scs;
mod solver;
mod update;

pub use diagrams::Diagram;
pub use solver::CoupledPair;


use crate::config::Config;
use crate::error::{CepaError, Result};

/// Which member of the coupled-pair family is being solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CepaLevel {
    Cepa0,
    Cepa1,
    Cepa2,
    Cepa3,
    Cisd,
    Acpf,
    Aqcc,
}

impl std::str::FromStr for CepaLevel {
    type Err = CepaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CEPA(0)" => Ok(CepaLevel::Cepa0),
            "CEPA(1)" => Ok(CepaLevel::Cepa1),
            "CEPA(2)" => Ok(CepaLevel::Cepa2),
            "CEPA(3)" => Ok(CepaLevel::Cepa3),
            "CISD" => Ok(CepaLevel::Cisd),
            "ACPF" => Ok(CepaLevel::Acpf),
            "AQCC" => Ok(CepaLevel::Aqcc),
            other => Err(CepaError::Config(format!("unknown method level: {other}"))),
        }
    }
}

impl CepaLevel {
    pub fn label(&self) -> &'static str {
        match self {
            CepaLevel::Cepa0 => "CEPA(0)",
            CepaLevel::Cepa1 => "CEPA(1)",
            CepaLevel::Cepa2 => "CEPA(2)",
            CepaLevel::Cepa3 => "CEPA(3)",
            CepaLevel::Cisd => "CISD",
            CepaLevel::Acpf => "ACPF",
            CepaLevel::Aqcc => "AQCC",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CepaLevel::Cepa0 | CepaLevel::Cepa1 | CepaLevel::Cepa2 | CepaLevel::Cepa3 => {
                "Coupled Electron Pair Approximation"
            }
            CepaLevel::Cisd => "Singles Doubles Configuration Interaction",
            CepaLevel::Acpf => "Averaged Coupled Pair Functional",
            CepaLevel::Aqcc => "Averaged Quadratic Coupled Cluster",
        }
    }

    /// Levels whose denominator shifts are built from the pair-energy
    /// matrix rather than from the total correlation energy.
    pub fn uses_pair_energy(&self) -> bool {
        matches!(self, CepaLevel::Cepa1 | CepaLevel::Cepa2 | CepaLevel::Cepa3)
    }

    /// One-particle property evaluation is defined only for the variants
    /// with a whole-energy shift.
    pub fn allows_properties(&self) -> bool {
        matches!(
            self,
            CepaLevel::Cepa0 | CepaLevel::Cisd | CepaLevel::Acpf | CepaLevel::Aqcc
        )
    }

    /// Fraction of the total correlation energy entering the denominator
    /// shift for the whole-energy variants.
    pub fn global_shift_factor(&self, o: usize) -> f64 {
        let o = o as f64;
        match self {
            CepaLevel::Cepa0 => 0.0,
            CepaLevel::Cisd => 1.0,
            CepaLevel::Acpf => 1.0 / o,
            CepaLevel::Aqcc => 1.0 - (2.0 * o - 2.0) * (2.0 * o - 3.0) / (2.0 * o * (2.0 * o - 1.0)),
            // per-pair levels use no global factor
            CepaLevel::Cepa1 | CepaLevel::Cepa2 | CepaLevel::Cepa3 => 0.0,
        }
    }

    /// Denominator shift for the doubles update of pair `(i, j)`.
    pub fn doubles_shift(&self, e_corr: f64, pair_energy: &[f64], o: usize, i: usize, j: usize) -> f64 {
        match self {
            CepaLevel::Cepa1 => (0..o)
                .map(|k| 0.5 * (pair_energy[i * o + k] + pair_energy[j * o + k]))
                .sum(),
            CepaLevel::Cepa2 => pair_energy[i * o + j],
            CepaLevel::Cepa3 => {
                -pair_energy[i * o + j]
                    + (0..o)
                        .map(|k| pair_energy[i * o + k] + pair_energy[j * o + k])
                        .sum::<f64>()
            }
            _ => e_corr * self.global_shift_factor(o),
        }
    }

    /// Denominator shift for the singles update of orbital `i`.
    pub fn singles_shift(&self, e_corr: f64, pair_energy: &[f64], o: usize, i: usize) -> f64 {
        match self {
            CepaLevel::Cepa1 => (0..o).map(|k| pair_energy[i * o + k]).sum(),
            CepaLevel::Cepa2 => pair_energy[i * o + i],
            CepaLevel::Cepa3 => {
                -pair_energy[i * o + i]
                    + (0..o).map(|k| 2.0 * pair_energy[i * o + k]).sum::<f64>()
            }
            _ => e_corr * self.global_shift_factor(o),
        }
    }
}

/// Immutable method options, fixed at construction.
#[derive(Debug, Clone)]
pub struct MethodConfig {
    pub level: CepaLevel,
    /// Convergence threshold on the amplitude-change norm.
    pub r_convergence: f64,
    pub maxiter: usize,
    pub diis_max_vecs: usize,
    /// Disable singles amplitudes.
    pub no_singles: bool,
    /// Evaluate the four-virtual contraction integral-direct in the AO
    /// basis instead of from the precomputed packed blocks.
    pub vabcd_direct: bool,
    /// Print the spin-component-scaled method energies.
    pub scs_cepa: bool,
    /// Evaluate one-particle properties after convergence.
    pub dipmom: bool,
    pub mp2_scale_os: f64,
    pub mp2_scale_ss: f64,
    pub cepa_scale_os: f64,
    pub cepa_scale_ss: f64,
    /// Total memory budget in megabytes.
    pub memory_mb: f64,
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            level: CepaLevel::Cepa0,
            r_convergence: 1.0e-7,
            maxiter: 100,
            diis_max_vecs: 8,
            no_singles: false,
            vabcd_direct: false,
            scs_cepa: false,
            dipmom: false,
            mp2_scale_os: 1.2,
            mp2_scale_ss: 1.0 / 3.0,
            cepa_scale_os: 1.27,
            cepa_scale_ss: 1.13,
            memory_mb: 256.0,
        }
    }
}

impl MethodConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();
        let cepa = config.cepa.clone().unwrap_or_default();
        Ok(Self {
            level: cepa
                .level
                .as_deref()
                .unwrap_or("CEPA(0)")
                .parse::<CepaLevel>()?,
            r_convergence: cepa.r_convergence.unwrap_or(defaults.r_convergence),
            maxiter: cepa.maxiter.unwrap_or(defaults.maxiter),
            diis_max_vecs: cepa.diis_max_vecs.unwrap_or(defaults.diis_max_vecs),
            no_singles: cepa.no_singles.unwrap_or(false),
            vabcd_direct: cepa.vabcd_direct.unwrap_or(false),
            scs_cepa: cepa.scs_cepa.unwrap_or(false),
            dipmom: cepa.dipmom.unwrap_or(false),
            mp2_scale_os: cepa.mp2_scale_os.unwrap_or(defaults.mp2_scale_os),
            mp2_scale_ss: cepa.mp2_scale_ss.unwrap_or(defaults.mp2_scale_ss),
            cepa_scale_os: cepa.cepa_scale_os.unwrap_or(defaults.cepa_scale_os),
            cepa_scale_ss: cepa.cepa_scale_ss.unwrap_or(defaults.cepa_scale_ss),
            memory_mb: config.memory_mb.unwrap_or(defaults.memory_mb),
        })
    }
}
