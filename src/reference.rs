//! Reference-wavefunction inputs.
//!
//! Everything the solver consumes from the upstream mean-field calculation:
//! per-irrep orbital counts, the reference energy, orbital energies, and the
//! optional localization / property data. These are fixed inputs for the
//! whole run; nothing here is mutated after construction.

use nalgebra::{DMatrix, DVector};

use crate::error::{CepaError, Result};

/// Partition of the molecular-orbital space, derived once from the
/// per-irrep counts of the reference wavefunction.
#[derive(Debug, Clone, Copy)]
pub struct OrbitalSpace {
    /// Frozen-core orbitals.
    pub nfzc: usize,
    /// Doubly occupied orbitals (including frozen core).
    pub ndocc: usize,
    /// Active occupied orbitals.
    pub nocc: usize,
    /// Active virtual orbitals.
    pub nvirt: usize,
    /// Frozen virtual orbitals.
    pub nfzv: usize,
    /// Active molecular orbitals (`nocc + nvirt`).
    pub nmo: usize,
    /// Symmetry orbitals (atomic-orbital dimension).
    pub nso: usize,
}

impl OrbitalSpace {
    /// Full molecular-orbital dimension including frozen orbitals.
    pub fn nmo_full(&self) -> usize {
        self.nmo + self.nfzc + self.nfzv
    }
}

/// Localization data for the fragment/local-correlation variant: a
/// back-transformation over the occupied space and per-orbital weights.
#[derive(Debug, Clone)]
pub struct LocalCorrelation {
    /// `o x o` transformation out of the quasi-canonical occupied basis.
    pub transform: DMatrix<f64>,
    /// Per-occupied-orbital energy weights.
    pub factors: DVector<f64>,
}

/// One-electron property integrals in the MO basis, over the full orbital
/// space (frozen orbitals included), plus the nuclear contributions.
#[derive(Debug, Clone)]
pub struct PropertyIntegrals {
    pub dipole: [DMatrix<f64>; 3],
    pub nuclear_dipole: [f64; 3],
    pub quadrupole: Option<[DMatrix<f64>; 6]>,
    pub nuclear_quadrupole: Option<[f64; 6]>,
}

/// The mean-field reference consumed by the solver.
#[derive(Debug, Clone)]
pub struct ReferenceWavefunction {
    /// Reference (SCF) energy.
    pub escf: f64,
    /// Per-irrep molecular-orbital counts.
    pub nmopi: Vec<usize>,
    /// Per-irrep doubly-occupied counts.
    pub doccpi: Vec<usize>,
    /// Per-irrep frozen-core counts.
    pub frzcpi: Vec<usize>,
    /// Per-irrep frozen-virtual counts.
    pub frzvpi: Vec<usize>,
    /// Per-irrep symmetry-orbital counts.
    pub nsopi: Vec<usize>,
    /// Per-irrep alpha orbital energies.
    pub epsilon: Vec<Vec<f64>>,
    /// Virtual columns of the SCF coefficient matrix (`nso x nvirt`),
    /// required only by the integral-direct four-virtual contraction.
    pub ca_virt: Option<DMatrix<f64>>,
    /// Localization data; present only for the fragment variant.
    pub local: Option<LocalCorrelation>,
    /// Property integrals; required only when properties are requested.
    pub properties: Option<PropertyIntegrals>,
}

impl ReferenceWavefunction {
    pub fn nirrep(&self) -> usize {
        self.nmopi.len()
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    /// Derive the orbital-space partition from the per-irrep counts.
    pub fn orbital_space(&self) -> Result<OrbitalSpace> {
        let nirrep = self.nirrep();
        if self.doccpi.len() != nirrep
            || self.frzcpi.len() != nirrep
            || self.frzvpi.len() != nirrep
            || self.epsilon.len() != nirrep
        {
            return Err(CepaError::Config(
                "per-irrep counts and orbital energies must all cover the same irreps".into(),
            ));
        }
        for h in 0..nirrep {
            if self.epsilon[h].len() != self.nmopi[h] {
                return Err(CepaError::Config(format!(
                    "irrep {h}: expected {} orbital energies, got {}",
                    self.nmopi[h],
                    self.epsilon[h].len()
                )));
            }
            if self.frzcpi[h] > self.doccpi[h] || self.doccpi[h] + self.frzvpi[h] > self.nmopi[h] {
                return Err(CepaError::Config(format!(
                    "irrep {h}: inconsistent occupation counts"
                )));
            }
        }

        let nfzc: usize = self.frzcpi.iter().sum();
        let nfzv: usize = self.frzvpi.iter().sum();
        let ndocc: usize = self.doccpi.iter().sum();
        let nmo_full: usize = self.nmopi.iter().sum();
        let nso: usize = self.nsopi.iter().sum();

        let nocc = ndocc - nfzc;
        let nmo = nmo_full - nfzc - nfzv;
        let nvirt = nmo - nocc;

        Ok(OrbitalSpace {
            nfzc,
            ndocc,
            nocc,
            nvirt,
            nfzv,
            nmo,
            nso,
        })
    }

    /// Flatten the per-irrep orbital energies into the active-space
    /// ordering used by the solver: all active occupied orbitals first,
    /// then all active virtuals, frozen orbitals dropped.
    pub fn active_orbital_energies(&self) -> Vec<f64> {
        let mut eps = Vec::new();
        for h in 0..self.nirrep() {
            for orb in self.frzcpi[h]..self.doccpi[h] {
                eps.push(self.epsilon[h][orb]);
            }
        }
        for h in 0..self.nirrep() {
            for orb in self.doccpi[h]..self.nmopi[h] - self.frzvpi[h] {
                eps.push(self.epsilon[h][orb]);
            }
        }
        eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_irrep_reference() -> ReferenceWavefunction {
        ReferenceWavefunction {
            escf: -1.0,
            nmopi: vec![3, 2],
            doccpi: vec![2, 1],
            frzcpi: vec![1, 0],
            frzvpi: vec![0, 1],
            nsopi: vec![3, 2],
            epsilon: vec![vec![-20.0, -1.0, 0.5], vec![-0.8, 0.9]],
            ca_virt: None,
            local: None,
            properties: None,
        }
    }

    #[test]
    fn orbital_space_counts() {
        let space = two_irrep_reference().orbital_space().unwrap();
        assert_eq!(space.nfzc, 1);
        assert_eq!(space.nfzv, 1);
        assert_eq!(space.ndocc, 3);
        assert_eq!(space.nocc, 2);
        assert_eq!(space.nvirt, 1);
        assert_eq!(space.nmo, 3);
        assert_eq!(space.nmo_full(), 5);
        assert_eq!(space.nso, 5);
    }

    #[test]
    fn energies_flatten_occupied_then_virtual() {
        // frozen core (-20.0) and the frozen virtual (0.9) are dropped
        let eps = two_irrep_reference().active_orbital_energies();
        assert_eq!(eps, vec![-1.0, -0.8, 0.5]);
    }

    #[test]
    fn inconsistent_counts_rejected() {
        let mut reference = two_irrep_reference();
        reference.doccpi = vec![2];
        assert!(matches!(
            reference.orbital_space(),
            Err(CepaError::Config(_))
        ));
    }
}
