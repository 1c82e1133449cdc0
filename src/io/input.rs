//! Deserialization of the reference-wavefunction section of the run
//! configuration into the solver's input types.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{CepaError, Result};
use crate::reference::{LocalCorrelation, PropertyIntegrals, ReferenceWavefunction};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReferenceInput {
    /// Reference (SCF) energy.
    pub escf: f64,
    /// Per-irrep molecular-orbital counts.
    pub nmopi: Vec<usize>,
    /// Per-irrep doubly-occupied counts.
    pub doccpi: Vec<usize>,
    #[serde(default)]
    pub frzcpi: Option<Vec<usize>>,
    #[serde(default)]
    pub frzvpi: Option<Vec<usize>>,
    #[serde(default)]
    pub nsopi: Option<Vec<usize>>,
    /// Per-irrep alpha orbital energies.
    pub epsilon: Vec<Vec<f64>>,
    /// Virtual SCF coefficient columns, rows over symmetry orbitals.
    #[serde(default)]
    pub ca_virt: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub local: Option<LocalInput>,
    #[serde(default)]
    pub properties: Option<PropertyInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalInput {
    /// Occupied back-transformation, rows over quasi-canonical orbitals.
    pub transform: Vec<Vec<f64>>,
    pub factors: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyInput {
    /// The three dipole integral matrices over the full orbital space.
    pub dipole: Vec<Vec<Vec<f64>>>,
    pub nuclear_dipole: Vec<f64>,
    #[serde(default)]
    pub quadrupole: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(default)]
    pub nuclear_quadrupole: Option<Vec<f64>>,
}

fn matrix_from_rows(rows: &[Vec<f64>], what: &str) -> Result<DMatrix<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(CepaError::Config(format!("ragged rows in {what}")));
    }
    Ok(DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}

impl ReferenceInput {
    pub fn into_reference(self) -> Result<ReferenceWavefunction> {
        let nirrep = self.nmopi.len();
        let frzcpi = self.frzcpi.unwrap_or_else(|| vec![0; nirrep]);
        let frzvpi = self.frzvpi.unwrap_or_else(|| vec![0; nirrep]);
        let nsopi = self.nsopi.unwrap_or_else(|| self.nmopi.clone());

        let ca_virt = self
            .ca_virt
            .as_deref()
            .map(|rows| matrix_from_rows(rows, "the virtual coefficient matrix"))
            .transpose()?;

        let local = self
            .local
            .map(|l| -> Result<LocalCorrelation> {
                Ok(LocalCorrelation {
                    transform: matrix_from_rows(&l.transform, "the localization transform")?,
                    factors: DVector::from_vec(l.factors),
                })
            })
            .transpose()?;

        let properties = self
            .properties
            .map(|p| -> Result<PropertyIntegrals> {
                if p.dipole.len() != 3 || p.nuclear_dipole.len() != 3 {
                    return Err(CepaError::Config(
                        "dipole integrals must carry exactly three components".into(),
                    ));
                }
                let mut dipole = Vec::with_capacity(3);
                for m in &p.dipole {
                    dipole.push(matrix_from_rows(m, "a dipole integral matrix")?);
                }
                let dipole: [DMatrix<f64>; 3] =
                    dipole.try_into().expect("three components checked above");
                let nuclear_dipole = [p.nuclear_dipole[0], p.nuclear_dipole[1], p.nuclear_dipole[2]];

                let quadrupole = p
                    .quadrupole
                    .map(|q| -> Result<[DMatrix<f64>; 6]> {
                        if q.len() != 6 {
                            return Err(CepaError::Config(
                                "quadrupole integrals must carry exactly six components".into(),
                            ));
                        }
                        let mut out = Vec::with_capacity(6);
                        for m in &q {
                            out.push(matrix_from_rows(m, "a quadrupole integral matrix")?);
                        }
                        Ok(out.try_into().expect("six components checked above"))
                    })
                    .transpose()?;
                let nuclear_quadrupole = p.nuclear_quadrupole.map(|q| {
                    let mut out = [0.0; 6];
                    for (slot, value) in out.iter_mut().zip(q) {
                        *slot = value;
                    }
                    out
                });

                Ok(PropertyIntegrals {
                    dipole,
                    nuclear_dipole,
                    quadrupole,
                    nuclear_quadrupole,
                })
            })
            .transpose()?;

        Ok(ReferenceWavefunction {
            escf: self.escf,
            nmopi: self.nmopi,
            doccpi: self.doccpi,
            frzcpi,
            frzvpi,
            nsopi,
            epsilon: self.epsilon,
            ca_virt,
            local,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_parses() {
        let yaml = r#"
escf: -1.1167143
nmopi: [2]
doccpi: [1]
epsilon:
  - [-0.578, 0.670]
"#;
        let input: ReferenceInput = serde_yml::from_str(yaml).unwrap();
        let reference = input.into_reference().unwrap();
        let space = reference.orbital_space().unwrap();
        assert_eq!(space.nocc, 1);
        assert_eq!(space.nvirt, 1);
        assert_eq!(reference.frzcpi, vec![0]);
        assert_eq!(reference.nsopi, vec![2]);
    }

    #[test]
    fn ragged_matrix_is_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matrix_from_rows(&rows, "test").is_err());
    }

    #[test]
    fn dipole_components_are_validated() {
        let input = ReferenceInput {
            escf: 0.0,
            nmopi: vec![2],
            doccpi: vec![1],
            frzcpi: None,
            frzvpi: None,
            nsopi: None,
            epsilon: vec![vec![-0.5, 0.5]],
            ca_virt: None,
            local: None,
            properties: Some(PropertyInput {
                dipole: vec![vec![vec![0.0; 2]; 2]; 2],
                nuclear_dipole: vec![0.0; 3],
                quadrupole: None,
                nuclear_quadrupole: None,
            }),
        };
        assert!(input.into_reference().is_err());
    }
}
