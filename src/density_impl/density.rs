//! One-particle density matrix from the converged amplitudes.

use crate::cepa_impl::CepaLevel;
use crate::linalg;
use crate::reference::{OrbitalSpace, PropertyIntegrals};

/// Normalize the wavefunction in place and return the leading (reference)
/// coefficient. CEPA(0) has no normalized CI expansion; its amplitudes are
/// left untouched and the coefficient is one.
pub fn normalize(t1: &mut [f64], t2: &mut [f64], o: usize, v: usize, level: CepaLevel) -> f64 {
    if level == CepaLevel::Cepa0 {
        return 1.0;
    }

    let fac = match level {
        CepaLevel::Acpf => 1.0 / o as f64,
        CepaLevel::Aqcc => {
            let od = o as f64;
            1.0 - (2.0 * od - 2.0) * (2.0 * od - 3.0) / (2.0 * od * (2.0 * od - 1.0))
        }
        _ => 1.0,
    };

    let (o2, o2v) = (o * o, o * o * v);
    let mut sum = 0.0;
    let mut id = 0;
    for a in 0..v {
        for b in 0..v {
            for i in 0..o {
                for j in 0..o {
                    let mut dum = t2[id];
                    sum -= dum * dum;
                    dum -= t2[b * o2v + a * o2 + i * o + j];
                    sum -= 0.5 * dum * dum;
                    id += 1;
                }
            }
        }
    }
    for t in t1.iter() {
        sum -= 2.0 * t * t;
    }

    let nrm = (1.0 - fac * sum).sqrt();
    for t in t2.iter_mut() {
        *t /= nrm;
    }
    for t in t1.iter_mut() {
        *t /= nrm;
    }
    1.0 / nrm
}

/// Assemble the one-particle density matrix over the full orbital space
/// (row-major `nmo_full x nmo_full`), frozen orbitals included.
pub fn build_opdm(space: &OrbitalSpace, t1: &[f64], t2: &[f64], c0: f64) -> Vec<f64> {
    let (o, v, nfzc) = (space.nocc, space.nvirt, space.nfzc);
    let nmo = space.nmo_full();
    let (o2, o2v) = (o * o, o * o * v);

    let mut d1 = vec![0.0; nmo * nmo];
    for i in 0..nfzc {
        d1[i * nmo + i] = 1.0;
    }

    // antisymmetrized amplitude combination
    let mut ta = t2.to_vec();
    let mut id = 0;
    for a in 0..v {
        for b in 0..v {
            for i in 0..o {
                for j in 0..o {
                    ta[id] -= t2[b * o2v + a * o2 + i * o + j];
                    id += 1;
                }
            }
        }
    }

    // virtual-virtual block
    let mut tempd = vec![0.0; v * v];
    linalg::dgemm_tn(v, v, o2v, 1.0, t2, t2, 0.0, &mut tempd);
    linalg::dgemm_tn(v, v, o2v, 0.5, &ta, &ta, 1.0, &mut tempd);
    linalg::dgemm_tn(v, v, o, 1.0, t1, t1, 1.0, &mut tempd);
    for a in 0..v {
        for b in 0..v {
            d1[(a + o + nfzc) * nmo + (b + o + nfzc)] = tempd[a * v + b];
        }
    }

    // occupied-occupied block
    let mut tempd = vec![0.0; o * o];
    linalg::dgemm_nt(o, o, o * v * v, -1.0, t2, t2, 0.0, &mut tempd);
    linalg::dgemm_nt(o, o, o * v * v, -0.5, &ta, &ta, 1.0, &mut tempd);
    linalg::dgemm_nt(o, o, v, -1.0, t1, t1, 1.0, &mut tempd);
    for i in 0..o {
        for j in 0..o {
            d1[(i + nfzc) * nmo + j + nfzc] = tempd[i * o + j];
        }
        d1[(i + nfzc) * nmo + i + nfzc] += 1.0;
    }

    // occupied-virtual block
    for i in 0..o {
        for a in 0..v {
            let mut sum = t1[a * o + i] * c0;
            for j in 0..o {
                for b in 0..v {
                    sum += t1[b * o + j] * t2[a * o2v + b * o2 + i * o + j];
                    sum += t1[b * o + j] * ta[a * o2v + b * o2 + i * o + j];
                }
            }
            d1[(i + nfzc) * nmo + a + o + nfzc] = sum;
            d1[(a + o + nfzc) * nmo + i + nfzc] = sum;
        }
    }

    d1
}

#[derive(Debug, Clone, Copy)]
pub struct PropertyValues {
    pub dipole: [f64; 3],
    pub quadrupole: Option<[f64; 6]>,
}

/// Contract the (alpha) density with the one-electron property integrals.
/// The closed-shell total density is twice the alpha density; the
/// electronic contribution carries the electron charge sign.
pub fn properties(d1: &[f64], nmo: usize, ints: &PropertyIntegrals) -> PropertyValues {
    let contract = |m: &nalgebra::DMatrix<f64>| -> f64 {
        let mut sum = 0.0;
        for p in 0..nmo {
            for q in 0..nmo {
                sum += d1[p * nmo + q] * m[(p, q)];
            }
        }
        sum
    };

    let mut dipole = [0.0; 3];
    for k in 0..3 {
        dipole[k] = ints.nuclear_dipole[k] - 2.0 * contract(&ints.dipole[k]);
    }

    let quadrupole = ints.quadrupole.as_ref().map(|q| {
        let nuclear = ints.nuclear_quadrupole.unwrap_or([0.0; 6]);
        let mut out = [0.0; 6];
        for k in 0..6 {
            out[k] = nuclear[k] - 2.0 * contract(&q[k]);
        }
        out
    });

    PropertyValues { dipole, quadrupole }
}
