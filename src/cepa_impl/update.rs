//! Amplitude updates, pair energies, and the energy check.
//!
//! Per-iteration order: pair energies, the singles update (when active),
//! the doubles update, then DIIS bookkeeping in the driver, and finally
//! the energy check from the possibly extrapolated amplitudes.

use rayon::prelude::*;

use crate::error::Result;
use crate::linalg;
use crate::store_impl::FileTag;

use super::diagrams::read_block;
use super::solver::CoupledPair;

impl CoupledPair {
    /// `pair_energy[i,j] = sum_ab (ia|jb) (2 t[a,b,i,j] - t[b,a,i,j])`.
    /// Only the per-pair shift levels need it.
    pub(super) fn pair_energies(&mut self) -> Result<()> {
        if !self.config.level.uses_pair_energy() {
            return Ok(());
        }
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, vo, v2o) = (o * o, o * o * v, v * o, v * v * o);

        read_block(
            &self.store,
            FileTag::Ovov,
            crate::store_impl::RECORD_OVOV,
            &mut self.integrals[..n],
        )?;
        let tb = self.t2.load(&self.store, &mut self.tempt[..n])?;
        let integrals = &self.integrals[..n];

        self.pair_energy
            .par_chunks_mut(o)
            .enumerate()
            .for_each(|(i, row)| {
                for (j, slot) in row.iter_mut().enumerate() {
                    let mut energy = 0.0;
                    for a in 0..v {
                        for b in 0..v {
                            let iajb = i * v2o + a * vo + j * v + b;
                            energy += integrals[iajb]
                                * (2.0 * tb[a * o2v + b * o2 + i * o + j]
                                    - tb[b * o2v + a * o2 + i * o + j]);
                        }
                    }
                    *slot = energy;
                }
            });
        Ok(())
    }

    /// Divide the singles residual by the shifted denominators. The
    /// pre-update difference becomes the singles segment of the DIIS
    /// error vector.
    pub(super) fn update_t1(&mut self, iter: usize) {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let level = self.config.level;

        if iter < 1 {
            self.t1.fill(0.0);
            self.w1.fill(0.0);
        } else {
            for i in 0..o {
                let shift = level.singles_shift(self.e_corr, &self.pair_energy, o, i);
                for a in 0..v {
                    let d = self.eps[o + a] - self.eps[i];
                    let idx = a * o + i;
                    self.w1[idx] = -self.w1[idx] / (d - shift);
                }
            }
        }

        for k in 0..o * v {
            self.tempv[n + k] = self.w1[k] - self.t1[k];
        }
        self.t1.copy_from_slice(&self.w1);
    }

    /// Divide the doubles residual (left in scratch by the final diagram
    /// task) by the shifted denominators, record the change as the
    /// doubles segment of the DIIS error vector, and write the updated
    /// amplitudes back to wherever they live.
    pub(super) fn update_t2(&mut self, _iter: usize) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, vo, v2o) = (o * o, o * o * v, v * o, v * v * o);
        let level = self.config.level;

        read_block(
            &self.store,
            FileTag::Ovov,
            crate::store_impl::RECORD_OVOV,
            &mut self.integrals[..n],
        )?;

        let shifts: Vec<f64> = (0..o2)
            .map(|ij| level.doubles_shift(self.e_corr, &self.pair_energy, o, ij / o, ij % o))
            .collect();

        {
            let eps = &self.eps[..];
            let integrals = &self.integrals[..n];
            let residual = &self.tempv[..n];
            self.tempt[..n]
                .par_chunks_mut(o2v)
                .enumerate()
                .for_each(|(a, chunk)| {
                    for b in 0..v {
                        for i in 0..o {
                            for j in 0..o {
                                let local = b * o2 + i * o + j;
                                let iajb = i * v2o + a * vo + j * v + b;
                                let d = eps[o + a] + eps[o + b] - eps[i] - eps[j];
                                chunk[local] = -(integrals[iajb] + residual[a * o2v + local])
                                    / (d - shifts[i * o + j]);
                            }
                        }
                    }
                });
        }

        // doubles segment of the DIIS error vector: previous minus new
        self.t2.read_into(&self.store, &mut self.tempv[..n])?;
        linalg::axpy(-1.0, &self.tempt[..n], &mut self.tempv[..n]);
        self.t2.write_from(&self.store, &self.tempt[..n])?;
        Ok(())
    }

    /// `E = sum (2 (ia|jb) - (ja|ib)) t[a,b,i,j]` over the current
    /// amplitudes.
    pub(super) fn check_energy(&mut self) -> Result<f64> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, vo, v2o) = (o * o, o * o * v, v * o, v * v * o);

        read_block(
            &self.store,
            FileTag::Ovov,
            crate::store_impl::RECORD_OVOV,
            &mut self.integrals[..n],
        )?;
        let tb = self.t2.load(&self.store, &mut self.tempv[..n])?;
        let integrals = &self.integrals[..n];

        let energy = (0..v)
            .into_par_iter()
            .map(|a| {
                let mut e = 0.0;
                for b in 0..v {
                    for i in 0..o {
                        for j in 0..o {
                            let iajb = i * v2o + a * vo + j * v + b;
                            let jaib = j * v2o + a * vo + i * v + b;
                            e += (2.0 * integrals[iajb] - integrals[jaib])
                                * tb[a * o2v + b * o2 + i * o + j];
                        }
                    }
                }
                e
            })
            .sum();
        Ok(energy)
    }
}
