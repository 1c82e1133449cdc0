//! Spin-component decomposition of the correlation energy.

use rayon::prelude::*;

use crate::error::Result;
use crate::store_impl::{FileTag, RECORD_OVOV};

use super::diagrams::read_block;
use super::solver::CoupledPair;

impl CoupledPair {
    /// Opposite-spin and same-spin components of the doubles energy with
    /// the current amplitudes.
    fn os_ss_components(&mut self) -> Result<(f64, f64)> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, vo, v2o) = (o * o, o * o * v, v * o, v * v * o);

        read_block(&self.store, FileTag::Ovov, RECORD_OVOV, &mut self.integrals[..n])?;
        let tb = self.t2.load(&self.store, &mut self.tempv[..n])?;
        let integrals = &self.integrals[..n];

        let (os, ss) = (0..v)
            .into_par_iter()
            .map(|a| {
                let mut os = 0.0;
                let mut ss = 0.0;
                for b in 0..v {
                    for i in 0..o {
                        for j in 0..o {
                            let iajb = i * v2o + a * vo + j * v + b;
                            let abij = a * o2v + b * o2 + i * o + j;
                            let baij = b * o2v + a * o2 + i * o + j;
                            os += integrals[iajb] * tb[abij];
                            ss += integrals[iajb] * (tb[abij] - tb[baij]);
                        }
                    }
                }
                (os, ss)
            })
            .reduce(|| (0.0, 0.0), |x, y| (x.0 + y.0, x.1 + y.1));
        Ok((os, ss))
    }

    /// Scaled components of the first-iteration energy.
    pub(super) fn scs_mp2(&mut self) -> Result<()> {
        let (os, ss) = self.os_ss_components()?;
        self.e_mp2_os = self.config.mp2_scale_os * os;
        self.e_mp2_ss = self.config.mp2_scale_ss * ss;
        Ok(())
    }

    /// Scaled components of the converged correlation energy.
    pub(super) fn scs_cepa(&mut self) -> Result<()> {
        let (os, ss) = self.os_ss_components()?;
        self.e_corr_os = self.config.cepa_scale_os * os;
        self.e_corr_ss = self.config.cepa_scale_ss * ss;
        Ok(())
    }

    /// The fragment-variant decomposition: integrals and amplitudes are
    /// first transformed back out of the quasi-canonical occupied basis,
    /// and each occupied orbital's contribution is weighted by its
    /// localization factor.
    pub(super) fn local_scs_cepa(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, vo, v2o) = (o * o, o * o * v, v * o, v * v * o);
        let local = self
            .local
            .clone()
            .expect("the fragment decomposition requires localization data");

        read_block(&self.store, FileTag::Ovov, RECORD_OVOV, &mut self.tempt[..n])?;

        // back-transform the Coulomb block over its first occupied index
        for i in 0..o {
            for a in 0..v {
                for j in 0..o {
                    for b in 0..v {
                        let mut sum = 0.0;
                        for ip in 0..o {
                            sum += self.tempt[ip * v2o + a * vo + j * v + b] * local.transform[(ip, i)];
                        }
                        self.integrals[i * v2o + a * vo + j * v + b] = sum;
                    }
                }
            }
        }

        // back-transform the doubles over their third (occupied) index
        {
            let tb = self.t2.load(&self.store, &mut self.tempv[..n])?;
            for a in 0..v {
                for b in 0..v {
                    for i in 0..o {
                        for j in 0..o {
                            let mut sum = 0.0;
                            for ip in 0..o {
                                sum += tb[a * o2v + b * o2 + ip * o + j] * local.transform[(ip, i)];
                            }
                            self.tempt[a * o2v + b * o2 + i * o + j] = sum;
                        }
                    }
                }
            }
        }

        let mut os = 0.0;
        let mut ss = 0.0;
        for a in 0..v {
            for b in 0..v {
                for i in 0..o {
                    for j in 0..o {
                        let iajb = i * v2o + a * vo + j * v + b;
                        let abij = a * o2v + b * o2 + i * o + j;
                        let baij = b * o2v + a * o2 + i * o + j;
                        os += self.integrals[iajb] * self.tempt[abij] * local.factors[i];
                        ss += self.integrals[iajb]
                            * (self.tempt[abij] - self.tempt[baij])
                            * local.factors[i];
                    }
                }
            }
        }
        self.e_corr_os = self.config.cepa_scale_os * os;
        self.e_corr_ss = self.config.cepa_scale_ss * ss;
        Ok(())
    }
}
