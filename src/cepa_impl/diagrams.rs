//! The diagram tasks: the tensor contractions accumulating into the
//! doubles residual and the singles residual.
//!
//! Tasks run in a fixed list order. The first doubles task overwrites the
//! residual record instead of accumulating, and the final four-virtual
//! task leaves the completed residual in the `tempv` scratch buffer where
//! the amplitude update consumes it without re-reading the record.
//!
//! Layout conventions, shared with the external integral transformation:
//! doubles amplitudes and the residual are `t[a*o2v + b*o2 + i*o + j]`,
//! the Coulomb-ordered block is `I[i*v2o + a*vo + j*v + b]`, singles are
//! `t1[a*o + i]`.

use crate::error::{CepaError, Result};
use crate::linalg;
use crate::memory::Tiling;
use crate::store_impl::{
    FileTag, Mode, TensorStore, RECORD_OOOO, RECORD_OOOV, RECORD_OOVO, RECORD_OOVV, RECORD_OVOV,
    RECORD_RESIDUAL, RECORD_VOVV, RECORD_VVVO, RECORD_VVVV_AO, RECORD_VVVV_MINUS, RECORD_VVVV_PLUS,
};

use super::solver::CoupledPair;

/// One independent contraction task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagram {
    /// Particle-hole ring, built from the Coulomb-ordered block.
    RingDirect,
    /// The two exchange-ring contractions.
    RingExchange,
    /// Occupied-pair (hole-hole) ladder.
    HoleHole,
    /// Mixed occupied ladder driven by the singles amplitudes.
    ParticleHoleSingles,
    /// Singles residual, hole contraction.
    T1HoleContraction,
    /// Singles residual, tiled particle-ladder contraction.
    T1ParticleContraction,
    /// Doubles residual contribution from the singles amplitudes,
    /// streamed over the three-virtual block.
    ResidualParticleSingles,
    /// Singles residual, ring contraction.
    T1RingContraction,
    /// Four-virtual ladder, symmetric packed half.
    ParticleParticleSym,
    /// Four-virtual ladder, antisymmetric packed half.
    ParticleParticleAnti,
    /// Four-virtual ladder evaluated integral-direct in the AO basis.
    ParticleParticleDirect,
}

impl Diagram {
    pub fn run(self, cp: &mut CoupledPair) -> Result<()> {
        match self {
            Diagram::RingDirect => cp.ring_direct(),
            Diagram::RingExchange => cp.ring_exchange(),
            Diagram::HoleHole => cp.hole_hole(),
            Diagram::ParticleHoleSingles => cp.particle_hole_singles(),
            Diagram::T1HoleContraction => cp.t1_hole_contraction(),
            Diagram::T1ParticleContraction => cp.t1_particle_contraction(),
            Diagram::ResidualParticleSingles => cp.residual_particle_singles(),
            Diagram::T1RingContraction => cp.t1_ring_contraction(),
            Diagram::ParticleParticleSym => cp.particle_particle_sym(),
            Diagram::ParticleParticleAnti => cp.particle_particle_anti(),
            Diagram::ParticleParticleDirect => cp.particle_particle_direct(),
        }
    }
}

/// Compose the task list once per run from the method options. The
/// four-virtual treatment is exactly one of the two mutually exclusive
/// variants, and it always runs last.
pub fn build_task_list(no_singles: bool, direct: bool) -> Vec<Diagram> {
    let mut tasks = vec![
        Diagram::RingDirect,
        Diagram::RingExchange,
        Diagram::HoleHole,
        Diagram::ParticleHoleSingles,
    ];
    if !no_singles {
        tasks.extend([
            Diagram::T1HoleContraction,
            Diagram::T1ParticleContraction,
            Diagram::ResidualParticleSingles,
            Diagram::T1RingContraction,
        ]);
    }
    if direct {
        tasks.push(Diagram::ParticleParticleDirect);
    } else {
        tasks.extend([Diagram::ParticleParticleSym, Diagram::ParticleParticleAnti]);
    }
    tasks
}

pub(super) fn read_block(
    store: &TensorStore,
    tag: FileTag,
    record: &str,
    out: &mut [f64],
) -> Result<()> {
    let file = store.open(tag, Mode::Old)?;
    file.read_entry(record, out)?;
    file.close(true)
}

pub(super) fn read_residual(store: &TensorStore, out: &mut [f64]) -> Result<()> {
    read_block(store, FileTag::Residual, RECORD_RESIDUAL, out)
}

pub(super) fn write_residual(store: &TensorStore, data: &[f64]) -> Result<()> {
    let file = store.open(FileTag::Residual, Mode::Old)?;
    file.write_entry(RECORD_RESIDUAL, data)?;
    file.close(true)
}

/// `res[a,b,i,j] += x[b,a,j,i]`, the simultaneous particle-pair and
/// hole-pair transposition.
fn add_transposed(res: &mut [f64], x: &[f64], o: usize, v: usize) {
    let (o2, o2v) = (o * o, o * o * v);
    for a in 0..v {
        for b in 0..v {
            for i in 0..o {
                for j in 0..o {
                    res[a * o2v + b * o2 + i * o + j] += x[b * o2v + a * o2 + j * o + i];
                }
            }
        }
    }
}

impl CoupledPair {
    /// `R[a,b,i,j] <- sum_kc (ia|kc) (2 t[c,a,k,i] - t[a,c,k,i])`,
    /// symmetrized over the two particle-hole pairs. First task in the
    /// list: overwrites the residual record.
    pub(super) fn ring_direct(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, ov, vo, v2o) = (o * o, o * o * v, o * v, v * o, v * v * o);

        read_block(&self.store, FileTag::Ovov, RECORD_OVOV, &mut self.tempv[..n])?;

        {
            let tb = self.t2.load(&self.store, &mut self.integrals[..n])?;
            let mut id = 0;
            for j in 0..o {
                for b in 0..v {
                    for i in 0..o {
                        for a in 0..v {
                            self.tempt[id] =
                                2.0 * tb[a * o2v + b * o2 + i * o + j] - tb[b * o2v + a * o2 + i * o + j];
                            id += 1;
                        }
                    }
                }
            }
        }
        linalg::dgemm_nn(ov, ov, ov, 1.0, &self.tempv[..n], &self.tempt[..n], 0.0, &mut self.integrals[..n]);

        let mut id = 0;
        for a in 0..v {
            for b in 0..v {
                for i in 0..o {
                    for j in 0..o {
                        self.tempt[id] = self.integrals[j * v2o + b * vo + i * v + a]
                            + self.integrals[i * v2o + a * vo + j * v + b];
                        id += 1;
                    }
                }
            }
        }
        let file = self.store.open(FileTag::Residual, Mode::Old)?;
        file.write_entry(RECORD_RESIDUAL, &self.tempt[..n])?;
        file.close(true)
    }

    /// The two exchange-ring contractions, each symmetrized into the
    /// residual with a negative sign.
    pub(super) fn ring_exchange(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, ov, vo, v2o) = (o * o, o * o * v, o * v, v * o, v * v * o);

        read_block(&self.store, FileTag::Oovv, RECORD_OOVV, &mut self.tempt[..n])?;

        {
            let tb = self.t2.load(&self.store, &mut self.tempv[..n])?;
            let mut id = 0;
            for j in 0..o {
                for b in 0..v {
                    for i in 0..o {
                        for a in 0..v {
                            self.integrals[id] = tb[b * o2v + a * o2 + j * o + i];
                            id += 1;
                        }
                    }
                }
            }
        }
        linalg::dgemm_nn(ov, ov, ov, -1.0, &self.tempt[..n], &self.integrals[..n], 0.0, &mut self.tempv[..n]);

        read_residual(&self.store, &mut self.integrals[..n])?;
        let mut id = 0;
        for a in 0..v {
            for b in 0..v {
                for i in 0..o {
                    for j in 0..o {
                        self.integrals[id] += self.tempv[j * v2o + b * vo + i * v + a]
                            + self.tempv[i * v2o + a * vo + j * v + b];
                        id += 1;
                    }
                }
            }
        }
        write_residual(&self.store, &self.integrals[..n])?;

        {
            let tb = self.t2.load(&self.store, &mut self.integrals[..n])?;
            let mut id = 0;
            for j in 0..o {
                for a in 0..v {
                    for i in 0..o {
                        for b in 0..v {
                            self.tempv[id] = tb[b * o2v + a * o2 + j * o + i];
                            id += 1;
                        }
                    }
                }
            }
        }
        linalg::dgemm_nn(ov, ov, ov, -1.0, &self.tempt[..n], &self.tempv[..n], 0.0, &mut self.integrals[..n]);

        read_residual(&self.store, &mut self.tempt[..n])?;
        let mut id = 0;
        for a in 0..v {
            for b in 0..v {
                for j in 0..o {
                    for i in 0..o {
                        self.tempt[id] += self.integrals[j * v2o + b * vo + i * v + a]
                            + self.integrals[i * v2o + a * vo + j * v + b];
                        id += 1;
                    }
                }
            }
        }
        write_residual(&self.store, &self.tempt[..n])
    }

    /// Hole-hole ladder: `R += 0.5 (ij|kl) t[a,b,k,l]`, symmetrized.
    pub(super) fn hole_hole(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let o4 = o * o * o * o;

        self.t2.read_into(&self.store, &mut self.tempt[..n])?;
        read_block(&self.store, FileTag::Oooo, RECORD_OOOO, &mut self.integrals[..o4])?;

        linalg::dgemm_nn(o * o, v * v, o * o, 0.5, &self.integrals[..o4], &self.tempt[..n], 0.0, &mut self.tempv[..n]);

        read_residual(&self.store, &mut self.tempt[..n])?;
        linalg::axpy(1.0, &self.tempv[..n], &mut self.tempt[..n]);
        add_transposed(&mut self.tempt[..n], &self.tempv[..n], o, v);
        write_residual(&self.store, &self.tempt[..n])
    }

    /// Mixed occupied ladder driven by T1: `R -= (ij|ak) t1[b,k]`,
    /// symmetrized.
    pub(super) fn particle_hole_singles(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let o3v = o * o * o * v;

        read_block(&self.store, FileTag::Oovo, RECORD_OOVO, &mut self.tempv[..o3v])?;
        linalg::dgemm_nn(o * o * v, v, o, -1.0, &self.tempv[..o3v], &self.t1, 0.0, &mut self.tempt[..n]);

        read_residual(&self.store, &mut self.tempv[..n])?;
        linalg::axpy(1.0, &self.tempt[..n], &mut self.tempv[..n]);
        add_transposed(&mut self.tempv[..n], &self.tempt[..n], o, v);
        write_residual(&self.store, &self.tempv[..n])
    }

    /// Singles hole contraction: `w1 -= (ij|ak) (2 t[e,a,m,n] - t[a,e,m,n])`.
    pub(super) fn t1_hole_contraction(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v) = (o * o, o * o * v);

        {
            let tb = self.t2.load(&self.store, &mut self.tempv[..n])?;
            let mut id = 0;
            for a in 0..v {
                for m in 0..o {
                    for nn in 0..o {
                        for e in 0..v {
                            self.tempt[id] =
                                2.0 * tb[e * o2v + a * o2 + m * o + nn] - tb[a * o2v + e * o2 + m * o + nn];
                            id += 1;
                        }
                    }
                }
            }
        }
        read_block(&self.store, FileTag::Ooov, RECORD_OOOV, &mut self.tempv[..o * o2v])?;
        linalg::dgemm_tn(o, v, o * o * v, -1.0, &self.tempv[..o * o2v], &self.tempt[..n], 1.0, &mut self.w1);
        Ok(())
    }

    /// Singles particle ladder, streamed tile-by-tile over the
    /// three-virtual block.
    pub(super) fn t1_particle_contraction(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v, ov2) = (o * o, o * o * v, o * v * v);

        {
            let tb = self.t2.load(&self.store, &mut self.tempv[..n])?;
            let mut id = 0;
            for f in 0..v {
                for m in 0..o {
                    for e in 0..v {
                        for i in 0..o {
                            self.tempt[id] =
                                2.0 * tb[e * o2v + f * o2 + m * o + i] - tb[e * o2v + f * o2 + i * o + m];
                            id += 1;
                        }
                    }
                }
            }
        }

        // tile the leading virtual index so each chunk fits the buffer
        let tiling = Tiling::compute(v, ov2, self.plan.maxelem as u64, "singles particle ladder")?;
        let file = self.store.open(FileTag::Vvvo, Mode::Old)?;
        let mut reader = file.reader(RECORD_VVVO)?;
        for t in 0..tiling.ntiles {
            let cols = if t + 1 == tiling.ntiles {
                tiling.last
            } else {
                tiling.tilesize
            };
            reader.read_chunk(&mut self.integrals[..cols * ov2])?;
            let off = t * tiling.tilesize * o;
            linalg::dgemm_nn(
                o,
                cols,
                ov2,
                1.0,
                &self.tempt[..n],
                &self.integrals[..cols * ov2],
                1.0,
                &mut self.w1[off..off + cols * o],
            );
        }
        file.close(true)
    }

    /// Doubles residual contribution from T1 through the three-virtual
    /// block, streamed with the planned ov^2 tiling and symmetrized.
    pub(super) fn residual_particle_singles(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v) = (o * o, o * o * v);

        let file = self.store.open(FileTag::Vovv, Mode::Old)?;
        let mut reader = file.reader(RECORD_VOVV)?;
        for t in 0..self.plan.ov2.ntiles {
            let cols = self.plan.ov2.chunk_len(t, 1);
            reader.read_chunk(&mut self.integrals[..v * cols])?;
            let off = t * self.plan.ov2.tilesize * o;
            linalg::dgemm_nn(
                o,
                cols,
                v,
                1.0,
                &self.t1,
                &self.integrals[..v * cols],
                0.0,
                &mut self.tempt[off..off + cols * o],
            );
        }
        file.close(true)?;

        read_residual(&self.store, &mut self.tempv[..n])?;
        for a in 0..v {
            for b in 0..v {
                for k in 0..o2 {
                    self.tempv[a * o2v + b * o2 + k] += self.tempt[b * o2v + a * o2 + k];
                }
            }
        }
        for a in 0..v {
            for b in 0..v {
                for i in 0..o {
                    for j in 0..o {
                        self.tempv[a * o2v + b * o2 + i * o + j] +=
                            self.tempt[a * o2v + b * o2 + j * o + i];
                    }
                }
            }
        }
        write_residual(&self.store, &self.tempv[..n])
    }

    /// Singles ring contraction from the spin-adapted combination of the
    /// exchange and Coulomb blocks.
    pub(super) fn t1_ring_contraction(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let ov = o * v;

        read_block(&self.store, FileTag::Oovv, RECORD_OOVV, &mut self.tempv[..n])?;
        read_block(&self.store, FileTag::Ovov, RECORD_OVOV, &mut self.integrals[..n])?;
        linalg::axpy(-2.0, &self.integrals[..n], &mut self.tempv[..n]);

        for i in 0..o {
            for a in 0..v {
                self.tempt[i * v + a] = self.t1[a * o + i];
            }
        }
        linalg::dgemm_nn(ov, 1, ov, -1.0, &self.tempv[..n], &self.tempt[..ov], 0.0, &mut self.integrals[..ov]);
        for a in 0..v {
            for i in 0..o {
                self.w1[a * o + i] += self.integrals[i * v + a];
            }
        }
        Ok(())
    }

    /// Four-virtual ladder, symmetric half: the particle-symmetric packed
    /// combination contracted with the symmetric packed block, streamed
    /// tile-by-tile, accumulated with a factor of one half.
    pub(super) fn particle_particle_sym(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v) = (o * o, o * o * v);
        let otri = o * (o + 1) / 2;
        let vtri = v * (v + 1) / 2;

        self.t2.read_into(&self.store, &mut self.tempt[..n])?;
        for i in 0..o {
            for j in i..o {
                let ij = linalg::packed_index(i, j);
                for a in 0..v {
                    for b in a + 1..v {
                        self.tempv[linalg::packed_index(a, b) * otri + ij] = self.tempt
                            [a * o2v + b * o2 + i * o + j]
                            + self.tempt[b * o2v + a * o2 + i * o + j];
                    }
                    self.tempv[linalg::packed_index(a, a) * otri + ij] =
                        self.tempt[a * o2v + a * o2 + i * o + j];
                }
            }
        }

        let file = self.store.open(FileTag::VvvvPlus, Mode::Old)?;
        let mut reader = file.reader(RECORD_VVVV_PLUS)?;
        for t in 0..self.plan.vvvv.ntiles {
            let cols = self.plan.vvvv.chunk_len(t, 1);
            reader.read_chunk(&mut self.integrals[..cols * vtri])?;
            let off = t * self.plan.vvvv.tilesize * otri;
            linalg::dgemm_nn(
                otri,
                cols,
                vtri,
                1.0,
                &self.tempv[..vtri * otri],
                &self.integrals[..cols * vtri],
                0.0,
                &mut self.tempt[off..off + cols * otri],
            );
        }
        file.close(true)?;

        read_residual(&self.store, &mut self.tempv[..n])?;
        for a in 0..v {
            for b in 0..v {
                let ab = linalg::packed_index(a, b) * otri;
                for i in 0..o {
                    for j in 0..o {
                        self.tempv[a * o2v + b * o2 + i * o + j] +=
                            0.5 * self.tempt[ab + linalg::packed_index(i, j)];
                    }
                }
            }
        }
        write_residual(&self.store, &self.tempv[..n])
    }

    /// Four-virtual ladder, antisymmetric half. Last task of the packed
    /// path: the completed residual is left in `tempv` for the update.
    pub(super) fn particle_particle_anti(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let (o2, o2v) = (o * o, o * o * v);
        let otri = o * (o + 1) / 2;
        let vtri = v * (v + 1) / 2;

        self.t2.read_into(&self.store, &mut self.tempt[..n])?;
        for i in 0..o {
            for j in i..o {
                let ij = linalg::packed_index(i, j);
                for a in 0..v {
                    for b in a..v {
                        self.tempv[linalg::packed_index(a, b) * otri + ij] = self.tempt
                            [a * o2v + b * o2 + i * o + j]
                            - self.tempt[b * o2v + a * o2 + i * o + j];
                    }
                }
            }
        }

        let file = self.store.open(FileTag::VvvvMinus, Mode::Old)?;
        let mut reader = file.reader(RECORD_VVVV_MINUS)?;
        for t in 0..self.plan.vvvv.ntiles {
            let cols = self.plan.vvvv.chunk_len(t, 1);
            reader.read_chunk(&mut self.integrals[..cols * vtri])?;
            let off = t * self.plan.vvvv.tilesize * otri;
            linalg::dgemm_nn(
                otri,
                cols,
                vtri,
                1.0,
                &self.tempv[..vtri * otri],
                &self.integrals[..cols * vtri],
                0.0,
                &mut self.tempt[off..off + cols * otri],
            );
        }
        file.close(true)?;

        read_residual(&self.store, &mut self.tempv[..n])?;
        for a in 0..v {
            for b in 0..v {
                let sg2 = if a > b { -1.0 } else { 1.0 };
                let ab = linalg::packed_index(a, b) * otri;
                for i in 0..o {
                    for j in 0..o {
                        let sg = if i > j { -1.0 } else { 1.0 };
                        self.tempv[a * o2v + b * o2 + i * o + j] +=
                            0.5 * sg2 * sg * self.tempt[ab + linalg::packed_index(i, j)];
                    }
                }
            }
        }
        // the completed residual stays in scratch for the update step
        Ok(())
    }

    /// Four-virtual ladder evaluated integral-direct: transform the
    /// doubles to the AO basis, stream the AO block, and back-transform
    /// into the residual. Replaces both packed halves and runs last.
    pub(super) fn particle_particle_direct(&mut self) -> Result<()> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let nso = self.space.nso;
        let n = o * o * v * v;
        let o2 = o * o;
        let nso2 = nso * nso;

        let ca = self.ca_virt.as_ref().ok_or_else(|| {
            CepaError::Config(
                "the integral-direct four-virtual contraction requires the virtual orbital \
                 coefficients"
                    .into(),
            )
        })?;
        let mut trans = vec![0.0; nso * v];
        for i in 0..nso {
            for j in 0..v {
                trans[i * v + j] = ca[(i, j)];
            }
        }

        // half-transform both virtual indices into the AO basis; the
        // occupied pair is transposed in the sort and restored by the
        // pair symmetry of the final accumulation
        self.t2.read_into(&self.store, &mut self.tempt[..n])?;
        linalg::dgemm_nn(o2 * v, nso, v, 1.0, &self.tempt[..n], &trans, 0.0, &mut self.tempv[..o2 * v * nso]);
        for a in 0..nso {
            for b in 0..v {
                for i in 0..o {
                    for j in 0..o {
                        self.tempt[b * nso * o2 + a * o2 + j * o + i] =
                            self.tempv[a * v * o2 + b * o2 + i * o + j];
                    }
                }
            }
        }
        linalg::dgemm_nn(o2 * nso, nso, v, 1.0, &self.tempt[..o2 * nso * v], &trans, 0.0, &mut self.tempv[..o2 * nso2]);

        // stream the AO-basis block over row tiles
        if nso2 as u64 > self.plan.maxelem as u64 {
            return Err(CepaError::OutOfMemory(
                "a single row of the AO four-virtual block does not fit the streaming buffer".into(),
            ));
        }
        let tiling = Tiling::compute(nso2, nso2, self.plan.maxelem as u64, "AO four-virtual")?;
        let file = self.store.open(FileTag::VvvvAo, Mode::Old)?;
        let mut reader = file.reader(RECORD_VVVV_AO)?;
        for t in 0..tiling.ntiles {
            let cols = tiling.chunk_len(t, 1);
            reader.read_chunk(&mut self.integrals[..cols * nso2])?;
            let off = t * tiling.tilesize * o2;
            linalg::dgemm_nn(
                o2,
                cols,
                nso2,
                1.0,
                &self.tempv[..o2 * nso2],
                &self.integrals[..cols * nso2],
                0.0,
                &mut self.tempt[off..off + cols * o2],
            );
        }
        file.close(true)?;

        // back-transform to the MO virtuals and accumulate
        linalg::dgemm_nt(o2 * nso, v, nso, 1.0, &self.tempt[..o2 * nso2], &trans, 0.0, &mut self.tempv[..o2 * nso * v]);
        for a in 0..v {
            for b in 0..nso {
                for i in 0..o {
                    for j in 0..o {
                        self.tempt[b * v * o2 + a * o2 + i * o + j] =
                            self.tempv[a * nso * o2 + b * o2 + i * o + j];
                    }
                }
            }
        }
        read_residual(&self.store, &mut self.tempv[..n])?;
        linalg::dgemm_nt(o2 * v, v, nso, 1.0, &self.tempt[..o2 * v * nso], &trans, 1.0, &mut self.tempv[..n]);
        // like the packed path, the completed residual stays in scratch
        Ok(())
    }
}
