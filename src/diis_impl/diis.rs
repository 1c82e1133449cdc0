//! Disk-backed DIIS history and extrapolation.

use nalgebra::{DMatrix, DVector};

use crate::error::{CepaError, Result};
use crate::linalg;
use crate::store_impl::{AmplitudeStorage, FileTag, Mode, StoreFile, TensorStore};

/// Round-robin history of up to `maxdiis` amplitude/error vector pairs.
///
/// Vectors are written to slots named by a counter that runs `0, 1, ..,
/// maxdiis`; once the history is full, a replacement pointer cycles through
/// `1..=maxdiis`. Extrapolation only ever reads slots `1..=nvec`, so the
/// slot written on the very first iteration never participates.
#[derive(Debug)]
pub struct DiisAccelerator {
    maxdiis: usize,
    dim_t2: usize,
    dim_t1: usize,
    diis_iter: usize,
    replace_iter: usize,
}

impl DiisAccelerator {
    pub fn new(maxdiis: usize, dim_t2: usize, dim_t1: usize) -> Self {
        Self {
            maxdiis,
            dim_t2,
            dim_t1,
            diis_iter: 0,
            replace_iter: 1,
        }
    }

    /// Total length of one stored vector.
    pub fn dim(&self) -> usize {
        self.dim_t2 + self.dim_t1
    }

    pub fn history_len(&self) -> usize {
        self.diis_iter.min(self.maxdiis)
    }

    pub fn counters(&self) -> (usize, usize) {
        (self.diis_iter, self.replace_iter)
    }

    fn slot(&self, iter: usize) -> usize {
        if self.diis_iter <= self.maxdiis && iter <= self.maxdiis {
            self.diis_iter
        } else {
            self.replace_iter
        }
    }

    fn mode(&self) -> Mode {
        if self.diis_iter == 0 {
            Mode::New
        } else {
            Mode::Old
        }
    }

    /// Persist the current amplitudes (T2 then T1, flattened) into the
    /// history slot for this iteration.
    pub fn store_old_vector(
        &self,
        store: &TensorStore,
        iter: usize,
        t2: &AmplitudeStorage,
        t1: &[f64],
        scratch: &mut [f64],
    ) -> Result<()> {
        let file = store.open(FileTag::DiisOld, self.mode())?;
        let mut writer = file.writer(&format!("oldvector{}", self.slot(iter)))?;
        match t2 {
            AmplitudeStorage::InCore(tb) => writer.write_chunk(&tb[..self.dim_t2])?,
            AmplitudeStorage::OnDisk => {
                t2.read_into(store, &mut scratch[..self.dim_t2])?;
                writer.write_chunk(&scratch[..self.dim_t2])?;
            }
        }
        writer.write_chunk(&t1[..self.dim_t1])?;
        writer.finish()?;
        file.close(true)?;
        Ok(())
    }

    /// Persist this iteration's error vector and return its Euclidean
    /// norm, the convergence metric of the outer loop.
    pub fn store_error_vector(&self, store: &TensorStore, iter: usize, err: &[f64]) -> Result<f64> {
        let file = store.open(FileTag::DiisErr, self.mode())?;
        file.write_entry(&format!("evector{}", self.slot(iter)), &err[..self.dim()])?;
        file.close(true)?;
        Ok(linalg::norm(&err[..self.dim()]))
    }

    /// Extrapolation is attempted once at least two error vectors exist.
    pub fn should_extrapolate(&self) -> bool {
        self.diis_iter > 1
    }

    /// Solve the bordered linear system for the extrapolation weights.
    ///
    /// `B[i,j] = <e_i, e_j>` for the stored error vectors, bordered by a
    /// row and column of -1 with a zero corner; the right-hand side is
    /// `[0, .., 0, -1]`. The weights therefore sum to one.
    pub fn solve(
        &self,
        store: &TensorStore,
        scratch_a: &mut [f64],
        scratch_b: &mut [f64],
    ) -> Result<Vec<f64>> {
        let nvec = self.history_len();
        let nvar = nvec + 1;
        let dim = self.dim();
        let file = store.open(FileTag::DiisErr, Mode::Old)?;

        let mut b = DMatrix::<f64>::zeros(nvar, nvar);
        for i in 0..nvec {
            file.read_entry(&format!("evector{}", i + 1), &mut scratch_a[..dim])?;
            b[(i, i)] = linalg::dot(&scratch_a[..dim], &scratch_a[..dim]);
            for j in i + 1..nvec {
                file.read_entry(&format!("evector{}", j + 1), &mut scratch_b[..dim])?;
                let s = linalg::dot(&scratch_a[..dim], &scratch_b[..dim]);
                b[(i, j)] = s;
                b[(j, i)] = s;
            }
        }
        file.close(true)?;
        for i in 0..nvar {
            b[(nvec, i)] = -1.0;
            b[(i, nvec)] = -1.0;
        }
        b[(nvec, nvec)] = 0.0;

        let mut rhs = DVector::<f64>::zeros(nvar);
        rhs[nvec] = -1.0;

        let coeffs = b
            .lu()
            .solve(&rhs)
            .ok_or_else(|| CepaError::Singular("DIIS extrapolation matrix".into()))?;
        Ok(coeffs.iter().take(nvec).copied().collect())
    }

    /// Rebuild the amplitudes as the weighted sum of the stored history.
    pub fn reconstruct(
        &self,
        store: &TensorStore,
        coeffs: &[f64],
        t2: &mut AmplitudeStorage,
        t1: &mut [f64],
        scratch: &mut [f64],
        accum: &mut [f64],
    ) -> Result<()> {
        let file = store.open(FileTag::DiisOld, Mode::Old)?;
        t1[..self.dim_t1].fill(0.0);
        match t2 {
            AmplitudeStorage::InCore(tb) => {
                tb.fill(0.0);
                self.accumulate(&file, coeffs, tb, t1, scratch)?;
            }
            AmplitudeStorage::OnDisk => {
                accum[..self.dim_t2].fill(0.0);
                // split so the accumulator and the read buffer do not alias
                self.accumulate(&file, coeffs, &mut accum[..self.dim_t2], t1, scratch)?;
                file.close(true)?;
                let n = self.dim_t2;
                let target = store.open(FileTag::Doubles, Mode::New)?;
                target.write_entry(crate::store_impl::RECORD_T2, &accum[..n])?;
                target.close(true)?;
                return Ok(());
            }
        }
        file.close(true)?;
        Ok(())
    }

    fn accumulate(
        &self,
        file: &StoreFile,
        coeffs: &[f64],
        target: &mut [f64],
        t1: &mut [f64],
        scratch: &mut [f64],
    ) -> Result<()> {
        for (k, &c) in coeffs.iter().enumerate() {
            let mut reader = file.reader(&format!("oldvector{}", k + 1))?;
            reader.read_chunk(&mut scratch[..self.dim_t2])?;
            linalg::axpy(c, &scratch[..self.dim_t2], &mut target[..self.dim_t2]);
            reader.read_chunk(&mut scratch[..self.dim_t1])?;
            linalg::axpy(c, &scratch[..self.dim_t1], &mut t1[..self.dim_t1]);
        }
        Ok(())
    }

    /// Advance the write-slot counters at the end of an iteration.
    pub fn advance(&mut self) {
        if self.diis_iter <= self.maxdiis {
            self.diis_iter += 1;
        } else if self.replace_iter < self.maxdiis {
            self.replace_iter += 1;
        } else {
            self.replace_iter = 1;
        }
    }
}
