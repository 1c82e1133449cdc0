//! The coupled-pair solver: setup, the iteration loop, and teardown.

use std::path::Path;

use nalgebra::DMatrix;
use tracing::info;

use crate::density_impl as density;
use crate::diis_impl::DiisAccelerator;
use crate::error::{CepaError, Result};
use crate::memory::{self, MemoryPlan};
use crate::reference::{LocalCorrelation, OrbitalSpace, PropertyIntegrals, ReferenceWavefunction};
use crate::results::EnergyResults;
use crate::store_impl::{AmplitudeStorage, FileTag, Mode, TensorStore, RECORD_RESIDUAL, RECORD_T2};

use super::diagrams::{self, Diagram};
use super::MethodConfig;

/// Abort threshold on the amplitude-change norm; iterating past this is
/// never going to recover.
const DIVERGENCE_THRESHOLD: f64 = 1.0e6;

/// Iterative solver for the coupled-pair amplitude equations.
///
/// Owns the amplitudes, the shared contraction buffers, and the scratch
/// store; diagram tasks read the amplitudes and integral blocks and
/// accumulate into the residual buffers, and the update step turns the
/// residual into the next amplitude set.
#[derive(Debug)]
pub struct CoupledPair {
    pub(super) config: MethodConfig,
    pub(super) space: OrbitalSpace,
    pub(super) escf: f64,
    /// Active orbital energies, occupied block then virtual block.
    pub(super) eps: Vec<f64>,
    pub(super) local: Option<LocalCorrelation>,
    pub(super) properties: Option<PropertyIntegrals>,
    /// Virtual SCF coefficients, present on the integral-direct path.
    pub(super) ca_virt: Option<DMatrix<f64>>,
    pub(super) store: TensorStore,
    pub(super) plan: MemoryPlan,
    tasks: Vec<Diagram>,

    /// Shared streaming buffer for tiled integral blocks.
    pub(super) integrals: Vec<f64>,
    /// Scratch tensors of `o^2 vv + ov` doubles each.
    pub(super) tempt: Vec<f64>,
    pub(super) tempv: Vec<f64>,
    pub(super) t2: AmplitudeStorage,
    pub(super) t1: Vec<f64>,
    /// Singles residual.
    pub(super) w1: Vec<f64>,
    pub(super) pair_energy: Vec<f64>,
    diis: DiisAccelerator,

    pub(super) e_corr: f64,
    pub(super) e_mp2: f64,
    pub(super) e_mp2_os: f64,
    pub(super) e_mp2_ss: f64,
    pub(super) e_corr_os: f64,
    pub(super) e_corr_ss: f64,
}

impl CoupledPair {
    pub fn new(
        reference: &ReferenceWavefunction,
        config: MethodConfig,
        scratch: impl AsRef<Path>,
    ) -> Result<Self> {
        if config.memory_mb <= 0.0 {
            return Err(CepaError::Config(
                "the memory budget must be positive".into(),
            ));
        }
        let space = reference.orbital_space()?;
        if space.nvirt < space.nocc {
            return Err(CepaError::Config(
                "the active virtual space must be at least as large as the active occupied space"
                    .into(),
            ));
        }
        if config.dipmom && !config.level.allows_properties() {
            return Err(CepaError::Config(
                "dipole moments are available only for CEPA(0), CISD, ACPF, and AQCC".into(),
            ));
        }

        // the fragment variant always consumes the precomputed packed blocks
        let direct = config.vabcd_direct && !reference.is_local();
        if direct && reference.ca_virt.is_none() {
            return Err(CepaError::Config(
                "the integral-direct four-virtual contraction requires the virtual orbital \
                 coefficients"
                    .into(),
            ));
        }

        let eps = reference.active_orbital_energies();
        if eps.len() != space.nmo {
            return Err(CepaError::Config(format!(
                "expected {} active orbital energies, got {}",
                space.nmo,
                eps.len()
            )));
        }

        let (o, v) = (space.nocc, space.nvirt);
        let vv = if direct { space.nso * space.nso } else { v * v };

        info!("===========================================");
        info!("     {}", config.level.label());
        info!("     {}", config.level.description());
        info!("===========================================");
        info!("occupied orbitals:        {:6}", o);
        info!("virtual orbitals:         {:6}", v);
        info!("available memory:         {:9.2} mb", config.memory_mb);

        let plan = memory::plan(o, v, vv, memory::doubles_from_mb(config.memory_mb), 0)?;
        info!(
            "minimum memory requirement: {:7.2} mb",
            plan.min_required as f64 * 8.0 / 1024.0 / 1024.0
        );

        let tasks = diagrams::build_task_list(config.no_singles, direct);

        let o2v2 = o * o * v * v;
        let scratch_len = o * o * vv + o * v;
        let t2 = if plan.t2_on_disk {
            AmplitudeStorage::OnDisk
        } else {
            AmplitudeStorage::InCore(vec![0.0; o2v2])
        };
        let diis = DiisAccelerator::new(config.diis_max_vecs, o2v2, o * v);

        Ok(Self {
            space,
            escf: reference.escf,
            eps,
            local: reference.local.clone(),
            properties: reference.properties.clone(),
            ca_virt: reference.ca_virt.clone(),
            store: TensorStore::new(scratch.as_ref())?,
            plan,
            tasks,
            integrals: vec![0.0; plan.maxelem],
            tempt: vec![0.0; scratch_len],
            tempv: vec![0.0; scratch_len],
            t2,
            t1: vec![0.0; o * v],
            w1: vec![0.0; o * v],
            pair_energy: vec![0.0; o * o],
            diis,
            config,
            e_corr: 0.0,
            e_mp2: 0.0,
            e_mp2_os: 0.0,
            e_mp2_ss: 0.0,
            e_corr_os: 0.0,
            e_corr_ss: 0.0,
        })
    }

    pub fn reference_energy(&self) -> f64 {
        self.escf
    }

    pub fn correlation_energy(&self) -> f64 {
        self.e_corr
    }

    pub fn mp2_energy(&self) -> f64 {
        self.e_mp2
    }

    pub fn orbital_space(&self) -> &OrbitalSpace {
        &self.space
    }

    /// Solve the amplitude equations and return the total energy.
    pub fn compute_energy(&mut self, results: &mut EnergyResults) -> Result<f64> {
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let label = self.config.level.label();

        // zero the residual record; the doubles record too when T2 lives
        // on disk
        self.tempt[..n].fill(0.0);
        let file = self.store.open(FileTag::Residual, Mode::New)?;
        file.write_entry(RECORD_RESIDUAL, &self.tempt[..n])?;
        file.close(true)?;
        if self.t2.on_disk() {
            let file = self.store.open(FileTag::Doubles, Mode::New)?;
            file.write_entry(RECORD_T2, &self.tempt[..n])?;
            file.close(true)?;
        }

        info!("");
        info!("begin {label} iterations");
        info!("");
        info!("  iter  diis          energy        d(energy)           |d(t)|      time");

        let mut iter = 0usize;
        let mut nrm = 1.0f64;
        self.e_corr = 0.0;

        while iter < self.config.maxiter && nrm > self.config.r_convergence {
            let timer = std::time::Instant::now();

            // iteration 0 starts from zero amplitudes, so the diagram pass
            // is skipped and the update produces the first-order guess
            if iter > 0 {
                self.w1.fill(0.0);
                for k in 0..self.tasks.len() {
                    let task = self.tasks[k];
                    task.run(self)?;
                }
            }

            let e_old = self.e_corr;
            self.pair_energies()?;
            if !self.config.no_singles {
                self.update_t1(iter);
            } else {
                // the singles segment of the error vector is owned by the
                // singles update; without it, keep the segment zeroed
                self.tempv[n..n + o * v].fill(0.0);
            }
            self.update_t2(iter)?;

            // record this iteration's amplitudes and error, then
            // extrapolate; the energy below is evaluated from the
            // extrapolated amplitudes
            self.diis
                .store_old_vector(&self.store, iter, &self.t2, &self.t1, &mut self.integrals)?;
            nrm = self
                .diis
                .store_error_vector(&self.store, iter, &self.tempv[..n + o * v])?;

            if self.diis.should_extrapolate() {
                let coeffs = self.diis.solve(&self.store, &mut self.tempt, &mut self.tempv)?;
                self.diis.reconstruct(
                    &self.store,
                    &coeffs,
                    &mut self.t2,
                    &mut self.t1,
                    &mut self.tempt,
                    &mut self.integrals,
                )?;
                if self.config.no_singles {
                    self.t1.fill(0.0);
                }
            }

            self.e_corr = self.check_energy()?;
            self.diis.advance();
            let (_, replace) = self.diis.counters();
            info!(
                "{:6}  {:2} {:2} {:16.10} {:16.10} {:16.10}  {:6.2?}",
                iter,
                self.diis.history_len(),
                replace,
                self.e_corr,
                self.e_corr - e_old,
                nrm,
                timer.elapsed()
            );

            iter += 1;
            if iter == 1 {
                self.e_mp2 = self.e_corr;
                self.scs_mp2()?;
            }
            if nrm > DIVERGENCE_THRESHOLD {
                return Err(CepaError::Diverged { norm: nrm });
            }
        }

        if iter == self.config.maxiter {
            return Err(CepaError::NotConverged {
                iterations: self.config.maxiter,
                threshold: self.config.r_convergence,
            });
        }

        if self.local.is_some() {
            self.local_scs_cepa()?;
            self.e_corr = self.e_corr_os / self.config.cepa_scale_os
                + self.e_corr_ss / self.config.cepa_scale_ss;
        } else {
            self.scs_cepa()?;
        }

        info!("");
        info!("{label} iterations converged!");
        info!("");
        info!("  OS SCS-MP2 correlation energy:    {:20.12}", self.e_mp2_os);
        info!("  SS SCS-MP2 correlation energy:    {:20.12}", self.e_mp2_ss);
        info!(
            "  SCS-MP2 correlation energy:       {:20.12}",
            self.e_mp2_os + self.e_mp2_ss
        );
        info!(
            "* SCS-MP2 total energy:             {:20.12}",
            self.e_mp2_os + self.e_mp2_ss + self.escf
        );
        info!("");
        info!("  MP2 correlation energy:           {:20.12}", self.e_mp2);
        info!("* MP2 total energy:                 {:20.12}", self.e_mp2 + self.escf);
        info!("");
        if self.config.scs_cepa {
            info!("  OS SCS-{label} correlation energy: {:20.12}", self.e_corr_os);
            info!("  SS SCS-{label} correlation energy: {:20.12}", self.e_corr_ss);
            info!(
                "  SCS-{label} correlation energy:    {:20.12}",
                self.e_corr_os + self.e_corr_ss
            );
            info!(
                "* SCS-{label} total energy:          {:20.12}",
                self.e_corr_os + self.e_corr_ss + self.escf
            );
            info!("");
        }
        info!(
            "  OS {label} correlation energy:     {:20.12}",
            self.e_corr_os / self.config.cepa_scale_os
        );
        info!(
            "  SS {label} correlation energy:     {:20.12}",
            self.e_corr_ss / self.config.cepa_scale_ss
        );
        info!("  {label} correlation energy:        {:20.12}", self.e_corr);
        info!("* {label} total energy:              {:20.12}", self.e_corr + self.escf);
        info!("");

        results.publish("MP2 CORRELATION ENERGY", self.e_mp2);
        results.publish("MP2 TOTAL ENERGY", self.e_mp2 + self.escf);
        results.publish(
            "SCS-MP2 CORRELATION ENERGY",
            self.e_mp2_os + self.e_mp2_ss,
        );
        results.publish(
            "SCS-MP2 TOTAL ENERGY",
            self.e_mp2_os + self.e_mp2_ss + self.escf,
        );
        results.publish(format!("{label} CORRELATION ENERGY"), self.e_corr);
        results.publish(format!("{label} TOTAL ENERGY"), self.e_corr + self.escf);
        if self.config.scs_cepa {
            results.publish(
                format!("SCS-{label} CORRELATION ENERGY"),
                self.e_corr_os + self.e_corr_ss,
            );
            results.publish(
                format!("SCS-{label} TOTAL ENERGY"),
                self.e_corr_os + self.e_corr_ss + self.escf,
            );
        }
        results.publish("CURRENT CORRELATION ENERGY", self.e_corr);
        results.publish("CURRENT ENERGY", self.e_corr + self.escf);

        if self.config.dipmom {
            self.properties_step(results)?;
        }

        self.finalize()?;
        Ok(self.e_corr + self.escf)
    }

    /// One-particle density and properties after convergence.
    fn properties_step(&mut self, results: &mut EnergyResults) -> Result<()> {
        let ints = self.properties.clone().ok_or_else(|| {
            CepaError::Config("property evaluation requires the one-electron integrals".into())
        })?;
        let (o, v) = (self.space.nocc, self.space.nvirt);
        let n = o * o * v * v;
        let label = self.config.level.label();

        let mut t1 = self.t1.clone();
        let mut t2 = vec![0.0; n];
        self.t2.read_into(&self.store, &mut t2)?;

        let c0 = density::normalize(&mut t1, &mut t2, o, v, self.config.level);
        let d1 = density::build_opdm(&self.space, &t1, &t2, c0);
        let props = density::properties(&d1, self.space.nmo_full(), &ints);

        info!("");
        info!("==> {label} properties <==");
        info!("");
        for (axis, value) in ["X", "Y", "Z"].iter().zip(props.dipole) {
            info!("  dipole {axis}: {value:16.10}");
            results.publish(format!("{label} DIPOLE {axis}"), value);
        }
        if let Some(quad) = props.quadrupole {
            for (axis, value) in ["XX", "YY", "ZZ", "XY", "XZ", "YZ"].iter().zip(quad) {
                info!("  quadrupole {axis}: {value:16.10}");
                results.publish(format!("{label} QUADRUPOLE {axis}"), value);
            }
        }
        Ok(())
    }

    /// Delete solver-owned scratch records; integral files stay.
    fn finalize(&mut self) -> Result<()> {
        self.store.remove(FileTag::Residual)?;
        self.store.remove(FileTag::Doubles)?;
        self.store.remove(FileTag::DiisOld)?;
        self.store.remove(FileTag::DiisErr)?;
        Ok(())
    }
}
