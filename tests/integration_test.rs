//! End-to-end solver runs on a minimal two-orbital system.
//!
//! With one occupied and one virtual orbital the amplitude equations
//! close over a single doubles amplitude, so the converged energies have
//! hand-computable fixed points. The Coulomb-ordered integral is `w` and
//! the exchange-ordered integral is `x = w/2`, which makes the ring
//! contributions cancel exactly and reduces CEPA(0) to the MP2 closed
//! form `t = -w / (eps_a + eps_b - eps_i - eps_j)`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use cepa::reference::ReferenceWavefunction;
use cepa::store_impl::{
    FileTag, Mode, TensorStore, RECORD_OOOO, RECORD_OOOV, RECORD_OOVO, RECORD_OOVV, RECORD_OVOV,
    RECORD_VOVV, RECORD_VVVO, RECORD_VVVV_MINUS, RECORD_VVVV_PLUS,
};
use cepa::{CepaError, CepaLevel, CoupledPair, EnergyResults, MethodConfig};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

const W: f64 = 0.1;
const ESCF: f64 = -1.0;

fn scratch_dir(label: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "cepa_integration_{}_{}_{}",
        label,
        std::process::id(),
        n
    ))
}

fn minimal_reference() -> ReferenceWavefunction {
    ReferenceWavefunction {
        escf: ESCF,
        nmopi: vec![2],
        doccpi: vec![1],
        frzcpi: vec![0],
        frzvpi: vec![0],
        nsopi: vec![2],
        epsilon: vec![vec![-1.0, 1.0]],
        ca_virt: None,
        local: None,
        properties: None,
    }
}

/// Write every integral record of the o = v = 1 system: the Coulomb
/// block `w`, the exchange block `w/2`, and zeros everywhere else.
fn write_integral_blocks(store: &TensorStore) {
    let blocks = [
        (FileTag::Ovov, RECORD_OVOV, W),
        (FileTag::Oovv, RECORD_OOVV, W / 2.0),
        (FileTag::Oooo, RECORD_OOOO, 0.0),
        (FileTag::Oovo, RECORD_OOVO, 0.0),
        (FileTag::Ooov, RECORD_OOOV, 0.0),
        (FileTag::Vvvo, RECORD_VVVO, 0.0),
        (FileTag::Vovv, RECORD_VOVV, 0.0),
        (FileTag::VvvvPlus, RECORD_VVVV_PLUS, 0.0),
        (FileTag::VvvvMinus, RECORD_VVVV_MINUS, 0.0),
    ];
    for (tag, record, value) in blocks {
        let file = store.open(tag, Mode::New).unwrap();
        file.write_entry(record, &[value]).unwrap();
        file.close(true).unwrap();
    }
}

#[test]
fn cepa0_reaches_the_mp2_closed_form() {
    let dir = scratch_dir("cepa0");
    let store = TensorStore::new(&dir).unwrap();
    write_integral_blocks(&store);

    let config = MethodConfig {
        no_singles: true,
        r_convergence: 1.0e-9,
        maxiter: 50,
        ..MethodConfig::default()
    };
    let reference = minimal_reference();
    let mut solver = CoupledPair::new(&reference, config, &dir).unwrap();
    let mut results = EnergyResults::new();
    let total = solver.compute_energy(&mut results).unwrap();

    // denominator eps_a + eps_b - eps_i - eps_j = 4
    let expected_corr = -W * W / 4.0;
    assert!(
        (total - (ESCF + expected_corr)).abs() < 1e-12,
        "total energy was {total}"
    );
    assert!((solver.correlation_energy() - expected_corr).abs() < 1e-12);
    // with CEPA(0) on this system the first iteration is already the
    // fixed point, so the MP2 energy coincides with it
    assert!((solver.mp2_energy() - expected_corr).abs() < 1e-12);

    assert!(
        (results.get("CEPA(0) CORRELATION ENERGY").unwrap() - expected_corr).abs() < 1e-12
    );
    assert!((results.get("MP2 TOTAL ENERGY").unwrap() - (ESCF + expected_corr)).abs() < 1e-12);
    assert!((results.get("CURRENT ENERGY").unwrap() - total).abs() < 1e-14);

    // solver-owned scratch is deleted at teardown, integral files stay
    assert!(!store.exists(FileTag::Residual));
    assert!(!store.exists(FileTag::DiisOld));
    assert!(store.exists(FileTag::Ovov));
}

#[test]
fn singles_tasks_with_zero_blocks_keep_the_fixed_point() {
    // the singles diagrams all read zero-valued blocks, so T1 stays zero
    // and the doubles fixed point is unchanged
    let dir = scratch_dir("singles");
    let store = TensorStore::new(&dir).unwrap();
    write_integral_blocks(&store);

    let config = MethodConfig {
        no_singles: false,
        r_convergence: 1.0e-9,
        maxiter: 50,
        ..MethodConfig::default()
    };
    let reference = minimal_reference();
    let mut solver = CoupledPair::new(&reference, config, &dir).unwrap();
    let mut results = EnergyResults::new();
    let total = solver.compute_energy(&mut results).unwrap();

    let expected_corr = -W * W / 4.0;
    assert!((total - (ESCF + expected_corr)).abs() < 1e-12);
}

#[test]
fn cepa2_fixed_point_satisfies_the_shifted_equation() {
    // CEPA(2) shifts the denominator by the pair energy w*t, so the
    // converged amplitude satisfies t * (4 - w t) = -w
    let dir = scratch_dir("cepa2");
    let store = TensorStore::new(&dir).unwrap();
    write_integral_blocks(&store);

    let config = MethodConfig {
        level: CepaLevel::Cepa2,
        no_singles: true,
        r_convergence: 1.0e-10,
        maxiter: 200,
        ..MethodConfig::default()
    };
    let reference = minimal_reference();
    let mut solver = CoupledPair::new(&reference, config, &dir).unwrap();
    let mut results = EnergyResults::new();
    solver.compute_energy(&mut results).unwrap();

    // e_corr = w * t
    let t = solver.correlation_energy() / W;
    let fixed_point = t * (4.0 - W * t) + W;
    assert!(
        fixed_point.abs() < 1e-8,
        "fixed-point equation residual was {fixed_point}"
    );
    assert!(results.get("CEPA(2) CORRELATION ENERGY").is_some());
}

#[test]
fn unreachable_threshold_reports_non_convergence() {
    let dir = scratch_dir("noconv");
    let store = TensorStore::new(&dir).unwrap();
    write_integral_blocks(&store);

    let config = MethodConfig {
        no_singles: true,
        r_convergence: 0.0,
        maxiter: 1,
        ..MethodConfig::default()
    };
    let reference = minimal_reference();
    let mut solver = CoupledPair::new(&reference, config, &dir).unwrap();
    let mut results = EnergyResults::new();
    let err = solver.compute_energy(&mut results).unwrap_err();
    assert!(matches!(err, CepaError::NotConverged { iterations: 1, .. }));
}

#[test]
fn cisd_on_the_minimal_system_converges() {
    // CISD shifts by the whole correlation energy: t * (4 - w t) = -w
    // again (e_corr = w t), same fixed-point equation as CEPA(2) here,
    // but reached through the global-shift code path
    let dir = scratch_dir("cisd");
    let store = TensorStore::new(&dir).unwrap();
    write_integral_blocks(&store);

    let config = MethodConfig {
        level: CepaLevel::Cisd,
        no_singles: true,
        r_convergence: 1.0e-10,
        maxiter: 200,
        ..MethodConfig::default()
    };
    let reference = minimal_reference();
    let mut solver = CoupledPair::new(&reference, config, &dir).unwrap();
    let mut results = EnergyResults::new();
    let total = solver.compute_energy(&mut results).unwrap();

    let t = solver.correlation_energy() / W;
    let fixed_point = t * (4.0 - W * t) + W;
    assert!(fixed_point.abs() < 1e-8);
    assert!(total < ESCF, "correlation must lower the energy");
}
