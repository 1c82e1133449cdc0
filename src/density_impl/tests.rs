//! Tests for the density and property step

#[cfg(test)]
mod tests {
    use super::super::{build_opdm, normalize, properties};
    use crate::cepa_impl::CepaLevel;
    use crate::reference::{OrbitalSpace, PropertyIntegrals};
    use nalgebra::DMatrix;

    fn space(nfzc: usize, o: usize, v: usize, nfzv: usize) -> OrbitalSpace {
        OrbitalSpace {
            nfzc,
            ndocc: nfzc + o,
            nocc: o,
            nvirt: v,
            nfzv,
            nmo: o + v,
            nso: nfzc + o + v + nfzv,
        }
    }

    #[test]
    fn cepa0_normalization_is_identity() {
        let mut t1 = vec![0.1];
        let mut t2 = vec![0.2];
        let c0 = normalize(&mut t1, &mut t2, 1, 1, CepaLevel::Cepa0);
        assert_eq!(c0, 1.0);
        assert_eq!(t1, vec![0.1]);
        assert_eq!(t2, vec![0.2]);
    }

    #[test]
    fn cisd_normalization_shrinks_amplitudes() {
        // o = v = 1: sum = -t2^2 - 2 t1^2 (the antisymmetrized part
        // vanishes), nrm = sqrt(1 + t2^2 + 2 t1^2)
        let mut t1 = vec![0.1];
        let mut t2 = vec![0.2];
        let c0 = normalize(&mut t1, &mut t2, 1, 1, CepaLevel::Cisd);
        let nrm = (1.0f64 + 0.04 + 0.02).sqrt();
        assert!((c0 - 1.0 / nrm).abs() < 1e-14);
        assert!((t2[0] - 0.2 / nrm).abs() < 1e-14);
        assert!((t1[0] - 0.1 / nrm).abs() < 1e-14);
    }

    #[test]
    fn zero_amplitude_density_is_the_reference_density()
    {
        let space = space(1, 2, 2, 0);
        let nmo = space.nmo_full();
        let d1 = build_opdm(&space, &[0.0; 4], &[0.0; 16], 1.0);
        for p in 0..nmo {
            for q in 0..nmo {
                let expected = if p == q && p < 3 { 1.0 } else { 0.0 };
                assert!((d1[p * nmo + q] - expected).abs() < 1e-14);
            }
        }
        // alpha trace equals the number of doubly occupied orbitals
        let trace: f64 = (0..nmo).map(|p| d1[p * nmo + p]).sum();
        assert!((trace - 3.0).abs() < 1e-14);
    }

    #[test]
    fn doubles_shift_occupation_between_blocks() {
        // a single t2 amplitude moves density from the occupied into the
        // virtual block but preserves the trace
        let space = space(0, 1, 1, 0);
        let t2 = vec![0.3];
        let d1 = build_opdm(&space, &[0.0], &t2, 1.0);
        // vv: t2^2 + 0.5 * 0 = 0.09; oo: 1 - t2^2 - 0 = 0.91
        assert!((d1[0] - (1.0 - 0.09)).abs() < 1e-14);
        assert!((d1[3] - 0.09).abs() < 1e-14);
        let trace = d1[0] + d1[3];
        assert!((trace - 1.0).abs() < 1e-14);
    }

    #[test]
    fn singles_couple_occupied_and_virtual() {
        let space = space(0, 1, 1, 0);
        let d1 = build_opdm(&space, &[0.5], &[0.0], 1.0);
        // ov block is c0 * t1
        assert!((d1[1] - 0.5).abs() < 1e-14);
        assert!((d1[2] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn dipole_contraction_includes_nuclear_terms() {
        let nmo = 2;
        let d1 = vec![1.0, 0.0, 0.0, 0.0]; // one doubly occupied orbital
        let mz = DMatrix::from_row_slice(2, 2, &[0.25, 0.0, 0.0, -0.25]);
        let ints = PropertyIntegrals {
            dipole: [DMatrix::zeros(2, 2), DMatrix::zeros(2, 2), mz],
            nuclear_dipole: [0.0, 0.0, 1.0],
            quadrupole: None,
            nuclear_quadrupole: None,
        };
        let props = properties(&d1, nmo, &ints);
        assert_eq!(props.dipole[0], 0.0);
        assert_eq!(props.dipole[1], 0.0);
        // 1.0 (nuclear) - 2 * 0.25 (electronic)
        assert!((props.dipole[2] - 0.5).abs() < 1e-14);
        assert!(props.quadrupole.is_none());
    }
}
