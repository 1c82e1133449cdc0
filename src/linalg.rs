//! BLAS-style helpers over flat `f64` buffers.
//!
//! The large tensors in this crate are flat column-major buffers; the
//! contraction kernels below provide the usual
//! `C = alpha * op(A) * op(B) + beta * C` semantics through nalgebra
//! matrix views, so a contraction reads like the corresponding gemm call.

use nalgebra::{DMatrixView, DMatrixViewMut};

/// `C(m x n) = alpha * A(m x k) * B(k x n) + beta * C`.
pub fn dgemm_nn(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    b: &[f64],
    beta: f64,
    c: &mut [f64],
) {
    let a = DMatrixView::from_slice(&a[..m * k], m, k);
    let b = DMatrixView::from_slice(&b[..k * n], k, n);
    let mut c = DMatrixViewMut::from_slice(&mut c[..m * n], m, n);
    c.gemm(alpha, &a, &b, beta);
}

/// `C(m x n) = alpha * A^T * B + beta * C`, with `A` stored `(k x m)`.
pub fn dgemm_tn(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    b: &[f64],
    beta: f64,
    c: &mut [f64],
) {
    let a = DMatrixView::from_slice(&a[..k * m], k, m);
    let b = DMatrixView::from_slice(&b[..k * n], k, n);
    let mut c = DMatrixViewMut::from_slice(&mut c[..m * n], m, n);
    c.gemm_tr(alpha, &a, &b, beta);
}

/// `C(m x n) = alpha * A * B^T + beta * C`, with `B` stored `(n x k)`.
///
/// The transposed operand is materialized, so keep this to the smaller
/// right-hand sides (basis transforms, density blocks).
pub fn dgemm_nt(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    b: &[f64],
    beta: f64,
    c: &mut [f64],
) {
    let a = DMatrixView::from_slice(&a[..m * k], m, k);
    let bt = DMatrixView::from_slice(&b[..n * k], n, k).transpose();
    let mut c = DMatrixViewMut::from_slice(&mut c[..m * n], m, n);
    c.gemm(alpha, &a, &bt, beta);
}

/// `y += alpha * x`.
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (y, x) in y.iter_mut().zip(x) {
        *y += alpha * x;
    }
}

pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

pub fn norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

/// Index of the ordered pair `(i, j)` in triangular packing.
pub fn packed_index(i: usize, j: usize) -> usize {
    let (hi, lo) = if i < j { (j, i) } else { (i, j) };
    hi * (hi + 1) / 2 + lo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemm_nn_matches_hand_product() {
        // column-major A(2x2) = [[1,3],[2,4]], B(2x2) = [[5,7],[6,8]]
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0; 4];
        dgemm_nn(2, 2, 2, 1.0, &a, &b, 0.0, &mut c);
        assert_eq!(c, [23.0, 34.0, 31.0, 46.0]);
    }

    #[test]
    fn gemm_tn_transposes_left_operand() {
        let a = [1.0, 2.0, 3.0, 4.0]; // (2x2), A^T = [[1,2],[3,4]]
        let b = [1.0, 0.0, 0.0, 1.0];
        let mut c = [0.0; 4];
        dgemm_tn(2, 2, 2, 1.0, &a, &b, 0.0, &mut c);
        assert_eq!(c, [1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn gemm_nt_transposes_right_operand() {
        let a = [1.0, 0.0, 0.0, 1.0];
        let b = [1.0, 2.0, 3.0, 4.0]; // (2x2), B^T = [[1,2],[3,4]]
        let mut c = [0.0; 4];
        dgemm_nt(2, 2, 2, 1.0, &a, &b, 0.0, &mut c);
        assert_eq!(c, [1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn gemm_accumulates_with_beta() {
        let a = [1.0];
        let b = [2.0];
        let mut c = [10.0];
        dgemm_nn(1, 1, 1, 3.0, &a, &b, 1.0, &mut c);
        assert_eq!(c, [16.0]);
    }

    #[test]
    fn packed_index_is_symmetric() {
        assert_eq!(packed_index(0, 0), 0);
        assert_eq!(packed_index(2, 1), packed_index(1, 2));
        assert_eq!(packed_index(3, 3), 9);
    }

    #[test]
    fn norm_and_dot() {
        let x = [3.0, 4.0];
        assert_eq!(dot(&x, &x), 25.0);
        assert_eq!(norm(&x), 5.0);
    }
}
