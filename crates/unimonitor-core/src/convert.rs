// =============================================================================
// ndarray ↔ nalgebra Conversion Utilities
// =============================================================================
//
// Design matrices are assembled as ndarray arrays (row-oriented, easy to fill
// column by column from the panel) and handed to nalgebra for the
// factorisations. Every crossing between the two goes through this module.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Convert an ndarray Array2 to a nalgebra DMatrix.
#[inline]
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Convert an ndarray Array1 to a nalgebra DVector.
#[inline]
pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
#[inline]
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

/// Convert a nalgebra DVector to an ndarray Array1.
#[inline]
pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    Array1::from_iter(v.iter().copied())
}

/// Solve the normal equations (X'X)β = X'y.
///
/// Cholesky first; LU as a fallback for matrices that are only barely
/// positive definite.
///
/// # Arguments
/// * `x` - Design matrix (n × p), one row per observation
/// * `y` - Response vector (length n)
///
/// # Returns
/// `Some((β, (X'X)⁻¹))`, or `None` when X is rank deficient or X'X cannot
/// be inverted.
pub fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>) -> Option<(Array1<f64>, Array2<f64>)> {
    // Cholesky can "succeed" on an exactly singular X'X thanks to rounding,
    // so check the rank of X itself first.
    if matrix_rank(x) < x.ncols() {
        return None;
    }

    let x_nalg = to_dmatrix(x);
    let y_nalg = to_dvector(y);
    let p = x_nalg.ncols();

    let xtx = x_nalg.transpose() * &x_nalg;
    let xty = x_nalg.transpose() * y_nalg;

    if let Some(chol) = xtx.clone().cholesky() {
        let beta = chol.solve(&xty);
        let inv = chol.solve(&DMatrix::identity(p, p));
        return Some((to_array1(&beta), to_array2(&inv)));
    }

    let beta = xtx.clone().lu().solve(&xty)?;
    let inv = xtx.try_inverse()?;
    Some((to_array1(&beta), to_array2(&inv)))
}

/// Numerical rank of a matrix via SVD.
///
/// Singular values below `max_sv · max(n, p) · ε` count as zero, the same
/// cutoff numpy's `matrix_rank` uses.
pub fn matrix_rank(a: &Array2<f64>) -> usize {
    let m = to_dmatrix(a);
    let svd = m.svd(false, false);
    let max_sv = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    if max_sv == 0.0 {
        return 0;
    }
    let tol = max_sv * (a.nrows().max(a.ncols()) as f64) * f64::EPSILON;
    svd.singular_values.iter().filter(|&&s| s > tol).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_roundtrip_matrix() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(to_array2(&to_dmatrix(&a)), a);
    }

    #[test]
    fn test_solve_normal_equations_exact_line() {
        // y = 1 + 2x
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let (beta, inv) = solve_normal_equations(&x, &y).unwrap();
        assert_abs_diff_eq!(beta[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(beta[1], 2.0, epsilon = 1e-10);
        // (X'X)⁻¹ for this design: [[0.7, -0.3], [-0.3, 0.2]]
        assert_abs_diff_eq!(inv[[0, 0]], 0.7, epsilon = 1e-10);
        assert_abs_diff_eq!(inv[[0, 1]], -0.3, epsilon = 1e-10);
        assert_abs_diff_eq!(inv[[1, 1]], 0.2, epsilon = 1e-10);
    }

    #[test]
    fn test_singular_design() {
        let x = array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]];
        let y = array![1.0, 2.0, 3.0];
        assert!(solve_normal_equations(&x, &y).is_none());
        assert_eq!(matrix_rank(&x), 1);
    }
}
