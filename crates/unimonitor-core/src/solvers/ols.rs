// =============================================================================
// Ordinary Least Squares
// =============================================================================

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

use crate::convert::{matrix_rank, solve_normal_equations};

/// Why a least-squares solve could not be carried out.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("design has {rows} rows but response has {len} elements")]
    DimensionMismatch { rows: usize, len: usize },

    #[error("design matrix has no rows or no columns")]
    Empty,

    #[error("non-finite value in the design matrix or response")]
    NonFinite,

    #[error("design matrix is rank deficient (rank {rank} < {columns} columns); regressors are collinear")]
    RankDeficient { rank: usize, columns: usize },
}

/// A fitted OLS regression.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Array1<f64>,
    /// (X'X)⁻¹
    pub xtx_inv: Array2<f64>,
    pub residuals: Array1<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Total sum of squares around the mean of y.
    pub tss: f64,
    pub n_obs: usize,
    pub n_params: usize,
}

/// Fit y = Xβ + ε by least squares.
///
/// # Arguments
/// * `x` - Design matrix (n × p); include a column of ones for an intercept
/// * `y` - Response vector (length n)
///
/// # Returns
/// The fitted coefficients with (X'X)⁻¹, residuals and sums of squares.
///
/// # Errors
/// [`SolveError`] when the shapes disagree, the inputs are empty or contain
/// non-finite values, or the columns of X are collinear.
pub fn fit_ols(x: &Array2<f64>, y: &Array1<f64>) -> Result<OlsFit, SolveError> {
    let (n, p) = x.dim();
    if n != y.len() {
        return Err(SolveError::DimensionMismatch { rows: n, len: y.len() });
    }
    if n == 0 || p == 0 {
        return Err(SolveError::Empty);
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite);
    }

    let (coefficients, xtx_inv) = solve_normal_equations(x, y).ok_or_else(|| SolveError::RankDeficient {
        rank: matrix_rank(x),
        columns: p,
    })?;

    let residuals = y - &x.dot(&coefficients);
    let rss = residuals.iter().map(|e| e * e).sum();
    let y_mean = y.mean().unwrap_or(0.0);
    let tss = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    Ok(OlsFit {
        coefficients,
        xtx_inv,
        residuals,
        rss,
        tss,
        n_obs: n,
        n_params: p,
    })
}

impl OlsFit {
    /// Centered R². Zero when y has no variation.
    pub fn r_squared(&self) -> f64 {
        if self.tss > 0.0 {
            1.0 - self.rss / self.tss
        } else {
            0.0
        }
    }

    /// σ² = RSS / dof. NaN when dof is not positive.
    pub fn sigma2(&self, dof: f64) -> f64 {
        if dof > 0.0 {
            self.rss / dof
        } else {
            f64::NAN
        }
    }

    /// Homoskedastic covariance σ² (X'X)⁻¹.
    ///
    /// # Arguments
    /// * `dof` - Residual degrees of freedom used for σ² = RSS / dof
    pub fn covariance_unadjusted(&self, dof: f64) -> Array2<f64> {
        &self.xtx_inv * self.sigma2(dof)
    }

    /// Liang–Zeger cluster-robust covariance.
    ///
    /// V = (X'X)⁻¹ B (X'X)⁻¹ · G/(G−1) · (N−1)/(N−K), with B the sum over
    /// clusters of the outer products of the cluster scores X_g'e_g.
    ///
    /// # Arguments
    /// * `x` - The design matrix the fit was computed from
    /// * `clusters` - Cluster id of each row of `x` (any integers; only
    ///   equality matters)
    ///
    /// # Returns
    /// The p × p covariance matrix. With a single cluster the small-sample
    /// correction is skipped.
    pub fn covariance_clustered(&self, x: &Array2<f64>, clusters: &[usize]) -> Array2<f64> {
        let p = self.n_params;

        let mut scores: BTreeMap<usize, Array1<f64>> = BTreeMap::new();
        for (row, (&cluster, &e)) in x.axis_iter(Axis(0)).zip(clusters.iter().zip(self.residuals.iter())) {
            let s = scores.entry(cluster).or_insert_with(|| Array1::zeros(p));
            s.scaled_add(e, &row);
        }

        let mut meat = Array2::<f64>::zeros((p, p));
        for s in scores.values() {
            for a in 0..p {
                for b in 0..p {
                    meat[[a, b]] += s[a] * s[b];
                }
            }
        }

        let g = scores.len() as f64;
        let n = self.n_obs as f64;
        let k = p as f64;
        let correction = if g > 1.0 && n > k {
            (g / (g - 1.0)) * ((n - 1.0) / (n - k))
        } else {
            1.0
        };

        self.xtx_inv.dot(&meat).dot(&self.xtx_inv) * correction
    }
}

/// Standard errors from a covariance matrix (negative diagonals clamp to 0).
pub fn standard_errors(cov: &Array2<f64>) -> Array1<f64> {
    cov.diag().mapv(|v| if v.is_nan() { f64::NAN } else { v.max(0.0).sqrt() })
}
