// =============================================================================
// Least-Squares Solvers
// =============================================================================
//
// Every model in this crate is, after the right transformation of the data,
// an ordinary least squares problem:
//
//     Fixed Effects    OLS on within-demeaned data
//     Random Effects   OLS on quasi-demeaned data (θ-weighted)
//     DiD              OLS with entity dummies
//
// So there is one solver, plus the two covariance estimators the models use:
//
//     unadjusted   V = σ² (X'X)⁻¹,   σ² = RSS / dof
//     clustered    V = (X'X)⁻¹ B (X'X)⁻¹ · G/(G−1) · (N−1)/(N−K)
//                  B = Σ_g X_g' e_g e_g' X_g
//
// =============================================================================

mod ols;

pub use ols::{fit_ols, standard_errors, OlsFit, SolveError};
