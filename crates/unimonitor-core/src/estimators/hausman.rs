// =============================================================================
// Hausman Specification Test (FE vs RE)
// =============================================================================
//
//     H = (b_FE − b_RE)' (V_FE − V_RE)⁻¹ (b_FE − b_RE)   ~  χ²(k)
//
// over the k slope terms (the constant is not comparable between the two
// models). Under H0 both estimators are consistent and RE is efficient;
// rejecting H0 (p < 0.05) means the entity effects are correlated with the
// budget and FE should be preferred.
//
// The difference V_FE − V_RE must be positive definite. In small samples it
// often is not; that is reported as a failure rather than a made-up number.
//
// =============================================================================

use nalgebra::DVector;
use serde::Serialize;

use super::EstimationResult;
use crate::convert::to_dmatrix;
use crate::error::{MonitorError, Result};
use crate::inference::pvalue_chi2;
use crate::spec::{EstimatorKind, VariableRole};

const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Outcome of a Hausman test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HausmanTest {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
    /// FE when H0 is rejected, RE otherwise.
    pub preferred: EstimatorKind,
    /// Slope names in the order the test used them.
    pub terms: Vec<String>,
}

/// Compare a fixed-effects and a random-effects fit of the same model.
pub fn hausman(fe: &EstimationResult, re: &EstimationResult) -> Result<HausmanTest> {
    if fe.spec.estimator != EstimatorKind::FixedEffects || re.spec.estimator != EstimatorKind::RandomEffects {
        return Err(MonitorError::UnsupportedSpecification(format!(
            "Hausman test compares a fixed-effects and a random-effects fit, got {} and {}",
            fe.spec.estimator.code(),
            re.spec.estimator.code()
        )));
    }
    if fe.spec.outcome != re.spec.outcome || fe.spec.budget != re.spec.budget {
        return Err(MonitorError::UnsupportedSpecification(format!(
            "Hausman test needs the same variables in both models ({} vs {})",
            fe.spec, re.spec
        )));
    }

    // indices of the slope terms in each result
    let slopes: Vec<(usize, usize, &str)> = fe
        .coefficients
        .iter()
        .enumerate()
        .filter(|(_, c)| c.role != VariableRole::Intercept)
        .filter_map(|(i, c)| {
            re.coefficients
                .iter()
                .position(|r| r.role == c.role)
                .map(|j| (i, j, c.name.as_str()))
        })
        .collect();
    let k = slopes.len();

    let diff = DVector::from_iterator(
        k,
        slopes
            .iter()
            .map(|&(i, j, _)| fe.coefficients[i].estimate - re.coefficients[j].estimate),
    );
    let v_diff = ndarray::Array2::from_shape_fn((k, k), |(a, b)| {
        let (fa, ra, _) = slopes[a];
        let (fb, rb, _) = slopes[b];
        fe.covariance[[fa, fb]] - re.covariance[[ra, rb]]
    });

    let chol = to_dmatrix(&v_diff).cholesky().ok_or_else(|| {
        MonitorError::estimation_failed(
            &fe.spec,
            "V_FE − V_RE is not positive definite; the Hausman statistic is undefined for this sample",
        )
    })?;
    let statistic = diff.dot(&chol.solve(&diff));
    let p_value = pvalue_chi2(statistic, k as f64);

    let preferred = if p_value < SIGNIFICANCE_LEVEL {
        EstimatorKind::FixedEffects
    } else {
        EstimatorKind::RandomEffects
    };
    tracing::debug!(statistic, p_value, preferred = preferred.code(), "hausman test");

    Ok(HausmanTest {
        statistic,
        df: k,
        p_value,
        preferred,
        terms: slopes.iter().map(|&(_, _, name)| name.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::run_estimator;
    use crate::estimators::tests::planted_panel;
    use crate::spec::ModelSpecification;
    use approx::assert_abs_diff_eq;

    fn fits(noise: &[f64]) -> (EstimationResult, EstimationResult) {
        let panel = planted_panel(noise);
        let fe = run_estimator(&panel, &ModelSpecification::default_for(EstimatorKind::FixedEffects)).unwrap();
        let re = run_estimator(&panel, &ModelSpecification::default_for(EstimatorKind::RandomEffects)).unwrap();
        (fe, re)
    }

    fn with_slope(mut result: EstimationResult, estimate: f64, variance: f64) -> EstimationResult {
        result.coefficients[1].estimate = estimate;
        result.covariance[[1, 1]] = variance;
        result
    }

    #[test]
    fn test_statistic_by_hand() {
        let (fe, re) = fits(&[0.03, -0.02, 0.01]);
        let fe = with_slope(fe, 2.0, 0.05);
        let re = with_slope(re, 1.8, 0.01);

        let test = hausman(&fe, &re).unwrap();
        // (0.2)² / 0.04 = 1
        assert_abs_diff_eq!(test.statistic, 1.0, epsilon = 1e-12);
        assert_eq!(test.df, 1);
        assert_eq!(test.terms, vec!["ln_budget".to_string()]);
        assert_eq!(test.preferred, EstimatorKind::RandomEffects);
    }

    #[test]
    fn test_large_gap_prefers_fixed_effects() {
        let (fe, re) = fits(&[0.03, -0.02, 0.01]);
        let fe = with_slope(fe, 2.0, 0.02);
        let re = with_slope(re, 1.0, 0.01);

        let test = hausman(&fe, &re).unwrap();
        assert!(test.p_value < 0.05);
        assert_eq!(test.preferred, EstimatorKind::FixedEffects);
    }

    #[test]
    fn test_statistic_non_negative_on_real_fits() {
        let (fe, re) = fits(&[0.03, -0.02, 0.01, -0.04, 0.02, 0.0, 0.015]);
        match hausman(&fe, &re) {
            Ok(test) => {
                assert!(test.statistic >= 0.0);
                assert!((0.0..=1.0).contains(&test.p_value));
            }
            Err(MonitorError::EstimationFailed { .. }) => {}
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_non_positive_definite_difference_fails() {
        let (fe, re) = fits(&[0.03, -0.02, 0.01]);
        let fe = with_slope(fe, 2.0, 0.01);
        let re = with_slope(re, 1.9, 0.02);
        assert!(matches!(hausman(&fe, &re), Err(MonitorError::EstimationFailed { .. })));
    }

    #[test]
    fn test_rejects_mismatched_models() {
        let (fe, _) = fits(&[0.03, -0.02, 0.01]);
        assert!(matches!(
            hausman(&fe, &fe),
            Err(MonitorError::UnsupportedSpecification(_))
        ));
    }
}
