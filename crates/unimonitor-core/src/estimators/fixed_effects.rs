// =============================================================================
// Fixed Effects (within estimator)
// =============================================================================
//
// Each institution's own mean is subtracted from the outcome and the budget
// term, then the overall mean is added back:
//
//     ỹ_it = y_it − ȳ_i + ȳ        x̃_it = x_it − x̄_i + x̄
//
// OLS of ỹ on [1, x̃] gives the within slope plus an overall constant
// (ȳ − β x̄), which is how panel OLS packages report an FE model with a
// constant. The entity effects themselves are absorbed and not reported.
//
// Degrees of freedom account for the absorbed effects: n − N − k, with k the
// number of slopes. The reported R² is the within R² (the variation of ỹ
// around ȳ is exactly the within variation).
//
// =============================================================================

use ndarray::{Array1, Array2};

use super::sample::Sample;
use super::{build_coefficients, covariance_for, solve_failed, Estimator, EstimationResult, ModelDiagnostics};
use crate::error::{MonitorError, Result};
use crate::inference::InferenceConfig;
use crate::panel::PanelDataset;
use crate::solvers::fit_ols;
use crate::spec::{EstimatorKind, ModelSpecification};

/// Minimum number of institutions left after dropping single-period ones.
pub(super) const MIN_ENTITIES: usize = 2;

/// Within-entity estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedEffects;

impl Estimator for FixedEffects {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::FixedEffects
    }

    fn fit(
        &self,
        panel: &PanelDataset,
        spec: &ModelSpecification,
        inference: &InferenceConfig,
    ) -> Result<EstimationResult> {
        let inference = &inference.resolved_for(self.kind());
        let mut sample = Sample::select(panel, spec);
        let dropped = sample.drop_single_period_entities();
        if dropped > 0 {
            tracing::debug!(dropped, spec = %spec, "entities with a single usable period dropped");
        }
        check_within_sample(&sample, MIN_ENTITIES)?;

        let (x, y) = within_design(&sample);
        let fit = fit_ols(&x, &y).map_err(solve_failed(spec))?;

        let n = sample.len();
        let k = x.ncols() - 1;
        let dof = (n - sample.n_entities - k) as f64;
        let cov = covariance_for(spec, &fit, &x, &sample.entity, dof);
        let (coefficients, covariance) = build_coefficients(&spec.roles(), &fit.coefficients, &cov, dof, inference);

        Ok(EstimationResult {
            spec: spec.clone(),
            inference: *inference,
            coefficients,
            diagnostics: ModelDiagnostics {
                r_squared: fit.r_squared(),
                r_squared_kind: "within",
                n_obs: n,
                n_entities: sample.n_entities,
                n_periods: sample.n_periods(),
                dof_resid: dof,
                entities_dropped: dropped,
                variance_components: None,
                entity_dummies: None,
            },
            covariance,
        })
    }
}

/// Entity count and residual dof checks shared by FE and RE.
pub(super) fn check_within_sample(sample: &Sample, min_entities: usize) -> Result<()> {
    if sample.n_entities < min_entities {
        return Err(MonitorError::InsufficientEntities {
            needed: min_entities,
            found: sample.n_entities,
        });
    }
    // one slope: n must exceed N + 1
    let needed = sample.n_entities + 2;
    if sample.len() < needed {
        return Err(MonitorError::insufficient_data("within-entity estimation", needed, sample.len()));
    }
    Ok(())
}

/// Within-transformed design [1, x̃] and response ỹ (grand means restored).
pub(super) fn within_design(sample: &Sample) -> (Array2<f64>, Array1<f64>) {
    let n = sample.len();
    let y_bar_i = sample.entity_means(&sample.y);
    let x_bar_i = sample.entity_means(&sample.x);
    let y_bar = sample.y.iter().sum::<f64>() / n as f64;
    let x_bar = sample.x.iter().sum::<f64>() / n as f64;

    let y = Array1::from_shape_fn(n, |i| sample.y[i] - y_bar_i[sample.entity[i]] + y_bar);
    let x = Array2::from_shape_fn((n, 2), |(i, j)| match j {
        0 => 1.0,
        _ => sample.x[i] - x_bar_i[sample.entity[i]] + x_bar,
    });
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::run_estimator;
    use crate::estimators::tests::planted_panel;
    use crate::ingest::RawRecord;
    use crate::panel::{build_panel, PanelConfig};
    use crate::spec::{BudgetTerm, CovarianceKind, VariableRole};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_recovers_planted_slope() {
        let panel = planted_panel(&[]);
        let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects);
        let result = run_estimator(&panel, &spec).unwrap();

        let slope = result.coefficient(VariableRole::Budget(BudgetTerm::LogBudget)).unwrap();
        assert_abs_diff_eq!(slope.estimate, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.diagnostics.r_squared, 1.0, epsilon = 1e-9);
        assert_eq!(result.diagnostics.n_obs, 24);
        assert_eq!(result.diagnostics.n_entities, 4);
        assert_abs_diff_eq!(result.diagnostics.dof_resid, 24.0 - 4.0 - 1.0);
    }

    #[test]
    fn test_noisy_fit_has_finite_inference() {
        let panel = planted_panel(&[0.03, -0.02, 0.01, -0.04, 0.02, 0.0, 0.015]);
        for covariance in [CovarianceKind::Unadjusted, CovarianceKind::ClusteredByEntity] {
            let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects).with_covariance(covariance);
            let result = run_estimator(&panel, &spec).unwrap();
            let slope = result.coefficient_of_interest().unwrap();

            assert_abs_diff_eq!(slope.estimate, 2.0, epsilon = 0.2);
            assert!(slope.std_error.is_finite() && slope.std_error > 0.0);
            assert!(slope.p_value < 0.01);
            assert!(slope.ci_lower < slope.estimate && slope.estimate < slope.ci_upper);
        }
    }

    #[test]
    fn test_default_pvalues_use_student_t_with_residual_dof() {
        use crate::inference::{pvalue_t, pvalue_z, ReferenceDistribution};

        let panel = planted_panel(&[0.3, -0.25, 0.1, -0.4, 0.2, 0.05, -0.15]);
        let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects);
        let result = run_estimator(&panel, &spec).unwrap();
        let dof = result.diagnostics.dof_resid;
        assert_abs_diff_eq!(dof, 24.0 - 4.0 - 1.0);
        assert_eq!(result.inference.distribution, Some(ReferenceDistribution::StudentT));

        let slope = result.coefficient_of_interest().unwrap();
        assert_abs_diff_eq!(slope.p_value, pvalue_t(slope.statistic, dof), epsilon = 1e-14);
        assert!(slope.p_value >= pvalue_z(slope.statistic));

        let normal = InferenceConfig {
            distribution: Some(ReferenceDistribution::Normal),
            ..InferenceConfig::default()
        };
        let forced = FixedEffects.fit(&panel, &spec, &normal).unwrap();
        let forced_slope = forced.coefficient_of_interest().unwrap();
        assert_abs_diff_eq!(forced_slope.p_value, pvalue_z(forced_slope.statistic), epsilon = 1e-14);
    }

    #[test]
    fn test_single_period_entities_are_dropped() {
        let mut rows = Vec::new();
        for (name, alpha) in [("A", 0.0), ("B", 1.0)] {
            for t in 0..4 {
                let b = 100.0 + 10.0 * t as f64 + alpha * 7.0;
                rows.push(RawRecord::new(name, 2014 + t, b, 2.0 * b.ln() + alpha));
            }
        }
        rows.push(RawRecord::new("C", 2014, 500.0, 3.0));
        let panel = build_panel(&rows, &PanelConfig::default());

        let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects).with_outcome(crate::spec::Outcome::Igc);
        let result = run_estimator(&panel, &spec).unwrap();
        assert_eq!(result.diagnostics.entities_dropped, 1);
        assert_eq!(result.diagnostics.n_entities, 2);
    }

    #[test]
    fn test_needs_two_entities() {
        let rows: Vec<RawRecord> = (0..5)
            .map(|t| RawRecord::new("A", 2014 + t, 100.0 + t as f64, 3.0 + 0.1 * t as f64))
            .collect();
        let panel = build_panel(&rows, &PanelConfig::default());
        let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects);

        match run_estimator(&panel, &spec) {
            Err(MonitorError::InsufficientEntities { needed: 2, found: 1 }) => {}
            other => panic!("expected InsufficientEntities, got {other:?}"),
        }
    }

    #[test]
    fn test_constant_budget_within_entity_fails() {
        let mut rows = Vec::new();
        for (name, b) in [("A", 100.0), ("B", 200.0)] {
            for t in 0..4 {
                rows.push(RawRecord::new(name, 2014 + t, b, 3.0 + 0.1 * t as f64));
            }
        }
        let panel = build_panel(&rows, &PanelConfig::default());
        let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects);

        match run_estimator(&panel, &spec) {
            Err(MonitorError::EstimationFailed { spec: failed, .. }) => assert_eq!(failed, spec),
            other => panic!("expected EstimationFailed, got {other:?}"),
        }
    }
}
