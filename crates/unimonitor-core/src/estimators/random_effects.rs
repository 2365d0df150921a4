// =============================================================================
// Random Effects (Swamy–Arora feasible GLS)
// =============================================================================
//
// Three regressions:
//
//   1. Within (FE) regression          → σ²ₑ = RSS_w / (n − N − k)
//   2. Between regression on entity     → σ²_b = RSS_b / (N − k − 1)
//      means ȳ_i on [1, x̄_i]              σ²ᵤ = max(0, σ²_b − σ²ₑ / T̄)
//   3. OLS on quasi-demeaned data:
//
//        θ_i  = 1 − sqrt(σ²ₑ / (T_i σ²ᵤ + σ²ₑ))
//        ỹ_it = y_it − θ_i ȳ_i
//        X̃_it = [1 − θ_i,  x_it − θ_i x̄_i]
//
// T̄ is the harmonic mean of the periods per entity, so unbalanced panels are
// handled. When both variance components are zero θ_i = 0 (pooled OLS).
//
// DEGENERATE CASE
// ---------------
// If σ²ₑ is zero while σ²ᵤ is not, every θ_i is 1 and the constant column
// 1 − θ_i vanishes. The model is then exactly the within estimator, so the
// FE transform (with the overall mean restored) is used instead.
//
// =============================================================================

use ndarray::{Array1, Array2};

use super::fixed_effects::{check_within_sample, within_design};
use super::sample::Sample;
use super::{
    build_coefficients, covariance_for, solve_failed, Estimator, EstimationResult, ModelDiagnostics,
    VarianceComponents,
};
use crate::error::Result;
use crate::inference::InferenceConfig;
use crate::panel::PanelDataset;
use crate::solvers::fit_ols;
use crate::spec::{EstimatorKind, ModelSpecification};

/// The between regression needs N > k + 1.
const MIN_ENTITIES: usize = 3;

const THETA_ONE_TOL: f64 = 1e-10;

/// Swamy–Arora random-effects estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomEffects;

impl Estimator for RandomEffects {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::RandomEffects
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
        check_within_sample(&sample, MIN_ENTITIES)?;

        let n = sample.len();
        let n_entities = sample.n_entities;
        let k = 1usize;

        // -------------------------------------------------------------------------
        // Variance components
        // -------------------------------------------------------------------------
        let (xw, yw) = within_design(&sample);
        let within = fit_ols(&xw, &yw).map_err(solve_failed(spec))?;
        let sigma2_e = within.rss / (n - n_entities - k) as f64;

        let y_bar_i = sample.entity_means(&sample.y);
        let x_bar_i = sample.entity_means(&sample.x);
        let xb = Array2::from_shape_fn((n_entities, 2), |(i, j)| if j == 0 { 1.0 } else { x_bar_i[i] });
        let between = fit_ols(&xb, &Array1::from(y_bar_i.clone())).map_err(solve_failed(spec))?;
        let sigma2_between = between.rss / (n_entities - k - 1) as f64;

        let counts = sample.entity_counts();
        let t_bar = n_entities as f64 / counts.iter().map(|&c| 1.0 / c as f64).sum::<f64>();
        let sigma2_u = (sigma2_between - sigma2_e / t_bar).max(0.0);

        let theta: Vec<f64> = counts
            .iter()
            .map(|&t| {
                let denom = t as f64 * sigma2_u + sigma2_e;
                if denom > 0.0 {
                    1.0 - (sigma2_e / denom).sqrt()
                } else {
                    0.0
                }
            })
            .collect();
        let theta_min = theta.iter().copied().fold(f64::INFINITY, f64::min);
        let theta_max = theta.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        tracing::debug!(
            sigma2_e,
            sigma2_u,
            theta_min,
            theta_max,
            "random-effects variance components"
        );

        // -------------------------------------------------------------------------
        // Quasi-demeaned regression
        // -------------------------------------------------------------------------
        let (x, y) = if theta_min > 1.0 - THETA_ONE_TOL {
            (xw, yw)
        } else {
            quasi_demeaned_design(&sample, &theta, &y_bar_i, &x_bar_i)
        };
        let fit = fit_ols(&x, &y).map_err(solve_failed(spec))?;

        let dof = (n - x.ncols()) as f64;
        let cov = covariance_for(spec, &fit, &x, &sample.entity, dof);
        let (coefficients, covariance) = build_coefficients(&spec.roles(), &fit.coefficients, &cov, dof, inference);

        let total = sigma2_u + sigma2_e;
        let rho = if total > 0.0 { sigma2_u / total } else { 0.0 };

        Ok(EstimationResult {
            spec: spec.clone(),
            inference: *inference,
            coefficients,
            diagnostics: ModelDiagnostics {
                r_squared: fit.r_squared(),
                r_squared_kind: "quasi-demeaned",
                n_obs: n,
                n_entities,
                n_periods: sample.n_periods(),
                dof_resid: dof,
                entities_dropped: dropped,
                variance_components: Some(VarianceComponents {
                    sigma2_idiosyncratic: sigma2_e,
                    sigma2_entity: sigma2_u,
                    rho,
                    theta_min,
                    theta_max,
                }),
                entity_dummies: None,
            },
            covariance,
        })
    }
}

fn quasi_demeaned_design(
    sample: &Sample,
    theta: &[f64],
    y_bar_i: &[f64],
    x_bar_i: &[f64],
) -> (Array2<f64>, Array1<f64>) {
    let n = sample.len();
    let y = Array1::from_shape_fn(n, |i| {
        let e = sample.entity[i];
        sample.y[i] - theta[e] * y_bar_i[e]
    });
    let x = Array2::from_shape_fn((n, 2), |(i, j)| {
        let e = sample.entity[i];
        match j {
            0 => 1.0 - theta[e],
            _ => sample.x[i] - theta[e] * x_bar_i[e],
        }
    });
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::estimators::tests::planted_panel;
    use crate::estimators::{run_estimator, FixedEffects};
    use crate::ingest::RawRecord;
    use crate::panel::{build_panel, PanelConfig};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_recovers_planted_slope() {
        let panel = planted_panel(&[]);
        let spec = ModelSpecification::default_for(EstimatorKind::RandomEffects);
        let result = run_estimator(&panel, &spec).unwrap();

        let slope = result.coefficient_of_interest().unwrap();
        assert_abs_diff_eq!(slope.estimate, 2.0, epsilon = 1e-6);

        let vc = result.diagnostics.variance_components.as_ref().unwrap();
        assert_abs_diff_eq!(vc.sigma2_idiosyncratic, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vc.theta_min, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_noisy_fit_lies_near_fixed_effects() {
        let panel = planted_panel(&[0.03, -0.02, 0.01, -0.04, 0.02, 0.0, 0.015]);
        let spec = ModelSpecification::default_for(EstimatorKind::RandomEffects);
        let re = run_estimator(&panel, &spec).unwrap();
        let fe = FixedEffects
            .fit(&panel, &ModelSpecification::default_for(EstimatorKind::FixedEffects), &InferenceConfig::default())
            .unwrap();

        let vc = re.diagnostics.variance_components.as_ref().unwrap();
        assert!(vc.sigma2_idiosyncratic > 0.0);
        assert!((0.0..=1.0).contains(&vc.rho));
        assert!(vc.theta_min >= 0.0 && vc.theta_max < 1.0);

        let b_re = re.coefficient_of_interest().unwrap().estimate;
        let b_fe = fe.coefficient_of_interest().unwrap().estimate;
        assert_abs_diff_eq!(b_re, b_fe, epsilon = 0.2);
        assert!(re.coefficient_of_interest().unwrap().std_error > 0.0);
    }

    #[test]
    fn test_default_pvalues_use_the_normal() {
        use crate::inference::{pvalue_z, ReferenceDistribution};

        let panel = planted_panel(&[0.3, -0.25, 0.1, -0.4, 0.2, 0.05, -0.15]);
        let spec = ModelSpecification::default_for(EstimatorKind::RandomEffects);
        let result = run_estimator(&panel, &spec).unwrap();
        assert_eq!(result.inference.distribution, Some(ReferenceDistribution::Normal));
        for c in &result.coefficients {
            assert_abs_diff_eq!(c.p_value, pvalue_z(c.statistic), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_needs_three_entities() {
        let mut rows = Vec::new();
        for (name, shift) in [("A", 0.0), ("B", 50.0)] {
            for t in 0..5 {
                let b = 100.0 + shift + 7.0 * t as f64;
                rows.push(RawRecord::new(name, 2014 + t, b, 3.0 + 0.01 * b));
            }
        }
        let panel = build_panel(&rows, &PanelConfig::default());
        let spec = ModelSpecification::default_for(EstimatorKind::RandomEffects);

        match run_estimator(&panel, &spec) {
            Err(MonitorError::InsufficientEntities { needed: 3, found: 2 }) => {}
            other => panic!("expected InsufficientEntities, got {other:?}"),
        }
    }

    #[test]
    fn test_theta_zero_without_entity_variance() {
        // Entity means lie exactly on the line: no entity effect, θ collapses to 0
        let mut rows = Vec::new();
        let noise = [0.02, -0.01, 0.0, 0.015, -0.02];
        for (name, shift) in [("A", 0.0), ("B", 35.0), ("C", 80.0)] {
            for t in 0..5 {
                let b = 100.0 + shift + 10.0 * t as f64;
                rows.push(RawRecord::new(name, 2014 + t, b, 1.0 + 0.01 * b + noise[t as usize]));
            }
        }
        let panel = build_panel(&rows, &PanelConfig::default());
        let spec = ModelSpecification::default_for(EstimatorKind::RandomEffects)
            .with_outcome(crate::spec::Outcome::Igc)
            .with_budget(crate::spec::BudgetTerm::Budget);
        let result = run_estimator(&panel, &spec).unwrap();

        let vc = result.diagnostics.variance_components.as_ref().unwrap();
        assert_abs_diff_eq!(vc.sigma2_entity, 0.0);
        assert_abs_diff_eq!(vc.theta_max, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.coefficient_of_interest().unwrap().estimate, 0.01, epsilon = 1e-3);
    }
}
