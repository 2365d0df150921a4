// =============================================================================
// Difference-in-Differences (structural break at the policy year)
// =============================================================================
//
// All institutions are exposed to the policy at the same time, so there is no
// untreated control group. The "DiD" here is a before/after comparison of the
// budget → IGC relationship:
//
//     y_it = c + β x_it + γ post_t + δ (x_it · post_t) + Σ_j α_j D_ij + ε_it
//
// δ measures how the budget slope changed after the policy year. The entity
// dummies D_ij (one per institution except the first) absorb level
// differences between institutions; they are estimated but not reported as
// coefficients.
//
// Covariance defaults to cluster-robust by entity. Clustered inference uses
// G − 1 degrees of freedom, unadjusted inference n − p.
//
// =============================================================================

use ndarray::{Array1, Array2};

use super::sample::Sample;
use super::{build_coefficients, covariance_for, solve_failed, Estimator, EstimationResult, ModelDiagnostics};
use crate::error::{MonitorError, Result};
use crate::inference::InferenceConfig;
use crate::panel::PanelDataset;
use crate::solvers::fit_ols;
use crate::spec::{CovarianceKind, EstimatorKind, ModelSpecification};

/// Before/after policy estimator with entity dummies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceInDifferences;

impl Estimator for DifferenceInDifferences {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::DifferenceInDifferences
    }

    fn fit(
        &self,
        panel: &PanelDataset,
        spec: &ModelSpecification,
        inference: &InferenceConfig,
    ) -> Result<EstimationResult> {
        let inference = &inference.resolved_for(self.kind());
        let sample = Sample::select(panel, spec);

        let n_post = sample.post.iter().filter(|&&p| p > 0.5).count();
        let n_pre = sample.len() - n_post;
        if n_pre == 0 {
            return Err(MonitorError::insufficient_data("observations before the policy year", 1, 0));
        }
        if n_post == 0 {
            return Err(MonitorError::insufficient_data("observations from the policy year on", 1, 0));
        }

        let (x, y) = did_design(&sample);
        let (n, p) = x.dim();
        if n <= p {
            return Err(MonitorError::insufficient_data("difference-in-differences", p + 1, n));
        }

        let fit = fit_ols(&x, &y).map_err(solve_failed(spec))?;

        let dof = match spec.covariance {
            CovarianceKind::ClusteredByEntity => sample.n_entities.saturating_sub(1) as f64,
            CovarianceKind::Unadjusted => (n - p) as f64,
        };
        let cov = covariance_for(spec, &fit, &x, &sample.entity, (n - p) as f64);
        let (coefficients, covariance) = build_coefficients(&spec.roles(), &fit.coefficients, &cov, dof, inference);

        Ok(EstimationResult {
            spec: spec.clone(),
            inference: *inference,
            coefficients,
            diagnostics: ModelDiagnostics {
                r_squared: fit.r_squared(),
                r_squared_kind: "full",
                n_obs: n,
                n_entities: sample.n_entities,
                n_periods: sample.n_periods(),
                dof_resid: dof,
                entities_dropped: 0,
                variance_components: None,
                entity_dummies: Some(sample.n_entities.saturating_sub(1)),
            },
            covariance,
        })
    }
}

/// Design [1, x, post, x·post, D_1 .. D_{N−1}].
fn did_design(sample: &Sample) -> (Array2<f64>, Array1<f64>) {
    let n = sample.len();
    let p = 4 + sample.n_entities.saturating_sub(1);

    let x = Array2::from_shape_fn((n, p), |(i, j)| match j {
        0 => 1.0,
        1 => sample.x[i],
        2 => sample.post[i],
        3 => sample.x[i] * sample.post[i],
        d => {
            if sample.entity[i] == d - 3 {
                1.0
            } else {
                0.0
            }
        }
    });
    (x, Array1::from(sample.y.clone()))
}
