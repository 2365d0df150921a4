// =============================================================================
// Model Estimators
// =============================================================================
//
// Three interchangeable panel estimators behind one trait:
//
//   - FixedEffects:            within-entity demeaning
//   - RandomEffects:           Swamy–Arora quasi-demeaning (feasible GLS)
//   - DifferenceInDifferences: before/after the policy year, entity dummies
//
// All three take the same inputs (panel + specification + inference settings)
// and return the same EstimationResult, with coefficients in a fixed,
// documented order:
//
//     FE / RE   [const, <budget>]
//     DiD       [const, <budget>, post_policy, interaction]
//
// Each coefficient carries its VariableRole, so downstream code looks them up
// by role and never by position or name.
//
// FAILURE MODES
// -------------
//   - too few rows / institutions    → InsufficientData / InsufficientEntities
//   - collinear or non-finite design → EstimationFailed (carries the model specification)
// Nothing is ever silently replaced by a different model.
//
// =============================================================================

mod did;
mod fixed_effects;
mod hausman;
mod random_effects;
mod sample;

use std::fmt;

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::error::{MonitorError, Result};
use crate::inference::{significance_stars, InferenceConfig, ReferenceDistribution};
use crate::panel::PanelDataset;
use crate::solvers::{standard_errors, OlsFit};
use crate::spec::{CovarianceKind, EstimatorKind, ModelSpecification, VariableRole};

pub use did::DifferenceInDifferences;
pub use fixed_effects::FixedEffects;
pub use hausman::{hausman, HausmanTest};
pub use random_effects::RandomEffects;

/// A panel estimator.
pub trait Estimator {
    fn kind(&self) -> EstimatorKind;

    fn fit(
        &self,
        panel: &PanelDataset,
        spec: &ModelSpecification,
        inference: &InferenceConfig,
    ) -> Result<EstimationResult>;
}

/// The estimator implementing a given kind.
pub fn estimator_for(kind: EstimatorKind) -> &'static dyn Estimator {
    match kind {
        EstimatorKind::FixedEffects => &FixedEffects,
        EstimatorKind::RandomEffects => &RandomEffects,
        EstimatorKind::DifferenceInDifferences => &DifferenceInDifferences,
    }
}

/// Run the estimator named by `spec` with default inference settings.
pub fn run_estimator(panel: &PanelDataset, spec: &ModelSpecification) -> Result<EstimationResult> {
    run_estimator_with(panel, spec, &InferenceConfig::default())
}

/// Run the estimator named by `spec`.
pub fn run_estimator_with(
    panel: &PanelDataset,
    spec: &ModelSpecification,
    inference: &InferenceConfig,
) -> Result<EstimationResult> {
    let estimator = estimator_for(spec.estimator);
    let result = estimator.fit(panel, spec, inference)?;
    tracing::debug!(
        spec = %spec,
        n_obs = result.diagnostics.n_obs,
        r_squared = result.diagnostics.r_squared,
        "model fitted"
    );
    Ok(result)
}

// =============================================================================
// Result Types
// =============================================================================

/// One reported coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub role: VariableRole,
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// z or t statistic, depending on the reference distribution.
    pub statistic: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Random-effects variance components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceComponents {
    /// σ²ₑ, idiosyncratic variance.
    pub sigma2_idiosyncratic: f64,
    /// σ²ᵤ, entity-effect variance.
    pub sigma2_entity: f64,
    /// Share of the variance due to the entity effect, σ²ᵤ / (σ²ᵤ + σ²ₑ).
    pub rho: f64,
    pub theta_min: f64,
    pub theta_max: f64,
}

/// Model-level diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDiagnostics {
    pub r_squared: f64,
    /// Which R² this is ("within", "quasi-demeaned", "full").
    pub r_squared_kind: &'static str,
    pub n_obs: usize,
    pub n_entities: usize,
    pub n_periods: usize,
    pub dof_resid: f64,
    /// Entities dropped for having fewer than two usable periods.
    pub entities_dropped: usize,
    pub variance_components: Option<VarianceComponents>,
    /// Number of entity dummies absorbed (DiD only).
    pub entity_dummies: Option<usize>,
}

/// Output of an estimator. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct EstimationResult {
    pub spec: ModelSpecification,
    pub inference: InferenceConfig,
    pub coefficients: Vec<Coefficient>,
    pub diagnostics: ModelDiagnostics,
    /// Covariance of the reported coefficients, in coefficient order.
    #[serde(skip)]
    pub covariance: Array2<f64>,
}

impl EstimationResult {
    /// Look up a coefficient by role.
    pub fn coefficient(&self, role: VariableRole) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.role == role)
    }

    /// The coefficient the automatic conclusion talks about.
    pub fn coefficient_of_interest(&self) -> Option<&Coefficient> {
        self.coefficient(self.spec.role_of_interest())
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Covariance of a fit according to its `CovarianceKind`.
pub(crate) fn covariance_for(
    spec: &ModelSpecification,
    fit: &OlsFit,
    x: &Array2<f64>,
    entity: &[usize],
    dof: f64,
) -> Array2<f64> {
    match spec.covariance {
        CovarianceKind::Unadjusted => fit.covariance_unadjusted(dof),
        CovarianceKind::ClusteredByEntity => fit.covariance_clustered(x, entity),
    }
}

/// Build the reported coefficients from the leading entries of β and V.
pub(crate) fn build_coefficients(
    roles: &[VariableRole],
    beta: &Array1<f64>,
    cov: &Array2<f64>,
    dof: f64,
    inference: &InferenceConfig,
) -> (Vec<Coefficient>, Array2<f64>) {
    let k = roles.len();
    let se = standard_errors(cov);

    let coefficients = roles
        .iter()
        .enumerate()
        .map(|(j, &role)| {
            let estimate = beta[j];
            let std_error = se[j];
            let statistic = if std_error > 0.0 { estimate / std_error } else { f64::NAN };
            let p_value = inference.pvalue(statistic, dof);
            let (ci_lower, ci_upper) = inference.interval(estimate, std_error, dof);
            Coefficient {
                role,
                name: role.name().to_string(),
                estimate,
                std_error,
                statistic,
                p_value,
                ci_lower,
                ci_upper,
            }
        })
        .collect();

    let reported_cov = Array2::from_shape_fn((k, k), |(a, b)| cov[[a, b]]);
    (coefficients, reported_cov)
}

/// Turn a solver failure into an EstimationFailed for this spec.
pub(crate) fn solve_failed(spec: &ModelSpecification) -> impl Fn(crate::solvers::SolveError) -> MonitorError + '_ {
    move |e| MonitorError::estimation_failed(spec, e.to_string())
}

// =============================================================================
// Summary Table
// =============================================================================

impl fmt::Display for EstimationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(78);
        let thin = "-".repeat(78);
        let d = &self.diagnostics;
        let stat_label = match self.inference.reference() {
            ReferenceDistribution::Normal => ("z", "P>|z|"),
            ReferenceDistribution::StudentT => ("t", "P>|t|"),
        };
        let cov_label = match self.spec.covariance {
            CovarianceKind::Unadjusted => "unadjusted",
            CovarianceKind::ClusteredByEntity => "clustered (entity)",
        };

        writeln!(f, "{rule}")?;
        writeln!(f, " {}", self.spec.estimator.label())?;
        writeln!(f, " {}", self.spec)?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            " {:<22}{:>12}   {:<22}{:>12.4}",
            "No. observations:",
            d.n_obs,
            format!("R² ({}):", d.r_squared_kind),
            d.r_squared
        )?;
        writeln!(
            f,
            " {:<22}{:>12}   {:<22}{:>12}",
            "Entities:", d.n_entities, "Periods:", d.n_periods
        )?;
        writeln!(
            f,
            " {:<22}{:>12.0}   {:<22}{:>12}",
            "Residual dof:", d.dof_resid, "Covariance:", cov_label
        )?;
        if d.entities_dropped > 0 {
            writeln!(f, " {:<22}{:>12}", "Entities dropped:", d.entities_dropped)?;
        }
        if let Some(dummies) = d.entity_dummies {
            writeln!(f, " {:<22}{:>12}", "Entity dummies:", dummies)?;
        }
        if let Some(vc) = &d.variance_components {
            writeln!(
                f,
                " {:<22}{:>12.6}   {:<22}{:>12.6}",
                "σ²(idiosyncratic):", vc.sigma2_idiosyncratic, "σ²(entity):", vc.sigma2_entity
            )?;
            writeln!(
                f,
                " {:<22}{:>12.4}   {:<22}{:>5.3}–{:<6.3}",
                "rho:", vc.rho, "theta:", vc.theta_min, vc.theta_max
            )?;
        }
        writeln!(f, "{thin}")?;
        writeln!(
            f,
            " {:<14}{:>11}{:>11}{:>9}{:>9}{:>11}{:>11}",
            "", "coef", "std err", stat_label.0, stat_label.1, "[0.025", "0.975]"
        )?;
        writeln!(f, "{thin}")?;
        for c in &self.coefficients {
            writeln!(
                f,
                " {:<14}{:>11.4}{:>11.4}{:>9.3}{:>9.4}{:>11.4}{:>11.4} {}",
                c.name,
                c.estimate,
                c.std_error,
                c.statistic,
                c.p_value,
                c.ci_lower,
                c.ci_upper,
                significance_stars(c.p_value)
            )?;
        }
        writeln!(f, "{rule}")?;
        write!(f, " *** p<0.01, ** p<0.05, * p<0.10")
    }
}
