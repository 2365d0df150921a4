// =============================================================================
// Statistical Inference
// =============================================================================
//
// P-values, confidence intervals and significance classes for the panel
// models.
//
// WHICH DISTRIBUTION?
// -------------------
// Each estimator has its own default, following the panel packages the
// analysis was first run with:
//
//   FE    Student-t with the residual dof (n - N - k), the "debiased" default
//   RE    standard normal
//   DiD   standard normal (clustered OLS)
//
// Asking for Student-t explicitly applies it to every model. With ten
// universities it is noticeably more conservative than the normal.
//
// =============================================================================

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

use crate::spec::EstimatorKind;

/// Reference distribution for test statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDistribution {
    #[default]
    Normal,
    StudentT,
}

impl ReferenceDistribution {
    /// Default reference distribution of an estimator.
    pub fn default_for(kind: EstimatorKind) -> Self {
        match kind {
            EstimatorKind::FixedEffects => ReferenceDistribution::StudentT,
            EstimatorKind::RandomEffects | EstimatorKind::DifferenceInDifferences => ReferenceDistribution::Normal,
        }
    }
}

/// Inference settings shared by all estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// `None` uses each estimator's default (see [`ReferenceDistribution::default_for`]).
    pub distribution: Option<ReferenceDistribution>,
    /// Confidence level for the reported intervals.
    pub confidence: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            distribution: None,
            confidence: 0.95,
        }
    }
}

impl InferenceConfig {
    /// Settings with the distribution pinned for one estimator.
    pub fn resolved_for(&self, kind: EstimatorKind) -> Self {
        Self {
            distribution: Some(self.distribution.unwrap_or_else(|| ReferenceDistribution::default_for(kind))),
            ..*self
        }
    }

    /// Distribution in effect; unresolved settings fall back to the normal.
    pub fn reference(&self) -> ReferenceDistribution {
        self.distribution.unwrap_or_default()
    }

    /// Two-sided p-value for a test statistic.
    pub fn pvalue(&self, stat: f64, df: f64) -> f64 {
        match self.reference() {
            ReferenceDistribution::Normal => pvalue_z(stat),
            ReferenceDistribution::StudentT => pvalue_t(stat, df),
        }
    }

    /// Confidence interval around an estimate.
    pub fn interval(&self, estimate: f64, std_error: f64, df: f64) -> (f64, f64) {
        match self.reference() {
            ReferenceDistribution::Normal => confidence_interval_z(estimate, std_error, self.confidence),
            ReferenceDistribution::StudentT => {
                confidence_interval_t(estimate, std_error, df, self.confidence)
            }
        }
    }
}

// =============================================================================
// P-Value Calculation
// =============================================================================

/// Two-tailed p-value from a z-statistic.
///
/// Non-finite statistics give NaN (e.g. a zero standard error on a perfect
/// fit), which the interpretation layer reports as "indeterminate".
pub fn pvalue_z(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * (1.0 - normal.cdf(z.abs())),
        Err(_) => f64::NAN,
    }
}

/// Two-tailed p-value from a t-statistic with `df` degrees of freedom.
pub fn pvalue_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() || !(df > 0.0) {
        return f64::NAN;
    }
    if df > 1000.0 {
        return pvalue_z(t);
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Upper-tail p-value of a χ² statistic (used by the Hausman test).
pub fn pvalue_chi2(stat: f64, df: f64) -> f64 {
    if !stat.is_finite() || stat < 0.0 || !(df > 0.0) {
        return f64::NAN;
    }
    match ChiSquared::new(df) {
        Ok(dist) => 1.0 - dist.cdf(stat),
        Err(_) => f64::NAN,
    }
}

// =============================================================================
// Confidence Intervals
// =============================================================================

/// Confidence interval using the normal distribution.
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error < 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let normal = match Normal::new(0.0, 1.0) {
        Ok(n) => n,
        Err(_) => return (f64::NAN, f64::NAN),
    };
    let alpha = 1.0 - confidence;
    let margin = normal.inverse_cdf(1.0 - alpha / 2.0) * std_error;
    (estimate - margin, estimate + margin)
}

/// Confidence interval using Student's t-distribution.
pub fn confidence_interval_t(estimate: f64, std_error: f64, df: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error < 0.0 || !(df > 0.0) {
        return (f64::NAN, f64::NAN);
    }
    if df > 1000.0 {
        return confidence_interval_z(estimate, std_error, confidence);
    }
    let dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d,
        Err(_) => return (f64::NAN, f64::NAN),
    };
    let alpha = 1.0 - confidence;
    let margin = dist.inverse_cdf(1.0 - alpha / 2.0) * std_error;
    (estimate - margin, estimate + margin)
}

// =============================================================================
// Significance Stars (for summary tables)
// =============================================================================

/// "***" p < 0.01, "**" p < 0.05, "*" p < 0.10, "" otherwise.
///
/// Thresholds match the significance classes used in the interpretation
/// notes, so a starred row always reads as at least "weakly significant".
pub fn significance_stars(pvalue: f64) -> &'static str {
    if pvalue.is_nan() {
        "?"
    } else if pvalue < 0.01 {
        "***"
    } else if pvalue < 0.05 {
        "**"
    } else if pvalue < 0.10 {
        "*"
    } else {
        ""
    }
}
