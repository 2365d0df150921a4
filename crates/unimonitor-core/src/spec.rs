// =============================================================================
// Model Specifications
// =============================================================================
//
// A ModelSpecification says WHICH estimator to run and on WHICH variables:
//
//     outcome ~ budget_term [+ post_policy + budget_term:post_policy]
//
// The published analysis regressed ln(IGC) on ln(budget). Those are the
// defaults here; the lagged variants exist because the IGC reacts to funding
// with a delay (the index is built from a triennial exam).
//
// Coefficients are identified by a VariableRole, not by their display name,
// so the interpretation layer can't silently miss a renamed column.
//
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Which panel estimator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    FixedEffects,
    RandomEffects,
    DifferenceInDifferences,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 3] = [
        EstimatorKind::FixedEffects,
        EstimatorKind::RandomEffects,
        EstimatorKind::DifferenceInDifferences,
    ];

    /// Short code used in URLs and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            EstimatorKind::FixedEffects => "fe",
            EstimatorKind::RandomEffects => "re",
            EstimatorKind::DifferenceInDifferences => "did",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EstimatorKind::FixedEffects => "Fixed Effects (FE)",
            EstimatorKind::RandomEffects => "Random Effects (RE)",
            EstimatorKind::DifferenceInDifferences => "Difference-in-Differences (structural break)",
        }
    }
}

impl FromStr for EstimatorKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fe" | "fixed" | "fixed_effects" => Ok(EstimatorKind::FixedEffects),
            "re" | "random" | "random_effects" => Ok(EstimatorKind::RandomEffects),
            "did" | "difference_in_differences" => Ok(EstimatorKind::DifferenceInDifferences),
            other => Err(MonitorError::UnsupportedSpecification(format!(
                "unknown estimator '{other}' (expected fe, re or did)"
            ))),
        }
    }
}

/// Dependent variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Igc,
    LogIgc,
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Igc => "igc",
            Outcome::LogIgc => "ln_igc",
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Outcome::LogIgc)
    }
}

impl FromStr for Outcome {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "igc" => Ok(Outcome::Igc),
            "ln_igc" | "log_igc" => Ok(Outcome::LogIgc),
            other => Err(MonitorError::UnsupportedSpecification(format!(
                "unknown outcome '{other}' (expected igc or ln_igc)"
            ))),
        }
    }
}

/// The funding regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTerm {
    Budget,
    LogBudget,
    LaggedBudget,
    LogLaggedBudget,
}

impl BudgetTerm {
    pub fn name(&self) -> &'static str {
        match self {
            BudgetTerm::Budget => "budget",
            BudgetTerm::LogBudget => "ln_budget",
            BudgetTerm::LaggedBudget => "lag_budget",
            BudgetTerm::LogLaggedBudget => "ln_lag_budget",
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, BudgetTerm::LogBudget | BudgetTerm::LogLaggedBudget)
    }

    pub fn is_lagged(&self) -> bool {
        matches!(self, BudgetTerm::LaggedBudget | BudgetTerm::LogLaggedBudget)
    }
}

impl FromStr for BudgetTerm {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "budget" => Ok(BudgetTerm::Budget),
            "ln_budget" | "log_budget" => Ok(BudgetTerm::LogBudget),
            "lag_budget" | "lagged_budget" => Ok(BudgetTerm::LaggedBudget),
            "ln_lag_budget" | "log_lagged_budget" => Ok(BudgetTerm::LogLaggedBudget),
            other => Err(MonitorError::UnsupportedSpecification(format!(
                "unknown budget term '{other}'"
            ))),
        }
    }
}

/// Covariance estimator for the standard errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceKind {
    /// σ²(X'X)⁻¹
    Unadjusted,
    /// Liang–Zeger sandwich, clustered by institution.
    ClusteredByEntity,
}

impl FromStr for CovarianceKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unadjusted" | "ols" => Ok(CovarianceKind::Unadjusted),
            "clustered" | "cluster" => Ok(CovarianceKind::ClusteredByEntity),
            other => Err(MonitorError::UnsupportedSpecification(format!(
                "unknown covariance '{other}' (expected unadjusted or clustered)"
            ))),
        }
    }
}

/// Role of a reported coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "term", rename_all = "snake_case")]
pub enum VariableRole {
    Intercept,
    Budget(BudgetTerm),
    PostPolicy,
    /// Budget term × post-policy indicator.
    Interaction(BudgetTerm),
}

impl VariableRole {
    /// Stable display name.
    pub fn name(&self) -> &'static str {
        match self {
            VariableRole::Intercept => "const",
            VariableRole::Budget(term) => term.name(),
            VariableRole::PostPolicy => "post_policy",
            VariableRole::Interaction(_) => "interaction",
        }
    }
}

/// Everything needed to run one estimator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpecification {
    pub estimator: EstimatorKind,
    pub outcome: Outcome,
    pub budget: BudgetTerm,
    pub covariance: CovarianceKind,
}

impl ModelSpecification {
    /// Default model for each estimator:
    /// log-log, unadjusted SEs for the panel models, clustered SEs for DiD.
    pub fn default_for(estimator: EstimatorKind) -> Self {
        let covariance = match estimator {
            EstimatorKind::DifferenceInDifferences => CovarianceKind::ClusteredByEntity,
            _ => CovarianceKind::Unadjusted,
        };
        Self {
            estimator,
            outcome: Outcome::LogIgc,
            budget: BudgetTerm::LogBudget,
            covariance,
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_budget(mut self, budget: BudgetTerm) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_covariance(mut self, covariance: CovarianceKind) -> Self {
        self.covariance = covariance;
        self
    }

    /// Reported coefficient roles, in output order.
    pub fn roles(&self) -> Vec<VariableRole> {
        match self.estimator {
            EstimatorKind::FixedEffects | EstimatorKind::RandomEffects => {
                vec![VariableRole::Intercept, VariableRole::Budget(self.budget)]
            }
            EstimatorKind::DifferenceInDifferences => vec![
                VariableRole::Intercept,
                VariableRole::Budget(self.budget),
                VariableRole::PostPolicy,
                VariableRole::Interaction(self.budget),
            ],
        }
    }

    /// The coefficient the automatic conclusion is about.
    pub fn role_of_interest(&self) -> VariableRole {
        match self.estimator {
            EstimatorKind::DifferenceInDifferences => VariableRole::Interaction(self.budget),
            _ => VariableRole::Budget(self.budget),
        }
    }
}

impl fmt::Display for ModelSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rhs = match self.estimator {
            EstimatorKind::DifferenceInDifferences => format!(
                "{b} + post_policy + {b}:post_policy + C(institution)",
                b = self.budget.name()
            ),
            _ => self.budget.name().to_string(),
        };
        write!(f, "{} [{} ~ {}]", self.estimator.code(), self.outcome.name(), rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_log_log() {
        let fe = ModelSpecification::default_for(EstimatorKind::FixedEffects);
        assert_eq!(fe.outcome, Outcome::LogIgc);
        assert_eq!(fe.budget, BudgetTerm::LogBudget);
        assert_eq!(fe.covariance, CovarianceKind::Unadjusted);

        let did = ModelSpecification::default_for(EstimatorKind::DifferenceInDifferences);
        assert_eq!(did.covariance, CovarianceKind::ClusteredByEntity);
        assert_eq!(did.role_of_interest(), VariableRole::Interaction(BudgetTerm::LogBudget));
    }

    #[test]
    fn test_roles_are_stable() {
        let did = ModelSpecification::default_for(EstimatorKind::DifferenceInDifferences);
        let names: Vec<&str> = did.roles().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["const", "ln_budget", "post_policy", "interaction"]);

        let re = ModelSpecification::default_for(EstimatorKind::RandomEffects)
            .with_budget(BudgetTerm::LaggedBudget);
        let names: Vec<&str> = re.roles().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["const", "lag_budget"]);
    }

    #[test]
    fn test_parse_estimator() {
        assert_eq!("FE".parse::<EstimatorKind>().unwrap(), EstimatorKind::FixedEffects);
        assert_eq!("did".parse::<EstimatorKind>().unwrap(), EstimatorKind::DifferenceInDifferences);
        assert!(matches!(
            "ols".parse::<EstimatorKind>(),
            Err(MonitorError::UnsupportedSpecification(_))
        ));
    }

    #[test]
    fn test_display() {
        let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects);
        assert_eq!(spec.to_string(), "fe [ln_igc ~ ln_budget]");
    }
}
