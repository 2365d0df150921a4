// =============================================================================
// Interpretation
// =============================================================================
//
// Turns an EstimationResult into plain-language notes:
//
//   - interpret(): one note per reported coefficient (direction, significance
//     class, templated sentence)
//   - conclude():  the hypothesis-test verdict on the coefficient of interest
//     (the budget slope for FE/RE, the interaction for DiD) with the magnitude
//     or the IGC-inertia caveat, and the standing methodological limitations
//
// Templates are chosen by VariableRole and by whether the outcome and budget
// term are in logs. Nothing here matches on coefficient names.
//
// SIGNIFICANCE CLASSES
// --------------------
//     p < 0.01   highly significant
//     p < 0.05   significant
//     p < 0.10   weakly significant
//     otherwise  not significant
//     NaN        indeterminate (e.g. zero standard error on a perfect fit)
//
// =============================================================================

use std::fmt;

use serde::Serialize;

use crate::estimators::EstimationResult;
use crate::spec::{BudgetTerm, EstimatorKind, Outcome, VariableRole};

/// Level at which the conclusion rejects H0.
pub const CONCLUSION_LEVEL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    HighlySignificant,
    Significant,
    WeaklySignificant,
    NotSignificant,
    Indeterminate,
}

impl Significance {
    pub fn from_pvalue(p: f64) -> Self {
        if p.is_nan() {
            Significance::Indeterminate
        } else if p < 0.01 {
            Significance::HighlySignificant
        } else if p < 0.05 {
            Significance::Significant
        } else if p < 0.10 {
            Significance::WeaklySignificant
        } else {
            Significance::NotSignificant
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Significance::HighlySignificant => "highly significant",
            Significance::Significant => "significant",
            Significance::WeaklySignificant => "weakly significant",
            Significance::NotSignificant => "not significant",
            Significance::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
    Zero,
    Indeterminate,
}

impl Direction {
    pub fn of(estimate: f64) -> Self {
        if !estimate.is_finite() {
            Direction::Indeterminate
        } else if estimate > 0.0 {
            Direction::Positive
        } else if estimate < 0.0 {
            Direction::Negative
        } else {
            Direction::Zero
        }
    }
}

/// A human-readable note about one coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpretationNote {
    pub role: VariableRole,
    pub variable: String,
    pub direction: Direction,
    pub significance: Significance,
    pub sentence: String,
}

/// One note per reported coefficient, in coefficient order.
pub fn interpret(result: &EstimationResult) -> Vec<InterpretationNote> {
    let outcome = result.spec.outcome;
    let pre_slope = result
        .coefficients
        .iter()
        .find(|c| matches!(c.role, VariableRole::Budget(_)))
        .map(|c| c.estimate);
    result
        .coefficients
        .iter()
        .map(|c| {
            let direction = Direction::of(c.estimate);
            let significance = Significance::from_pvalue(c.p_value);
            let body = match c.role {
                VariableRole::Intercept => intercept_sentence(outcome, c.estimate),
                VariableRole::Budget(term) => budget_sentence(outcome, term, c.estimate),
                VariableRole::PostPolicy => post_policy_sentence(outcome, direction, c.estimate),
                VariableRole::Interaction(term) => interaction_sentence(outcome, term, pre_slope, c.estimate),
            };
            let sentence = format!("{body} ({significance}, p = {}).", format_pvalue(c.p_value));
            InterpretationNote {
                role: c.role,
                variable: c.name.clone(),
                direction,
                significance,
                sentence,
            }
        })
        .collect()
}

fn format_pvalue(p: f64) -> String {
    if p.is_nan() {
        "n/a".to_string()
    } else {
        format!("{p:.4}")
    }
}

fn outcome_phrase(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Igc => "the IGC",
        Outcome::LogIgc => "log IGC",
    }
}

fn budget_phrase(term: BudgetTerm) -> &'static str {
    match term {
        BudgetTerm::Budget | BudgetTerm::LogBudget => "the budget",
        BudgetTerm::LaggedBudget | BudgetTerm::LogLaggedBudget => "the previous year's budget",
    }
}

fn intercept_sentence(outcome: Outcome, estimate: f64) -> String {
    format!(
        "The constant places {} at {estimate:.4} when the budget term is zero; it anchors the fit and has no policy reading",
        outcome_phrase(outcome)
    )
}

/// Effect of the budget term on the IGC, worded by transformation.
fn budget_effect(outcome: Outcome, term: BudgetTerm, estimate: f64) -> String {
    let budget = budget_phrase(term);
    match (outcome.is_log(), term.is_log()) {
        (true, true) => format!(
            "a 1% change in {budget} is associated with a {estimate:.4}% change in the IGC (elasticity)"
        ),
        (true, false) => format!(
            "one additional currency unit of {budget} is associated with a {:.6}% change in the IGC",
            100.0 * estimate
        ),
        (false, true) => format!(
            "a 1% change in {budget} is associated with a change of {:.6} points in the IGC",
            estimate / 100.0
        ),
        (false, false) => format!(
            "one additional currency unit of {budget} is associated with a change of {estimate:.6e} points in the IGC"
        ),
    }
}

fn budget_sentence(outcome: Outcome, term: BudgetTerm, estimate: f64) -> String {
    let effect = budget_effect(outcome, term, estimate);
    let mut chars = effect.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => effect,
    }
}

fn post_policy_sentence(outcome: Outcome, direction: Direction, estimate: f64) -> String {
    let moved = match direction {
        Direction::Positive => "higher",
        Direction::Negative => "lower",
        Direction::Zero => "unchanged",
        Direction::Indeterminate => "of undetermined level",
    };
    format!(
        "From the spending-cap year on, {} is {moved} by {:.4} for a given budget",
        outcome_phrase(outcome),
        estimate.abs()
    )
}

/// Wording compares the slope's magnitude before (β) and after (β + δ) the
/// cap, so a positive δ on a negative β reads as a weaker relationship.
fn interaction_sentence(outcome: Outcome, term: BudgetTerm, pre_slope: Option<f64>, estimate: f64) -> String {
    let effect = format!("the effect of {} on {}", budget_phrase(term), outcome_phrase(outcome));
    let Some(before) = pre_slope.filter(|b| b.is_finite() && estimate.is_finite()) else {
        let change = match Direction::of(estimate) {
            Direction::Positive => "the slope increased",
            Direction::Negative => "the slope decreased",
            Direction::Zero => "the slope did not change",
            Direction::Indeterminate => "the slope changed by an undetermined amount",
        };
        return format!("After the spending cap {change} (slope change {estimate:+.4})");
    };

    let after = before + estimate;
    let change = if before * after < 0.0 {
        "reversed direction"
    } else if after.abs() > before.abs() {
        "became stronger"
    } else if after.abs() < before.abs() {
        "became weaker"
    } else {
        "did not change"
    };
    format!(
        "After the spending cap {effect} {change} (slope {before:+.4} before, {after:+.4} after; change {estimate:+.4})"
    )
}

// =============================================================================
// Conclusion
// =============================================================================

/// Standing limitations of the analysis, whatever the model says.
pub const LIMITATIONS: [&str; 3] = [
    "The IGC is built on ENADE, which each course takes only every three years, so the index is rigid.",
    "The models do not capture management efficiency (doing more with less).",
    "External shocks such as the 2020 pandemic add noise to the data.",
];

/// Extra limitation for the before/after estimator.
pub const NO_CONTROL_GROUP: &str =
    "Every institution was exposed to the spending cap at once, so the DiD has no control group and is a structural-break comparison.";

/// Overall verdict on the coefficient of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conclusion {
    pub role: VariableRole,
    pub variable: String,
    pub estimate: f64,
    pub p_value: f64,
    /// Whether H0 (no effect) is rejected at the 5% level.
    pub rejects_null: bool,
    pub verdict: String,
    /// How large the effect is, when H0 is rejected.
    pub magnitude: Option<String>,
    /// Why no effect may show up, when H0 is not rejected.
    pub caveat: Option<String>,
    pub limitations: Vec<String>,
}

/// Verdict on the coefficient of interest at the 5% level.
pub fn conclude(result: &EstimationResult) -> Conclusion {
    let role = result.spec.role_of_interest();
    let (variable, estimate, p_value) = match result.coefficient(role) {
        Some(c) => (c.name.clone(), c.estimate, c.p_value),
        None => (role.name().to_string(), f64::NAN, f64::NAN),
    };
    let rejects_null = p_value < CONCLUSION_LEVEL;

    let (verdict, magnitude, caveat) = if rejects_null {
        let magnitude = match role {
            VariableRole::Interaction(term) => format!(
                "After the spending cap the slope of {} on {} changed by {estimate:+.4}.",
                budget_phrase(term),
                outcome_phrase(result.spec.outcome)
            ),
            VariableRole::Budget(term) => {
                format!("{}.", budget_sentence(result.spec.outcome, term, estimate))
            }
            _ => format!("The estimate is {estimate:.4}."),
        };
        (
            format!(
                "H0 is rejected at the 5% level (p = {}): there is statistical evidence that the budget affects quality.",
                format_pvalue(p_value)
            ),
            Some(magnitude),
            None,
        )
    } else if p_value.is_nan() {
        (
            "No verdict: the p-value is undefined for this fit (zero or undefined standard error).".to_string(),
            None,
            None,
        )
    } else {
        (
            format!(
                "H0 is not rejected at the 5% level (p = {}): no robust statistical evidence of an immediate effect.",
                format_pvalue(p_value)
            ),
            None,
            Some(
                "The IGC has inertia and reacts slowly to cuts; an effect may take years (a lag) to appear in the index."
                    .to_string(),
            ),
        )
    };

    let mut limitations: Vec<String> = LIMITATIONS.iter().map(|s| s.to_string()).collect();
    if result.spec.estimator == EstimatorKind::DifferenceInDifferences {
        limitations.push(NO_CONTROL_GROUP.to_string());
    }

    Conclusion {
        role,
        variable,
        estimate,
        p_value,
        rejects_null,
        verdict,
        magnitude,
        caveat,
        limitations,
    }
}
