// =============================================================================
// Panel Dataset Builder
// =============================================================================
//
// Turns raw spreadsheet rows into a strongly-typed panel keyed by
// (institution, year), and computes every derived field the models need.
//
// PIPELINE
// --------
//   1. Validate each raw row (institution present, year in range, budget
//      present and non-negative, IGC non-negative if present).
//      Failing rows are excluded and counted, never fatal.
//   2. Deduplicate on (institution, year): the LAST row wins.
//   3. Fill IGC gaps per institution, in year order:
//        - gap between two known values → linear interpolation by year
//        - gap after the last known value → carry the last value forward
//        - gap before the first known value → row excluded
//      (The published IGC has holes: 2020 was never released and the most
//      recent year is usually missing when the data is collected.)
//   4. Derive: lagged budget, ln(budget), ln(IGC), ln(lagged budget),
//      budget in millions, post-policy indicator.
//
// The result is immutable. Rebuild it if the data changes.
//
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::ingest::RawRecord;
use crate::spec::{BudgetTerm, Outcome};

/// Year the spending cap (Teto de Gastos, EC 95/2016) took effect.
pub const POLICY_YEAR: i32 = 2017;

/// Configuration for building a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanelConfig {
    /// First supported year (inclusive).
    pub first_year: i32,
    /// Last supported year (inclusive).
    pub last_year: i32,
    /// Years >= this are "post-policy".
    pub policy_year: i32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            first_year: 2014,
            last_year: 2024,
            policy_year: POLICY_YEAR,
        }
    }
}

/// Post-policy indicator: 1 if `year >= policy_year`, else 0.
#[inline]
pub fn post_policy_indicator(year: i32, policy_year: i32) -> u8 {
    u8::from(year >= policy_year)
}

/// ln(x) for strictly positive x.
#[inline]
fn positive_ln(x: f64) -> Option<f64> {
    (x > 0.0 && x.is_finite()).then(|| x.ln())
}

/// One (institution, year) observation with all derived fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub institution: String,
    /// Dense index into `PanelDataset::institutions()`.
    pub entity: usize,
    pub year: i32,
    pub budget: f64,
    pub igc: f64,
    /// True when `igc` was interpolated or carried forward.
    pub igc_imputed: bool,
    pub lag_budget: Option<f64>,
    pub ln_budget: Option<f64>,
    pub ln_igc: Option<f64>,
    pub ln_lag_budget: Option<f64>,
    pub budget_millions: f64,
    pub post_policy: u8,
}

impl PanelRow {
    /// Value of the dependent variable, if defined for this row.
    pub fn outcome(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::Igc => Some(self.igc),
            Outcome::LogIgc => self.ln_igc,
        }
    }

    /// Value of the budget regressor, if defined for this row.
    pub fn budget_term(&self, term: BudgetTerm) -> Option<f64> {
        match term {
            BudgetTerm::Budget => Some(self.budget),
            BudgetTerm::LogBudget => self.ln_budget,
            BudgetTerm::LaggedBudget => self.lag_budget,
            BudgetTerm::LogLaggedBudget => self.ln_lag_budget,
        }
    }
}

/// Counts of rows excluded, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionCounts {
    pub missing_institution: usize,
    pub invalid_year: usize,
    pub invalid_budget: usize,
    pub invalid_igc: usize,
    /// Missing IGC with no earlier value to fill from.
    pub leading_igc_gap: usize,
}

impl ExclusionCounts {
    pub fn total(&self) -> usize {
        self.missing_institution
            + self.invalid_year
            + self.invalid_budget
            + self.invalid_igc
            + self.leading_igc_gap
    }
}

/// What happened while building the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub excluded: ExclusionCounts,
    /// Rows that replaced an earlier row with the same (institution, year).
    pub duplicates_replaced: usize,
    pub igc_interpolated: usize,
    pub igc_carried_forward: usize,
}

/// The validated panel.
#[derive(Debug, Clone, Serialize)]
pub struct PanelDataset {
    rows: Vec<PanelRow>,
    institutions: Vec<String>,
    years: Vec<i32>,
    config: PanelConfig,
    report: BuildReport,
}

impl PanelDataset {
    /// Rows ordered by (institution, year).
    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    /// Institutions with at least one kept row, sorted.
    pub fn institutions(&self) -> &[String] {
        &self.institutions
    }

    /// Distinct years present, sorted.
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows belonging to one institution, in year order.
    pub fn rows_for<'a>(&'a self, institution: &'a str) -> impl Iterator<Item = &'a PanelRow> + 'a {
        self.rows.iter().filter(move |r| r.institution == institution)
    }

    pub fn get(&self, institution: &str, year: i32) -> Option<&PanelRow> {
        self.rows
            .iter()
            .find(|r| r.institution == institution && r.year == year)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    budget: f64,
    igc: Option<f64>,
}

/// Build a panel from raw rows.
pub fn build_panel(raw_rows: &[RawRecord], config: &PanelConfig) -> PanelDataset {
    let mut report = BuildReport {
        rows_read: raw_rows.len(),
        ..Default::default()
    };

    // -------------------------------------------------------------------------
    // Steps 1-2: validate and deduplicate (last one wins)
    // -------------------------------------------------------------------------
    let mut by_key: BTreeMap<(String, i32), Candidate> = BTreeMap::new();

    for raw in raw_rows {
        let institution = match raw.institution.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                tracing::debug!(line = raw.line, "excluded: missing institution");
                report.excluded.missing_institution += 1;
                continue;
            }
        };

        let year = match raw.year {
            Some(y) if (config.first_year..=config.last_year).contains(&y) => y,
            other => {
                tracing::debug!(line = raw.line, year = ?other, "excluded: year missing or out of range");
                report.excluded.invalid_year += 1;
                continue;
            }
        };

        let budget = match raw.budget {
            Some(b) if b >= 0.0 && b.is_finite() => b,
            other => {
                tracing::debug!(line = raw.line, budget = ?other, "excluded: budget missing or negative");
                report.excluded.invalid_budget += 1;
                continue;
            }
        };

        if let Some(igc) = raw.igc {
            if igc < 0.0 || !igc.is_finite() {
                tracing::debug!(line = raw.line, igc, "excluded: negative IGC");
                report.excluded.invalid_igc += 1;
                continue;
            }
        }

        let candidate = Candidate { budget, igc: raw.igc };
        if by_key.insert((institution, year), candidate).is_some() {
            report.duplicates_replaced += 1;
        }
    }

    // -------------------------------------------------------------------------
    // Step 3: fill IGC gaps per institution
    // -------------------------------------------------------------------------
    let mut grouped: BTreeMap<String, Vec<(i32, Candidate)>> = BTreeMap::new();
    for ((institution, year), candidate) in by_key {
        grouped.entry(institution).or_default().push((year, candidate));
    }

    let mut filled: Vec<(String, Vec<(i32, f64, f64, bool)>)> = Vec::with_capacity(grouped.len());
    for (institution, series) in grouped {
        let kept = fill_igc_gaps(&institution, &series, &mut report);
        if !kept.is_empty() {
            filled.push((institution, kept));
        }
    }

    // -------------------------------------------------------------------------
    // Step 4: derived fields
    // -------------------------------------------------------------------------
    let mut rows = Vec::new();
    let mut institutions = Vec::with_capacity(filled.len());

    for (entity, (institution, series)) in filled.into_iter().enumerate() {
        let budget_by_year: HashMap<i32, f64> =
            series.iter().map(|&(year, budget, _, _)| (year, budget)).collect();

        for &(year, budget, igc, imputed) in &series {
            let lag_budget = budget_by_year.get(&(year - 1)).copied();
            rows.push(PanelRow {
                institution: institution.clone(),
                entity,
                year,
                budget,
                igc,
                igc_imputed: imputed,
                lag_budget,
                ln_budget: positive_ln(budget),
                ln_igc: positive_ln(igc),
                ln_lag_budget: lag_budget.and_then(positive_ln),
                budget_millions: budget / 1_000_000.0,
                post_policy: post_policy_indicator(year, config.policy_year),
            });
        }
        institutions.push(institution);
    }

    let mut years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    years.sort_unstable();
    years.dedup();

    report.rows_kept = rows.len();
    tracing::info!(
        rows_read = report.rows_read,
        rows_kept = report.rows_kept,
        excluded = report.excluded.total(),
        duplicates = report.duplicates_replaced,
        interpolated = report.igc_interpolated,
        carried_forward = report.igc_carried_forward,
        institutions = institutions.len(),
        "panel built"
    );

    PanelDataset {
        rows,
        institutions,
        years,
        config: *config,
        report,
    }
}

/// Fill missing IGC values for one institution's year-ordered series.
///
/// Returns (year, budget, igc, imputed) for every row that ends up with an IGC.
fn fill_igc_gaps(
    institution: &str,
    series: &[(i32, Candidate)],
    report: &mut BuildReport,
) -> Vec<(i32, f64, f64, bool)> {
    let mut out = Vec::with_capacity(series.len());

    for (i, &(year, candidate)) in series.iter().enumerate() {
        if let Some(igc) = candidate.igc {
            out.push((year, candidate.budget, igc, false));
            continue;
        }

        let previous = series[..i]
            .iter()
            .rev()
            .find_map(|&(y, c)| c.igc.map(|v| (y, v)));
        let next = series[i + 1..]
            .iter()
            .find_map(|&(y, c)| c.igc.map(|v| (y, v)));

        match (previous, next) {
            (Some((y0, v0)), Some((y1, v1))) => {
                let w = f64::from(year - y0) / f64::from(y1 - y0);
                out.push((year, candidate.budget, v0 + w * (v1 - v0), true));
                report.igc_interpolated += 1;
            }
            (Some((_, v0)), None) => {
                out.push((year, candidate.budget, v0, true));
                report.igc_carried_forward += 1;
            }
            (None, _) => {
                tracing::debug!(institution, year, "excluded: IGC missing before first known value");
                report.excluded.leading_igc_gap += 1;
            }
        }
    }

    out
}
