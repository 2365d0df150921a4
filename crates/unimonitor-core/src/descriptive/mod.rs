// =============================================================================
// Descriptive Analytics
// =============================================================================
//
// What the dashboard draws before any model is fitted:
//
//   - per-institution time series of budget and IGC (with the imputed flag,
//     so the reader knows which IGC values were filled in)
//   - a log-log scatter of lagged budget against IGC with an OLS trend line
//   - Pearson and Spearman correlation between budget and IGC
//
// Chart styling is left to the front end. The highlighted institution is a
// per-request value; nothing here keeps state between calls.
//
// =============================================================================

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::error::{MonitorError, Result};
use crate::panel::PanelDataset;
use crate::solvers::{fit_ols, SolveError};

/// Spearman correlation above this reads as a moderate or strong association.
pub const MODERATE_CORRELATION: f64 = 0.3;

/// One year of one institution's series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub year: i32,
    pub budget: f64,
    pub budget_millions: f64,
    pub igc: f64,
    pub igc_imputed: bool,
}

/// An institution's year-ordered series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionSeries {
    pub institution: String,
    pub highlighted: bool,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub institution: String,
    pub year: i32,
    pub ln_lag_budget: f64,
    pub ln_igc: f64,
}

/// OLS line ln(IGC) = intercept + slope · ln(lagged budget).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub n_obs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveSummary {
    pub series: Vec<InstitutionSeries>,
    pub scatter: Vec<ScatterPoint>,
    pub trend: TrendLine,
}

/// Time series plus the log-log scatter and its trend line.
pub fn descriptive_series(panel: &PanelDataset) -> Result<DescriptiveSummary> {
    let scatter: Vec<ScatterPoint> = panel
        .rows()
        .iter()
        .filter_map(|row| match (row.ln_lag_budget, row.ln_igc) {
            (Some(ln_lag_budget), Some(ln_igc)) => Some(ScatterPoint {
                institution: row.institution.clone(),
                year: row.year,
                ln_lag_budget,
                ln_igc,
            }),
            _ => None,
        })
        .collect();

    let x: Vec<f64> = scatter.iter().map(|p| p.ln_lag_budget).collect();
    let y: Vec<f64> = scatter.iter().map(|p| p.ln_igc).collect();
    let trend = trend_line(&x, &y)?;

    Ok(DescriptiveSummary {
        series: time_series(panel, None),
        scatter,
        trend,
    })
}

/// Per-institution series; the series whose name matches `highlight` is flagged.
pub fn time_series(panel: &PanelDataset, highlight: Option<&str>) -> Vec<InstitutionSeries> {
    panel
        .institutions()
        .iter()
        .map(|institution| InstitutionSeries {
            institution: institution.clone(),
            highlighted: highlight.is_some_and(|h| h.trim() == institution.as_str()),
            points: panel
                .rows_for(institution)
                .map(|row| SeriesPoint {
                    year: row.year,
                    budget: row.budget,
                    budget_millions: row.budget_millions,
                    igc: row.igc,
                    igc_imputed: row.igc_imputed,
                })
                .collect(),
        })
        .collect()
}

fn trend_line(x: &[f64], y: &[f64]) -> Result<TrendLine> {
    let (x, y): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .unzip();
    let n = x.len();
    if n < 2 {
        return Err(MonitorError::insufficient_data("the log-log trend line", 2, n));
    }
    let first = x[0];
    if x.iter().all(|&v| v == first) {
        return Err(MonitorError::insufficient_data(
            "the log-log trend line (distinct lagged budgets)",
            2,
            1,
        ));
    }

    let design = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { 1.0 } else { x[i] });
    let fit = fit_ols(&design, &Array1::from(y)).map_err(|e| match e {
        SolveError::RankDeficient { rank, .. } => {
            MonitorError::insufficient_data("the log-log trend line (distinct lagged budgets)", 2, rank)
        }
        other => MonitorError::insufficient_data(format!("the log-log trend line ({other})"), 2, 0),
    })?;

    Ok(TrendLine {
        intercept: fit.coefficients[0],
        slope: fit.coefficients[1],
        r_squared: fit.r_squared(),
        n_obs: n,
    })
}

// =============================================================================
// Correlation
// =============================================================================

/// How the rank correlation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationReading {
    ModerateOrStrongPositive,
    Weak,
}

impl CorrelationReading {
    pub fn sentence(&self) -> &'static str {
        match self {
            CorrelationReading::ModerateOrStrongPositive => {
                "There is a moderate to strong positive correlation between budget and IGC."
            }
            CorrelationReading::Weak => {
                "The correlation is weak: the relationship between budget and IGC is not simple or direct."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlations {
    pub pearson: f64,
    pub spearman: f64,
    pub n_obs: usize,
    pub reading: CorrelationReading,
}

/// Pearson and Spearman correlation between budget and IGC over all rows.
pub fn correlations(panel: &PanelDataset) -> Result<Correlations> {
    let budget: Vec<f64> = panel.rows().iter().map(|r| r.budget).collect();
    let igc: Vec<f64> = panel.rows().iter().map(|r| r.igc).collect();
    if budget.len() < 2 {
        return Err(MonitorError::insufficient_data("correlation", 2, budget.len()));
    }

    let pearson = pearson(&budget, &igc);
    let spearman = spearman(&budget, &igc);
    let reading = if spearman > MODERATE_CORRELATION {
        CorrelationReading::ModerateOrStrongPositive
    } else {
        CorrelationReading::Weak
    };

    Ok(Correlations {
        pearson,
        spearman,
        n_obs: budget.len(),
        reading,
    })
}

/// Pearson correlation. NaN when either series is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

/// Spearman rank correlation (Pearson on average ranks).
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// 1-based ranks; tied values share the mean of their positions.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end (0-based) → ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::RawRecord;
    use crate::panel::{build_panel, PanelConfig};
    use approx::assert_abs_diff_eq;

    fn panel() -> PanelDataset {
        let mut rows = Vec::new();
        for (name, base) in [("UFMG", 1000.0), ("UFRJ", 1500.0)] {
            for t in 0..4 {
                let budget: f64 = base * (1.0 + 0.1 * t as f64);
                rows.push(RawRecord::new(name, 2014 + t, budget, (0.5 * budget.ln()).exp()));
            }
        }
        build_panel(&rows, &PanelConfig::default())
    }

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
        assert_eq!(average_ranks(&[1.0, 1.0, 1.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_spearman_with_ties() {
        let x = [1.0, 2.0, 2.0, 3.0, 4.0];
        let y = [10.0, 20.0, 20.0, 30.0, 40.0];
        assert_abs_diff_eq!(spearman(&x, &y), 1.0, epsilon = 1e-12);

        // monotone but not linear: Spearman 1, Pearson < 1
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 100.0];
        assert_abs_diff_eq!(spearman(&x, &y), 1.0, epsilon = 1e-12);
        assert!(pearson(&x, &y) < 0.99);
    }

    #[test]
    fn test_pearson_constant_is_nan() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
    }

    #[test]
    fn test_trend_line_recovers_elasticity() {
        let summary = descriptive_series(&panel()).unwrap();
        // first year of each institution has no lag
        assert_eq!(summary.scatter.len(), 6);
        assert_eq!(summary.trend.n_obs, 6);
        assert_eq!(summary.series.len(), 2);
        assert_eq!(summary.series[0].points.len(), 4);
        assert!(summary.trend.slope > 0.0);
        assert!(summary.trend.r_squared > 0.8);
    }

    #[test]
    fn test_scatter_needs_two_points() {
        let rows = vec![
            RawRecord::new("A", 2014, 100.0, 3.0),
            RawRecord::new("A", 2015, 110.0, 3.1),
        ];
        let panel = build_panel(&rows, &PanelConfig::default());
        match descriptive_series(&panel) {
            Err(MonitorError::InsufficientData { needed: 2, found: 1, .. }) => {}
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn test_scatter_with_identical_x_fails() {
        let rows = vec![
            RawRecord::new("A", 2014, 100.0, 3.0),
            RawRecord::new("A", 2015, 100.0, 3.1),
            RawRecord::new("B", 2014, 100.0, 2.0),
            RawRecord::new("B", 2015, 120.0, 2.2),
        ];
        let panel = build_panel(&rows, &PanelConfig::default());
        assert!(matches!(
            descriptive_series(&panel),
            Err(MonitorError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_trend_line_failures_are_insufficient_data() {
        match trend_line(&[1.0, f64::NAN, 2.0], &[0.5, 0.7, f64::INFINITY]) {
            Err(MonitorError::InsufficientData { needed: 2, found: 1, .. }) => {}
            other => panic!("expected InsufficientData, got {other:?}"),
        }

        let fit = trend_line(&[1.0, f64::NAN, 2.0, 3.0], &[0.5, 0.7, 1.5, 2.5]).unwrap();
        assert_eq!(fit.n_obs, 3);
        assert_abs_diff_eq!(fit.slope, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_highlight_flags_one_series() {
        let series = time_series(&panel(), Some("UFRJ"));
        let flagged: Vec<&str> = series
            .iter()
            .filter(|s| s.highlighted)
            .map(|s| s.institution.as_str())
            .collect();
        assert_eq!(flagged, vec!["UFRJ"]);
        assert!(time_series(&panel(), None).iter().all(|s| !s.highlighted));
    }

    #[test]
    fn test_correlations_reading() {
        let corr = correlations(&panel()).unwrap();
        assert_abs_diff_eq!(corr.spearman, 1.0, epsilon = 1e-12);
        assert!(corr.pearson > 0.9);
        assert_eq!(corr.reading, CorrelationReading::ModerateOrStrongPositive);
        assert_eq!(corr.n_obs, 8);
    }
}
