//! Plain-text analysis report (`unimonitor report`).
//!
//! Sections that cannot be computed on the given data are reported inline
//! and the rest of the report still prints.

use std::fmt::Write;

use unimonitor_core::{
    conclude, correlations, descriptive_series, hausman, interpret, run_estimator_with, EstimationResult,
    EstimatorKind, InferenceConfig, ModelSpecification, PanelDataset,
};

const RULE: &str = "=======================================================";

/// Render the full report for the selected models.
pub fn render(panel: &PanelDataset, models: &[EstimatorKind], inference: &InferenceConfig) -> anyhow::Result<String> {
    let mut out = String::new();
    write_report(&mut out, panel, models, inference)?;
    Ok(out)
}

fn write_report(
    out: &mut String,
    panel: &PanelDataset,
    models: &[EstimatorKind],
    inference: &InferenceConfig,
) -> std::fmt::Result {
    // -------------------------------------------------------------------------
    // 1. Data
    // -------------------------------------------------------------------------
    let report = panel.report();
    writeln!(out, "--- 1. DATA ---")?;
    writeln!(
        out,
        "{} rows read, {} kept, {} institutions, years {:?}",
        report.rows_read,
        report.rows_kept,
        panel.institutions().len(),
        panel.years()
    )?;
    writeln!(
        out,
        "excluded: {} missing institution, {} invalid year, {} invalid budget, {} invalid IGC, {} IGC before first value",
        report.excluded.missing_institution,
        report.excluded.invalid_year,
        report.excluded.invalid_budget,
        report.excluded.invalid_igc,
        report.excluded.leading_igc_gap
    )?;
    writeln!(
        out,
        "duplicates replaced: {}; IGC interpolated: {}; IGC carried forward: {}",
        report.duplicates_replaced, report.igc_interpolated, report.igc_carried_forward
    )?;

    // -------------------------------------------------------------------------
    // 2. Correlation
    // -------------------------------------------------------------------------
    writeln!(out, "\n--- 2. CORRELATION (PEARSON & SPEARMAN) ---")?;
    match correlations(panel) {
        Ok(corr) => {
            writeln!(out, "Pearson (linear): {:.4}", corr.pearson)?;
            writeln!(out, "Spearman (rank):  {:.4}", corr.spearman)?;
            writeln!(out, "{}", corr.reading.sentence())?;
        }
        Err(e) => writeln!(out, "unavailable: {e}")?,
    }
    match descriptive_series(panel) {
        Ok(summary) => writeln!(
            out,
            "log-log trend: ln(IGC) = {:.4} + {:.4} ln(lagged budget), R² = {:.4}, n = {}",
            summary.trend.intercept, summary.trend.slope, summary.trend.r_squared, summary.trend.n_obs
        )?,
        Err(e) => writeln!(out, "log-log trend unavailable: {e}")?,
    }

    // -------------------------------------------------------------------------
    // 3. Models
    // -------------------------------------------------------------------------
    writeln!(out, "\n--- 3. MODELS ---")?;
    let mut fits: Vec<EstimationResult> = Vec::new();
    for &kind in models {
        let spec = ModelSpecification::default_for(kind);
        match run_estimator_with(panel, &spec, inference) {
            Ok(result) => {
                writeln!(out, "\n{result}")?;
                for note in interpret(&result) {
                    writeln!(out, "  - {}", note.sentence)?;
                }
                fits.push(result);
            }
            Err(e) => writeln!(out, "\n{}: {e}", kind.label())?,
        }
    }

    let fe = fits.iter().find(|r| r.spec.estimator == EstimatorKind::FixedEffects);
    let re = fits.iter().find(|r| r.spec.estimator == EstimatorKind::RandomEffects);
    if let (Some(fe), Some(re)) = (fe, re) {
        writeln!(out, "\n--- HAUSMAN TEST (FE vs RE) ---")?;
        match hausman(fe, re) {
            Ok(test) => {
                writeln!(
                    out,
                    "chi2({}) = {:.4}, p = {:.4} → prefer {}",
                    test.df,
                    test.statistic,
                    test.p_value,
                    test.preferred.label()
                )?;
            }
            Err(e) => writeln!(out, "unavailable: {e}")?,
        }
    }

    // -------------------------------------------------------------------------
    // 4. Conclusion (first fitted model, FE when present)
    // -------------------------------------------------------------------------
    if let Some(result) = fe.or_else(|| fits.first()) {
        let conclusion = conclude(result);
        writeln!(out, "\n{RULE}")?;
        writeln!(out, "AUTOMATIC CONCLUSION ({})", result.spec.estimator.label())?;
        writeln!(out, "{RULE}")?;
        writeln!(
            out,
            "{}: estimate {:.4}, p-value {:.4}",
            conclusion.variable, conclusion.estimate, conclusion.p_value
        )?;
        writeln!(out, "{}", conclusion.verdict)?;
        if let Some(magnitude) = &conclusion.magnitude {
            writeln!(out, "{magnitude}")?;
        }
        if let Some(caveat) = &conclusion.caveat {
            writeln!(out, "{caveat}")?;
        }
        writeln!(out, "\nLIMITATIONS:")?;
        for limitation in &conclusion.limitations {
            writeln!(out, "- {limitation}")?;
        }
    }

    Ok(())
}
