// =============================================================================
// End-to-end: file → panel → descriptive → models → interpretation
// =============================================================================

use std::io::Write;

use approx::assert_abs_diff_eq;
use tempfile::{Builder, NamedTempFile};
use unimonitor_core::{
    build_panel, conclude, correlations, descriptive_series, hausman, interpret, read_records, run_estimator,
    EstimatorKind, ModelSpecification, MonitorError, PanelConfig, VariableRole,
};

const UNIVERSITIES: [(&str, f64, f64); 5] = [
    ("UFMG", 2_100_000_000.0, 0.35),
    ("UFRJ", 3_000_000_000.0, 0.30),
    ("UnB", 1_800_000_000.0, 0.45),
    ("UFPE", 1_500_000_000.0, 0.25),
    ("UFBA", 1_300_000_000.0, 0.20),
];

fn csv_file() -> NamedTempFile {
    Builder::new().suffix(".csv").tempfile().unwrap()
}

/// Semicolon-separated export with Portuguese headers, decimal commas,
/// a missing 2020 IGC (interpolated) and a missing 2024 IGC (carried forward).
fn write_export() -> NamedTempFile {
    let mut file = csv_file();
    writeln!(file, "Universidade;Ano;Orçamento(GND 3+4);IGC (Contínuo)").unwrap();

    let wiggle = [0.012, -0.008, 0.004, -0.011, 0.007, 0.0, -0.005, 0.009, -0.003, 0.006, -0.007];
    for (u, (name, base, alpha)) in UNIVERSITIES.iter().enumerate() {
        for (t, year) in (2014..=2024).enumerate() {
            let growth = 1.0 + 0.03 * t as f64 - 0.02 * ((t + u) % 3) as f64;
            let budget = base * growth;
            let ln_igc = alpha + 0.05 * budget.ln() - 0.95 + wiggle[(t + 2 * u) % wiggle.len()];
            let igc = if year == 2020 || year == 2024 {
                String::new()
            } else {
                format!("{:.4}", ln_igc.exp()).replace('.', ",")
            };
            let budget = format!("{budget:.2}").replace('.', ",");
            writeln!(file, "{name};{year};R$ {budget};{igc}").unwrap();
        }
    }
    // a row with no institution is excluded, not fatal
    writeln!(file, ";2018;100,00;3,1").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_pipeline() {
    let file = write_export();
    let table = read_records(file.path()).unwrap();
    assert_eq!(table.delimiter, b';');
    assert_eq!(table.records.len(), 5 * 11 + 1);

    let panel = build_panel(&table.records, &PanelConfig::default());
    let report = panel.report();
    assert_eq!(report.excluded.missing_institution, 1);
    assert_eq!(report.igc_interpolated, 5);
    assert_eq!(report.igc_carried_forward, 5);
    assert_eq!(panel.len(), 55);
    assert_eq!(panel.institutions().len(), 5);
    assert_eq!(panel.years().first(), Some(&2014));
    assert_eq!(panel.years().last(), Some(&2024));

    let summary = descriptive_series(&panel).unwrap();
    assert_eq!(summary.scatter.len(), 50);
    assert!(summary.trend.slope.is_finite());

    let corr = correlations(&panel).unwrap();
    assert!((-1.0..=1.0).contains(&corr.spearman));

    let mut fits = Vec::new();
    for kind in EstimatorKind::ALL {
        let spec = ModelSpecification::default_for(kind);
        let result = run_estimator(&panel, &spec).unwrap();
        assert_eq!(result.coefficients.len(), spec.roles().len());
        for c in &result.coefficients {
            assert!(c.estimate.is_finite(), "{kind:?} {}", c.name);
            assert!(c.std_error.is_finite() && c.std_error > 0.0, "{kind:?} {}", c.name);
            assert!((0.0..=1.0).contains(&c.p_value));
        }

        let notes = interpret(&result);
        assert_eq!(notes.len(), result.coefficients.len());
        let conclusion = conclude(&result);
        assert_eq!(conclusion.role, spec.role_of_interest());
        assert!(!conclusion.verdict.is_empty());
        fits.push(result);
    }

    let did = &fits[2];
    assert!(did.coefficient(VariableRole::PostPolicy).is_some());
    assert_eq!(did.diagnostics.entity_dummies, Some(4));

    match hausman(&fits[0], &fits[1]) {
        Ok(test) => assert!(test.statistic >= 0.0),
        Err(MonitorError::EstimationFailed { .. }) => {}
        Err(other) => panic!("unexpected Hausman error: {other}"),
    }
}

#[test]
fn test_lagged_specification_loses_first_year() {
    let file = write_export();
    let table = read_records(file.path()).unwrap();
    let panel = build_panel(&table.records, &PanelConfig::default());

    let spec = ModelSpecification::default_for(EstimatorKind::FixedEffects)
        .with_budget(unimonitor_core::BudgetTerm::LogLaggedBudget);
    let result = run_estimator(&panel, &spec).unwrap();
    assert_eq!(result.diagnostics.n_obs, 50);
    assert_eq!(result.coefficients[1].name, "ln_lag_budget");
}

#[test]
fn test_missing_column_is_a_data_error() {
    let mut file = csv_file();
    writeln!(file, "Universidade,Ano,IGC").unwrap();
    writeln!(file, "UFMG,2014,3.9").unwrap();
    file.flush().unwrap();

    let err = read_records(file.path()).unwrap_err();
    assert!(err.is_data_error());
    assert!(err.to_string().contains("budget"));
}

#[test]
fn test_policy_year_is_configurable() {
    let file = write_export();
    let table = read_records(file.path()).unwrap();
    let config = PanelConfig {
        policy_year: 2019,
        ..PanelConfig::default()
    };
    let panel = build_panel(&table.records, &config);

    let post = panel.rows().iter().filter(|r| r.post_policy == 1).count();
    assert_eq!(post, 5 * 6);
    assert_abs_diff_eq!(panel.get("UFMG", 2018).map(|r| f64::from(r.post_policy)).unwrap_or(-1.0), 0.0);
}
