// =============================================================================
// unimonitor Core Library
// =============================================================================
//
// Pure Rust core of the university budget/quality monitor: everything from
// the raw spreadsheet rows to the plain-language conclusion. No HTTP, no
// terminal output; the `unimonitor` binary is a thin layer on top.
//
// STRUCTURE:
// ----------
//   - ingest:         CSV reading with tolerant header matching
//   - panel:          validated (institution, year) panel + derived fields
//   - descriptive:    time series, log-log scatter + trend, correlations
//   - estimators:     Fixed Effects, Random Effects, DiD, Hausman test
//   - solvers:        OLS and the covariance estimators behind the models
//   - inference:      p-values, confidence intervals, significance stars
//   - interpretation: notes per coefficient and the overall conclusion
//   - spec:           model specifications and coefficient roles
//   - error:          error types used throughout the library
//
// Data flows in that order: file → RawRecord → PanelDataset →
// EstimationResult → InterpretationNote / Conclusion.
//
// =============================================================================

pub mod convert;
pub mod descriptive;
pub mod error;
pub mod estimators;
pub mod inference;
pub mod ingest;
pub mod interpretation;
pub mod panel;
pub mod solvers;
pub mod spec;

pub use descriptive::{correlations, descriptive_series, time_series, Correlations, DescriptiveSummary};
pub use error::{MonitorError, Result};
pub use estimators::{
    hausman, run_estimator, run_estimator_with, Coefficient, EstimationResult, Estimator, HausmanTest,
    ModelDiagnostics,
};
pub use inference::{InferenceConfig, ReferenceDistribution};
pub use ingest::{parse_records, read_records, RawRecord, RawTable};
pub use interpretation::{conclude, interpret, Conclusion, InterpretationNote, Significance};
pub use panel::{build_panel, BuildReport, PanelConfig, PanelDataset, PanelRow, POLICY_YEAR};
pub use spec::{BudgetTerm, CovarianceKind, EstimatorKind, ModelSpecification, Outcome, VariableRole};
