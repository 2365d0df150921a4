// =============================================================================
// Error Types
// =============================================================================
//
// One error enum for the whole core library. The variants map one-to-one onto
// what the dashboard has to tell the user:
//
//   - DataValidation:         the input file itself is unusable
//   - InsufficientData:       not enough usable rows for the requested output
//   - InsufficientEntities:   not enough institutions for a variance component
//   - EstimationFailed:       numerical trouble (singular design, NaNs)
//   - UnsupportedSpecification: a model/variable combination we don't know
//
// Row-level problems are NOT errors: the panel builder excludes the row and
// counts it in the build report instead.
//
// =============================================================================

use thiserror::Error;

use crate::spec::ModelSpecification;

/// Errors produced by the unimonitor core.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The input file is malformed as a whole (missing columns, bad encoding).
    #[error("Data validation error: {0}")]
    DataValidation(String),

    /// Too few usable observations for the requested computation.
    #[error("Insufficient data for {context}: need at least {needed} observations, found {found}")]
    InsufficientData {
        context: String,
        needed: usize,
        found: usize,
    },

    /// Too few institutions with usable data.
    #[error("Insufficient entities: need at least {needed} institutions with usable data, found {found}")]
    InsufficientEntities { needed: usize, found: usize },

    /// Numerical failure while fitting a model.
    #[error("Estimation failed for {spec}: {reason}")]
    EstimationFailed {
        spec: ModelSpecification,
        reason: String,
    },

    /// Unknown model or variable combination.
    #[error("Unsupported specification: {0}")]
    UnsupportedSpecification(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MonitorError {
    pub(crate) fn insufficient_data(context: impl Into<String>, needed: usize, found: usize) -> Self {
        MonitorError::InsufficientData {
            context: context.into(),
            needed,
            found,
        }
    }

    pub(crate) fn estimation_failed(spec: &ModelSpecification, reason: impl Into<String>) -> Self {
        MonitorError::EstimationFailed {
            spec: spec.clone(),
            reason: reason.into(),
        }
    }

    /// Whether this error is caused by the data rather than the code.
    ///
    /// The dashboard reports data errors as "unprocessable" and everything
    /// else as an internal failure.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            MonitorError::DataValidation(_)
                | MonitorError::InsufficientData { .. }
                | MonitorError::InsufficientEntities { .. }
        )
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, MonitorError>;
