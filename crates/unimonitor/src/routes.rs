//! HTTP route handlers for the dashboard.
//!
//! Everything under `/api/` returns JSON. Model fits run synchronously on the
//! request task; they take microseconds on a panel of this size.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use unimonitor_core::descriptive::{ScatterPoint, TrendLine};
use unimonitor_core::{
    conclude, correlations, descriptive_series, hausman, interpret, run_estimator_with, time_series, BudgetTerm,
    BuildReport, Conclusion, Correlations, CovarianceKind, EstimationResult, EstimatorKind, HausmanTest,
    InterpretationNote, ModelSpecification, MonitorError, Outcome, PanelConfig,
};

use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/panel", get(panel_handler))
        .route("/api/series", get(series_handler))
        .route("/api/scatter", get(scatter_handler))
        .route("/api/model/:kind", get(model_handler))
        .route("/api/compare", get(compare_handler))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_s: f64,
    rows: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_s: state.started_at.elapsed().as_secs_f64(),
        rows: state.panel.len(),
    })
}

// ---------------------------------------------------------------------------
// GET /api/panel
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PanelResponse {
    config: PanelConfig,
    report: BuildReport,
    institutions: Vec<String>,
    years: Vec<i32>,
}

async fn panel_handler(State(state): State<SharedState>) -> Json<PanelResponse> {
    let panel = &state.panel;
    Json(PanelResponse {
        config: *panel.config(),
        report: panel.report().clone(),
        institutions: panel.institutions().to_vec(),
        years: panel.years().to_vec(),
    })
}

// ---------------------------------------------------------------------------
// GET /api/series?highlight=<institution>
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SeriesQuery {
    highlight: Option<String>,
}

async fn series_handler(
    State(state): State<SharedState>,
    Query(query): Query<SeriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let highlight = query.highlight.as_deref().map(str::trim).filter(|h| !h.is_empty());
    if let Some(name) = highlight {
        if !state.panel.institutions().iter().any(|i| i == name) {
            return Err(AppError::unprocessable(format!("unknown institution '{name}'")));
        }
    }
    Ok(Json(time_series(&state.panel, highlight)))
}

// ---------------------------------------------------------------------------
// GET /api/scatter
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ScatterResponse {
    points: Vec<ScatterPoint>,
    trend: TrendLine,
    correlations: Correlations,
    reading: &'static str,
}

async fn scatter_handler(State(state): State<SharedState>) -> Result<Json<ScatterResponse>, AppError> {
    let summary = descriptive_series(&state.panel)?;
    let correlations = correlations(&state.panel)?;
    Ok(Json(ScatterResponse {
        points: summary.scatter,
        trend: summary.trend,
        reading: correlations.reading.sentence(),
        correlations,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/model/{fe|re|did}?outcome=&budget=&covariance=
// ---------------------------------------------------------------------------

/// Optional overrides of the per-estimator default specification.
#[derive(Debug, Default, Deserialize)]
struct ModelQuery {
    outcome: Option<String>,
    budget: Option<String>,
    covariance: Option<String>,
}

impl ModelQuery {
    fn specification(&self, kind: EstimatorKind) -> Result<ModelSpecification, MonitorError> {
        let mut spec = ModelSpecification::default_for(kind);
        if let Some(outcome) = non_empty(&self.outcome) {
            spec = spec.with_outcome(Outcome::from_str(outcome)?);
        }
        if let Some(budget) = non_empty(&self.budget) {
            spec = spec.with_budget(BudgetTerm::from_str(budget)?);
        }
        if let Some(covariance) = non_empty(&self.covariance) {
            spec = spec.with_covariance(CovarianceKind::from_str(covariance)?);
        }
        Ok(spec)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
struct ModelResponse {
    result: EstimationResult,
    notes: Vec<InterpretationNote>,
    conclusion: Conclusion,
    /// Plain-text summary table.
    summary: String,
}

impl ModelResponse {
    fn new(result: EstimationResult) -> Self {
        Self {
            notes: interpret(&result),
            conclusion: conclude(&result),
            summary: result.to_string(),
            result,
        }
    }
}

async fn model_handler(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<ModelResponse>, AppError> {
    let kind = EstimatorKind::from_str(&kind)?;
    let spec = query.specification(kind)?;
    let result = run_estimator_with(&state.panel, &spec, &state.inference)?;
    Ok(Json(ModelResponse::new(result)))
}

// ---------------------------------------------------------------------------
// GET /api/compare
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompareResponse {
    fixed_effects: ModelResponse,
    random_effects: ModelResponse,
    hausman: Option<HausmanTest>,
    /// Why the Hausman test could not be computed, if it couldn't.
    hausman_error: Option<String>,
}

async fn compare_handler(
    State(state): State<SharedState>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<CompareResponse>, AppError> {
    let fe_spec = query.specification(EstimatorKind::FixedEffects)?;
    let re_spec = query.specification(EstimatorKind::RandomEffects)?;
    let fe = run_estimator_with(&state.panel, &fe_spec, &state.inference)?;
    let re = run_estimator_with(&state.panel, &re_spec, &state.inference)?;

    let (hausman, hausman_error) = match hausman(&fe, &re) {
        Ok(test) => (Some(test), None),
        Err(e) => {
            tracing::debug!(error = %e, "hausman test unavailable");
            (None, Some(e.to_string()))
        }
    };

    Ok(Json(CompareResponse {
        fixed_effects: ModelResponse::new(fe),
        random_effects: ModelResponse::new(re),
        hausman,
        hausman_error,
    }))
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

async fn index_handler(State(state): State<SharedState>) -> Html<String> {
    let panel = &state.panel;
    let report = panel.report();

    let institutions: String = panel
        .institutions()
        .iter()
        .map(|name| {
            format!(
                "<li><a href=\"/api/series?highlight={}\">{}</a></li>",
                escape_html(name),
                escape_html(name)
            )
        })
        .collect();
    let models: String = EstimatorKind::ALL
        .iter()
        .map(|k| format!("<li><a href=\"/api/model/{}\">{}</a></li>", k.code(), k.label()))
        .collect();
    let years = match (panel.years().first(), panel.years().last()) {
        (Some(first), Some(last)) => format!("{first}–{last}"),
        _ => "none".to_string(),
    };

    Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>unimonitor</title></head><body>\n\
         <h1>University budget vs. IGC</h1>\n\
         <p>{rows} observations, {n} institutions, years {years}, policy year {policy}. \
         {excluded} rows excluded, {imputed} IGC values imputed.</p>\n\
         <h2>Models</h2><ul>{models}<li><a href=\"/api/compare\">FE vs RE (Hausman)</a></li></ul>\n\
         <h2>Data</h2><ul><li><a href=\"/api/panel\">panel</a></li><li><a href=\"/api/scatter\">scatter</a></li></ul>\n\
         <h2>Institutions</h2><ul>{institutions}</ul>\n\
         </body></html>\n",
        rows = panel.len(),
        n = panel.institutions().len(),
        policy = panel.config().policy_year,
        excluded = report.excluded.total(),
        imputed = report.igc_interpolated + report.igc_carried_forward,
    ))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structured JSON error response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn unprocessable(msg: String) -> Self {
        Self { status: StatusCode::UNPROCESSABLE_ENTITY, message: msg }
    }
}

impl From<MonitorError> for AppError {
    fn from(err: MonitorError) -> Self {
        let status = if err.is_data_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else if matches!(err, MonitorError::UnsupportedSpecification(_)) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            tracing::warn!(error = %err, "request failed");
        }
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use unimonitor_core::{build_panel, InferenceConfig, RawRecord};

    use super::*;
    use crate::state::AppState;

    fn app(rows: &[RawRecord]) -> Router {
        let panel = build_panel(rows, &PanelConfig::default());
        let state = Arc::new(AppState::new(panel, InferenceConfig::default()));
        router().with_state(state)
    }

    fn sample_rows() -> Vec<RawRecord> {
        let noise = [0.02, -0.015, 0.01, -0.02, 0.005, 0.0, 0.012, -0.008];
        let mut rows = Vec::new();
        let mut k = 0;
        for (i, name) in ["UFMG", "UFRJ", "UnB", "UFPE"].iter().enumerate() {
            for year in 2014..=2021 {
                let t = (year - 2014) as f64;
                let budget: f64 = 1.0e9 * (1.0 + 0.3 * i as f64) * (1.0 + 0.04 * t - 0.03 * ((year as usize + i) % 3) as f64);
                let ln_igc = 0.1 * i as f64 + 0.04 * budget.ln() + noise[k % noise.len()];
                k += 1;
                rows.push(RawRecord::new(name, year, budget, ln_igc.exp()));
            }
        }
        rows
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[test]
    fn test_model_query_overrides_defaults() {
        let query = ModelQuery {
            outcome: Some("igc".into()),
            budget: Some(" ln_lag_budget ".into()),
            covariance: Some(String::new()),
        };
        let spec = query.specification(EstimatorKind::FixedEffects).unwrap();
        assert_eq!(spec.outcome, Outcome::Igc);
        assert_eq!(spec.budget, BudgetTerm::LogLaggedBudget);
        assert_eq!(spec.covariance, CovarianceKind::Unadjusted);

        let bad = ModelQuery { budget: Some("revenue".into()), ..Default::default() };
        assert!(matches!(
            bad.specification(EstimatorKind::FixedEffects),
            Err(MonitorError::UnsupportedSpecification(_))
        ));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("A&B <x>"), "A&amp;B &lt;x&gt;");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app(&sample_rows()), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rows"], 32);
    }

    #[tokio::test]
    async fn test_panel_endpoint() {
        let (status, body) = get_json(app(&sample_rows()), "/api/panel").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["institutions"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["report"]["rows_kept"], 32);
        assert_eq!(body["config"]["policy_year"], 2017);
    }

    #[tokio::test]
    async fn test_series_highlight() {
        let (status, body) = get_json(app(&sample_rows()), "/api/series?highlight=UnB").await;
        assert_eq!(status, StatusCode::OK);
        let flagged: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .filter(|s| s["highlighted"] == true)
            .filter_map(|s| s["institution"].as_str())
            .collect();
        assert_eq!(flagged, vec!["UnB"]);

        let (status, body) = get_json(app(&sample_rows()), "/api/series?highlight=USP").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap_or("").contains("USP"));
    }

    #[tokio::test]
    async fn test_scatter_endpoint() {
        let (status, body) = get_json(app(&sample_rows()), "/api/scatter").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["points"].as_array().map(Vec::len), Some(28));
        assert!(body["trend"]["slope"].is_number());
        assert!(body["reading"].is_string());
    }

    #[tokio::test]
    async fn test_model_endpoint() {
        let (status, body) = get_json(app(&sample_rows()), "/api/model/did").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["coefficients"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["notes"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["conclusion"]["variable"], "interaction");
        assert!(body["summary"].as_str().unwrap_or("").contains("interaction"));
    }

    #[tokio::test]
    async fn test_model_endpoint_errors() {
        let (status, body) = get_json(app(&sample_rows()), "/api/model/ols").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        // one institution: RE cannot estimate the entity variance
        let rows: Vec<RawRecord> = sample_rows().into_iter().filter(|r| r.institution.as_deref() == Some("UFMG")).collect();
        let (status, body) = get_json(app(&rows), "/api/model/re").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap_or("").contains("institutions"));
    }

    #[tokio::test]
    async fn test_compare_endpoint() {
        let (status, body) = get_json(app(&sample_rows()), "/api/compare").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["fixed_effects"]["result"].is_object());
        assert!(body["random_effects"]["result"].is_object());
        assert!(body["hausman"].is_object() || body["hausman_error"].is_string());
    }

    #[tokio::test]
    async fn test_index_lists_institutions() {
        let response = app(&sample_rows())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("UFRJ"));
        assert!(html.contains("/api/model/did"));
    }
}
