//! unimonitor: federal university budget vs. quality (IGC) monitor.
//!
//! Loads a panel of (university, year, budget, IGC) records once and either
//! serves a small JSON/HTML dashboard or prints a text report.
//!
//! # Endpoints (`serve`)
//!
//! - `GET /`                          HTML index
//! - `GET /api/health`                status, version, uptime
//! - `GET /api/panel`                 build report, institutions, years
//! - `GET /api/series?highlight=`     per-institution time series
//! - `GET /api/scatter`               log-log scatter, trend line, correlations
//! - `GET /api/model/{fe|re|did}`     estimation result, notes, conclusion
//! - `GET /api/compare`               FE vs RE with the Hausman test

mod report;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Args, Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use unimonitor_core::{
    build_panel, read_records, EstimatorKind, InferenceConfig, PanelConfig, PanelDataset, ReferenceDistribution,
    POLICY_YEAR,
};

use state::AppState;

/// Budget vs. IGC panel models for Brazilian federal universities.
#[derive(Parser, Debug)]
#[command(name = "unimonitor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the dashboard over HTTP.
    Serve {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Bind address.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on.
        #[arg(short, long, default_value = "8501")]
        port: u16,
    },

    /// Print the analysis report to stdout.
    Report {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Only run these models (fe, re, did). Repeatable; default is all three.
        #[arg(long = "model")]
        models: Vec<EstimatorKind>,
    },
}

/// Input file and panel settings shared by both subcommands.
#[derive(Args, Debug, Clone)]
struct AnalysisArgs {
    /// CSV export with university, year, budget and IGC columns.
    #[arg(long)]
    data: PathBuf,

    /// Year the spending cap took effect (post-policy indicator = year >= this).
    #[arg(long, default_value_t = POLICY_YEAR)]
    policy_year: i32,

    /// First year kept in the panel.
    #[arg(long, default_value_t = PanelConfig::default().first_year)]
    first_year: i32,

    /// Last year kept in the panel.
    #[arg(long, default_value_t = PanelConfig::default().last_year)]
    last_year: i32,

    /// Report p-values and intervals from Student-t for every model.
    /// Without it FE uses Student-t and RE/DiD the normal.
    #[arg(long)]
    student_t: bool,
}

impl AnalysisArgs {
    fn panel_config(&self) -> anyhow::Result<PanelConfig> {
        anyhow::ensure!(
            self.first_year <= self.last_year,
            "--first-year ({}) must not be after --last-year ({})",
            self.first_year,
            self.last_year
        );
        Ok(PanelConfig {
            first_year: self.first_year,
            last_year: self.last_year,
            policy_year: self.policy_year,
        })
    }

    fn inference(&self) -> InferenceConfig {
        // without the flag each estimator keeps its own default
        InferenceConfig {
            distribution: self.student_t.then_some(ReferenceDistribution::StudentT),
            ..InferenceConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { analysis, host, port } => serve(&analysis, &host, port).await,
        Command::Report { analysis, models } => {
            let panel = load_panel(&analysis)?;
            let models = if models.is_empty() {
                EstimatorKind::ALL.to_vec()
            } else {
                models
            };
            let text = report::render(&panel, &models, &analysis.inference())?;
            println!("{text}");
            Ok(())
        }
    }
}

async fn serve(analysis: &AnalysisArgs, host: &str, port: u16) -> anyhow::Result<()> {
    let panel = load_panel(analysis)?;
    let state = Arc::new(AppState::new(panel, analysis.inference()));

    let app = Router::new()
        .merge(routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "unimonitor dashboard starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Read the input file and build the panel, once per process.
fn load_panel(analysis: &AnalysisArgs) -> anyhow::Result<PanelDataset> {
    let config = analysis.panel_config()?;
    let table = read_records(&analysis.data).with_context(|| format!("loading {}", analysis.data.display()))?;
    let panel = build_panel(&table.records, &config);

    let report = panel.report();
    tracing::info!(
        rows_read = report.rows_read,
        rows_kept = report.rows_kept,
        excluded = report.excluded.total(),
        institutions = panel.institutions().len(),
        policy_year = config.policy_year,
        "panel ready"
    );
    anyhow::ensure!(
        !panel.is_empty(),
        "{} has no usable rows ({} read, {} excluded)",
        analysis.data.display(),
        report.rows_read,
        report.excluded.total()
    );
    Ok(panel)
}
