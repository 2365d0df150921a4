//! Shared application state for the dashboard.

use std::sync::Arc;
use std::time::Instant;

use unimonitor_core::{InferenceConfig, PanelDataset};

/// Read-only state available to all request handlers.
///
/// The panel is built once at startup and never mutated; per-request choices
/// (highlighted institution, model, variables) arrive in the query string.
pub struct AppState {
    pub panel: Arc<PanelDataset>,

    /// Inference settings chosen on the command line.
    pub inference: InferenceConfig,

    /// Server start time (for uptime reporting).
    pub started_at: Instant,
}

impl AppState {
    pub fn new(panel: PanelDataset, inference: InferenceConfig) -> Self {
        Self {
            panel: Arc::new(panel),
            inference,
            started_at: Instant::now(),
        }
    }
}

/// Type alias used in axum handlers.
pub type SharedState = Arc<AppState>;
