//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Outcome of the most recent scan cycle, if one has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let last_cycle = state.last_cycle.read().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "forge-pipeline".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        last_cycle_outcome: last_cycle.as_ref().map(|r| r.outcome.clone()),
        last_cycle_finished_at: last_cycle.as_ref().map(|r| r.finished_at),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
