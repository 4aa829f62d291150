//! forge-pipeline library
//!
//! Watches a social feed, scores posts for idea quality and turns the best
//! of them into project scaffolds under a daily build quota. The ledger
//! (SQLite) is the only state that survives a cycle.

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use forge_common::EventBus;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod services;
pub mod utils;

use config::PipelineConfig;
use services::CycleReport;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Ledger connection pool
    pub db: SqlitePool,
    /// Resolved pipeline configuration
    pub config: Arc<PipelineConfig>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Most recent scan cycle, written by the scheduler
    pub last_cycle: Arc<RwLock<Option<CycleReport>>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<PipelineConfig>, event_bus: EventBus) -> Self {
        Self {
            db,
            config,
            event_bus,
            last_cycle: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
        }
    }

    /// Share the scheduler's last-cycle slot with the handlers
    pub fn with_last_cycle(mut self, last_cycle: Arc<RwLock<Option<CycleReport>>>) -> Self {
        self.last_cycle = last_cycle;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/api/stats", get(api::get_stats))
        .route("/api/candidates/top", get(api::get_top_candidates))
        .route("/api/builds", get(api::get_builds))
        .route("/api/cycles", get(api::get_cycles))
        .route("/api/report", get(api::get_report))
        .route("/api/export", get(api::get_export))
        .route("/api/analyze", post(api::analyze_post))
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
