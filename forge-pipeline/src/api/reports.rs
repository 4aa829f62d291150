//! Reporting endpoints
//!
//! Views over durably committed ledger state: counters, ranked
//! candidates, build records, scan cycles, the markdown report and the
//! JSON idea export.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pagination::{calculate_pagination, PAGE_SIZE};
use crate::db::builds::{count_records, list_records};
use crate::db::cycles::{recent_cycles, ScanCycleRecord};
use crate::db::reports::{ledger_stats, top_candidates, RankedCandidate};
use crate::error::{ApiError, ApiResult};
use crate::models::{BuildRecord, BuildStatus};
use crate::services::insights::IdeaInsights;
use crate::services::report::{load_report_entries, render_report};
use crate::AppState;

pub const DEFAULT_TOP_LIMIT: i64 = 10;
pub const MAX_TOP_LIMIT: i64 = 100;
pub const DEFAULT_CYCLES_LIMIT: i64 = 20;
pub const MAX_CYCLES_LIMIT: i64 = 200;
pub const DEFAULT_EXPORT_LIMIT: i64 = 100;
pub const MAX_EXPORT_LIMIT: i64 = 500;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub posts_seen: i64,
    pub candidates_scored: i64,
    pub above_threshold: i64,
    /// Admission threshold on the raw 0–100 scale
    pub threshold: f64,
    pub quota_day: String,
    pub builds_today: i64,
    pub daily_build_limit: u32,
    pub quota_remaining: u32,
    pub by_status: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let config = &state.config;
    let quota_day = config.quota_day(Utc::now());
    let stats = ledger_stats(&state.db, config.threshold.raw_tenths(), &quota_day).await?;

    Ok(Json(StatsResponse {
        posts_seen: stats.posts_seen,
        candidates_scored: stats.candidates_scored,
        above_threshold: stats.above_threshold,
        threshold: config.threshold.raw(),
        quota_day: stats.quota_day,
        builds_today: stats.builds_today,
        daily_build_limit: config.daily_build_limit,
        quota_remaining: config
            .daily_build_limit
            .saturating_sub(stats.slots_used_today),
        by_status: stats.by_status,
        by_category: stats.by_category,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TopCandidatesResponse {
    pub limit: i64,
    pub candidates: Vec<RankedCandidate>,
}

/// GET /api/candidates/top?limit=N
pub async fn get_top_candidates(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<TopCandidatesResponse>> {
    let limit = checked_limit(query.limit, DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT)?;
    let candidates = top_candidates(&state.db, limit).await?;
    Ok(Json(TopCandidatesResponse { limit, candidates }))
}

#[derive(Debug, Deserialize)]
pub struct BuildsQuery {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct BuildsResponse {
    pub status: Option<BuildStatus>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub records: Vec<BuildRecord>,
}

/// GET /api/builds?status=&page=
pub async fn get_builds(
    State(state): State<AppState>,
    Query(query): Query<BuildsQuery>,
) -> ApiResult<Json<BuildsResponse>> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<BuildStatus>().map_err(ApiError::BadRequest)?),
    };

    let total = count_records(&state.db, status).await?;
    let pagination = calculate_pagination(total, query.page);
    let records = list_records(&state.db, status, PAGE_SIZE, pagination.offset).await?;

    Ok(Json(BuildsResponse {
        status,
        total,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        records,
    }))
}

/// GET /api/cycles?limit=N
pub async fn get_cycles(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<ScanCycleRecord>>> {
    let limit = checked_limit(query.limit, DEFAULT_CYCLES_LIMIT, MAX_CYCLES_LIMIT)?;
    Ok(Json(recent_cycles(&state.db, limit).await?))
}

/// GET /api/report
pub async fn get_report(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = render_report(&state.db, &state.config, Utc::now()).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        report,
    ))
}

#[derive(Debug, Serialize)]
pub struct ExportedIdea {
    pub rank: usize,
    #[serde(flatten)]
    pub candidate: RankedCandidate,
    pub signals: Vec<&'static str>,
    pub insights: Option<IdeaInsights>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub generated_at: DateTime<Utc>,
    /// Admission threshold on the raw 0–100 scale
    pub threshold: f64,
    pub count: usize,
    pub ideas: Vec<ExportedIdea>,
}

/// GET /api/export?limit=N
pub async fn get_export(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ExportResponse>> {
    let limit = checked_limit(query.limit, DEFAULT_EXPORT_LIMIT, MAX_EXPORT_LIMIT)?;
    let entries = load_report_entries(&state.db, &state.config, limit).await?;

    let ideas: Vec<ExportedIdea> = entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| ExportedIdea {
            rank: i + 1,
            signals: entry.signals(),
            candidate: entry.ranked,
            insights: entry.insights,
        })
        .collect();

    Ok(Json(ExportResponse {
        generated_at: Utc::now(),
        threshold: state.config.threshold.raw(),
        count: ideas.len(),
        ideas,
    }))
}

/// Missing → default; above max → max; below 1 → 400
fn checked_limit(requested: Option<i64>, default: i64, max: i64) -> ApiResult<i64> {
    match requested {
        None => Ok(default),
        Some(n) if n < 1 => Err(ApiError::BadRequest(format!(
            "limit must be at least 1, got {}",
            n
        ))),
        Some(n) => Ok(n.min(max)),
    }
}
