//! Ad-hoc idea analysis
//!
//! Scores a post body the same way a scan would, without touching the
//! ledger: nothing is ingested, admitted or built.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::error::{ApiError, ApiResult, PipelineError};
use crate::models::{Category, Post, RawId, RawPost, Score};
use crate::services::ingest::derive_candidate;
use crate::services::insights::{derive_insights, IdeaInsights};
use crate::services::scoring::ScoringEngine;
use crate::AppState;

/// Id given to bodies that arrive without one
pub const ADHOC_POST_ID: &str = "adhoc";

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub post_id: String,
    pub category: Category,
    pub score: Score,
    pub normalized: f64,
    /// Would the score pass the admission threshold (quota not considered)
    pub above_threshold: bool,
    pub signals: Vec<&'static str>,
    pub insights: IdeaInsights,
}

/// POST /api/analyze
///
/// Accepts the feed's post shape (`text` or `content`, optional `id`).
pub async fn analyze_post(
    State(state): State<AppState>,
    Json(mut raw): Json<RawPost>,
) -> ApiResult<Json<AnalyzeResponse>> {
    if raw.id.is_none() {
        raw.id = Some(RawId::Text(ADHOC_POST_ID.to_string()));
    }

    let post = Post::from_raw(raw, Utc::now()).map_err(|e| match e {
        PipelineError::MalformedInput(reason) => ApiError::BadRequest(reason),
        other => ApiError::from(other),
    })?;
    let candidate = derive_candidate(&post);

    let breakdown = ScoringEngine::new(state.config.category_bonus.clone()).explain(&candidate);

    Ok(Json(AnalyzeResponse {
        post_id: candidate.post_id.clone(),
        category: candidate.category,
        normalized: breakdown.score.normalized(),
        above_threshold: state.config.threshold.admits(&breakdown.score),
        score: breakdown.score,
        signals: breakdown.signals(),
        insights: derive_insights(&candidate),
    }))
}
