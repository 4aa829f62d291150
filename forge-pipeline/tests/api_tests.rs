//! Reporting API tests driven through the router

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use forge_common::db::init_memory_database;
use forge_common::EventBus;
use forge_pipeline::config::PipelineConfig;
use forge_pipeline::feed::StaticFeed;
use forge_pipeline::models::RawPost;
use forge_pipeline::services::{Pipeline, ScaffoldMaterializer};
use forge_pipeline::{build_router, AppState};

const STRONG_TEXT: &str = "An AI agent SaaS platform with a workflow API and a CLI tool library";

/// Router over a ledger seeded by one scan of four posts (limit 1)
async fn seeded_app(projects: &std::path::Path) -> Router {
    let db = init_memory_database().await.unwrap();
    let config = Arc::new(PipelineConfig {
        daily_build_limit: 1,
        ..PipelineConfig::default()
    });
    let event_bus = EventBus::new(64);

    let feed = StaticFeed::single_page(vec![
        RawPost::new("s1", STRONG_TEXT, "alice", 200, 10),
        RawPost::new("s2", STRONG_TEXT, "bob", 100, 5),
        RawPost::new("w1", "lunch was good", "carol", 0, 0),
        RawPost::new("w2", "rainy day again", "dave", 0, 0),
    ]);
    let pipeline = Pipeline::new(
        db.clone(),
        &config,
        Arc::new(feed),
        Arc::new(ScaffoldMaterializer::new(projects)),
        event_bus.clone(),
    );
    let report = pipeline.run_cycle().await;
    assert!(!report.is_aborted(), "{:?}", report.error);

    build_router(AppState::new(db, config, event_bus))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "forge-pipeline");
}

#[tokio::test]
async fn test_stats() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = get_json(&app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posts_seen"], 4);
    assert_eq!(body["candidates_scored"], 4);
    assert_eq!(body["above_threshold"], 2);
    assert_eq!(body["builds_today"], 1);
    assert_eq!(body["quota_remaining"], 0);
    assert_eq!(body["by_status"]["built"], 1);
    assert_eq!(body["by_status"]["rejected_quota_exhausted"], 1);
    assert_eq!(body["by_status"]["rejected_low_score"], 2);
    assert_eq!(body["by_status"]["admitted"], 0);
}

#[tokio::test]
async fn test_top_candidates_ordered_and_limited() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = get_json(&app, "/api/candidates/top?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 2);
    // More engagement ranks s1 first
    assert_eq!(candidates[0]["post_id"], "s1");
    assert_eq!(candidates[0]["status"], "built");
    assert_eq!(candidates[1]["post_id"], "s2");
    assert_eq!(candidates[1]["status"], "rejected_quota_exhausted");

    let (status, body) = get_json(&app, "/api/candidates/top?limit=1000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 100);

    let (status, body) = get_json(&app, "/api/candidates/top?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_builds_filter_and_validation() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = get_json(&app, "/api/builds").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    assert_eq!(body["page"], 1);
    assert_eq!(body["page_size"], 50);

    let (status, body) = get_json(&app, "/api/builds?status=built").await;
    assert_eq!(status, StatusCode::OK);
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["post_id"], "s1");
    assert!(records[0]["project_ref"].is_string());

    let (status, _) = get_json(&app, "/api/builds?status=queued").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cycles() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = get_json(&app, "/api/cycles?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    let cycles = body.as_array().unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0]["outcome"], "completed");
    assert_eq!(cycles[0]["counts"]["ingested"], 4);
    assert_eq!(cycles[0]["counts"]["built"], 1);
}

#[tokio::test]
async fn test_markdown_report() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/report").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/markdown; charset=utf-8"
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let report = String::from_utf8(body.to_vec()).unwrap();
    assert!(report.contains("## Top 4 ideas"));
    assert!(report.contains("### 1. s1"));
    assert!(report.contains("| Builds today"));
    assert!(report.contains("- **Directions**: AI assistant or agent application (high)"));
}

#[tokio::test]
async fn test_analyze_scores_without_writing() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = post_json(
        &app,
        "/api/analyze",
        serde_json::json!({
            "title": "Agent dashboard",
            "content": STRONG_TEXT,
            "upvotes": 120,
            "tags": ["trending"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post_id"], "adhoc");
    assert_eq!(body["category"], "tool");
    assert_eq!(body["above_threshold"], true);
    assert!(body["score"]["total"].as_f64().unwrap() > 60.0);
    let reasons = body["insights"]["reasons"].as_array().unwrap();
    assert_eq!(reasons[0], "High popularity (120 likes)");
    assert!(reasons.iter().any(|r| r == "Trending tag"));
    assert_eq!(body["insights"]["directions"][0]["kind"], "data_dashboard");
    assert_eq!(body["insights"]["monetization"][0], "subscription");

    // Ledger untouched
    let (_, stats) = get_json(&app, "/api/stats").await;
    assert_eq!(stats["posts_seen"], 4);

    let (status, body) = post_json(&app, "/api/analyze", serde_json::json!({ "id": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_export_ranked_ideas_with_insights() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, body) = get_json(&app, "/api/export").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    let ideas = body["ideas"].as_array().unwrap();
    assert_eq!(ideas[0]["rank"], 1);
    assert_eq!(ideas[0]["post_id"], "s1");
    assert_eq!(ideas[0]["status"], "built");
    assert!(ideas[0]["signals"].as_array().unwrap().iter().any(|s| s == "agent"));
    assert_eq!(ideas[0]["insights"]["reasons"][0], "High popularity (200 likes)");

    let (status, body) = get_json(&app, "/api/export?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, _) = get_json(&app, "/api/export?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let projects = tempfile::tempdir().unwrap();
    let app = seeded_app(projects.path()).await;

    let (status, _) = get(&app, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
