//! Read-only aggregate queries for reporting

use forge_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use super::quota::slots_used;
use crate::models::{BuildStatus, Category, Score};

/// Ledger-wide counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    pub posts_seen: i64,
    pub candidates_scored: i64,
    pub above_threshold: i64,
    pub quota_day: String,
    pub builds_today: i64,
    pub slots_used_today: u32,
    pub by_status: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
}

/// Scored candidate with its current build status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub post_id: String,
    pub title: Option<String>,
    pub author: String,
    pub category: Category,
    pub score: Score,
    pub normalized: f64,
    pub status: Option<BuildStatus>,
    pub project_ref: Option<String>,
}

/// Gather ledger counters
///
/// `threshold_tenths` is the admission threshold on the raw scale in
/// integer tenths; `quota_day` is today's quota key.
pub async fn ledger_stats(
    pool: &SqlitePool,
    threshold_tenths: i64,
    quota_day: &str,
) -> Result<LedgerStats> {
    let posts_seen: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    let candidates_scored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores")
        .fetch_one(pool)
        .await?;
    let above_threshold: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM scores WHERE CAST(ROUND(total * 10) AS INTEGER) >= ?")
            .bind(threshold_tenths)
            .fetch_one(pool)
            .await?;
    let builds_today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM build_records WHERE status = 'built' AND quota_day = ?",
    )
    .bind(quota_day)
    .fetch_one(pool)
    .await?;

    let mut by_status: BTreeMap<String, i64> = BuildStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for row in sqlx::query("SELECT status, COUNT(*) AS n FROM build_records GROUP BY status")
        .fetch_all(pool)
        .await?
    {
        by_status.insert(row.get("status"), row.get("n"));
    }

    let mut by_category = BTreeMap::new();
    for row in sqlx::query("SELECT category, COUNT(*) AS n FROM candidates GROUP BY category")
        .fetch_all(pool)
        .await?
    {
        by_category.insert(row.get::<String, _>("category"), row.get::<i64, _>("n"));
    }

    Ok(LedgerStats {
        posts_seen,
        candidates_scored,
        above_threshold,
        quota_day: quota_day.to_string(),
        builds_today,
        slots_used_today: slots_used(pool, quota_day).await?,
        by_status,
        by_category,
    })
}

/// Highest-scoring candidates, best first
pub async fn top_candidates(pool: &SqlitePool, limit: i64) -> Result<Vec<RankedCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT s.post_id, p.title, p.author, c.category,
               s.technical_innovation, s.business_potential, s.practical_value,
               s.engagement, s.category_bonus,
               b.status, b.project_ref
        FROM scores s
        JOIN candidates c ON c.post_id = s.post_id
        JOIN posts p ON p.id = s.post_id
        LEFT JOIN build_records b ON b.post_id = s.post_id
        ORDER BY s.total DESC, s.post_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let category: String = row.get("category");
            let category: Category = category.parse().map_err(Error::Internal)?;
            let status: Option<String> = row.get("status");
            let status = status
                .map(|s| s.parse::<BuildStatus>())
                .transpose()
                .map_err(Error::Internal)?;
            let score = Score::from_parts(
                row.get("technical_innovation"),
                row.get("business_potential"),
                row.get("practical_value"),
                row.get("engagement"),
                row.get("category_bonus"),
            );

            Ok(RankedCandidate {
                post_id: row.get("post_id"),
                title: row.get("title"),
                author: row.get("author"),
                category,
                normalized: score.normalized(),
                score,
                status,
                project_ref: row.get("project_ref"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::builds::{claim_build, complete_build, record_low_score};
    use crate::db::posts::insert_post_with_candidate;
    use crate::db::quota::try_admit;
    use crate::db::scores::store_score;
    use crate::models::{Post, RawPost};
    use crate::services::ingest::derive_candidate;
    use chrono::Utc;
    use forge_common::db::init_memory_database;

    async fn seed(pool: &SqlitePool, id: &str, total_parts: (f64, f64)) {
        let post = Post::from_raw(RawPost::new(id, "an ai tool", "bob", 0, 0), Utc::now()).unwrap();
        insert_post_with_candidate(pool, &post, &derive_candidate(&post))
            .await
            .unwrap();
        let score = Score::from_parts(total_parts.0, total_parts.1, 0.0, 0.0, 0.0);
        store_score(pool, id, &score, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_and_ranking() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool, "low", (10.0, 0.0)).await;
        seed(&pool, "edge", (35.0, 18.3)).await;
        seed(&pool, "high", (35.0, 25.0)).await;

        record_low_score(&pool, "low", Utc::now()).await.unwrap();
        try_admit(&pool, "high", "2026-01-01", 3, Utc::now()).await.unwrap();
        claim_build(&pool, "high", "builder", Utc::now()).await.unwrap();
        complete_build(&pool, "high", "builder", "/projects/high", Utc::now())
            .await
            .unwrap();
        try_admit(&pool, "edge", "2026-01-01", 3, Utc::now()).await.unwrap();

        let stats = ledger_stats(&pool, 533, "2026-01-01").await.unwrap();
        assert_eq!(stats.posts_seen, 3);
        assert_eq!(stats.candidates_scored, 3);
        assert_eq!(stats.above_threshold, 2);
        assert_eq!(stats.builds_today, 1);
        assert_eq!(stats.slots_used_today, 2);
        assert_eq!(stats.by_status["built"], 1);
        assert_eq!(stats.by_status["admitted"], 1);
        assert_eq!(stats.by_status["rejected_quota_exhausted"], 0);

        let top = top_candidates(&pool, 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].post_id, "high");
        assert_eq!(top[0].status, Some(BuildStatus::Built));
        assert_eq!(top[0].project_ref.as_deref(), Some("/projects/high"));
        assert_eq!(top[1].post_id, "edge");
        assert_eq!(top[1].normalized, 8.0);
    }
}
