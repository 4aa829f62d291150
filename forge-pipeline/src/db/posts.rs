//! Posts and candidates
//!
//! A post and its derived candidate are written together in one
//! transaction; the post id primary key is the dedup guarantee.

use chrono::{DateTime, Utc};
use forge_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{from_db_time, to_db_time};
use crate::models::{Candidate, Category, Post, TextFeatures};

/// Has this post id been ingested before?
pub async fn post_exists(pool: &SqlitePool, post_id: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Persist a post and its candidate atomically
///
/// Returns `false` (and writes nothing) when the post id already exists,
/// including when a concurrent ingestion of the same id won the race.
pub async fn insert_post_with_candidate(
    pool: &SqlitePool,
    post: &Post,
    candidate: &Candidate,
) -> Result<bool> {
    let tags = serde_json::to_string(&post.tags)
        .map_err(|e| Error::Internal(format!("Failed to serialize tags: {}", e)))?;
    let signals = serde_json::to_string(&candidate.signals)
        .map_err(|e| Error::Internal(format!("Failed to serialize signals: {}", e)))?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO posts (id, title, text, author, posted_at, likes, comments, tags, ingested_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&post.id)
    .bind(&post.title)
    .bind(&post.text)
    .bind(&post.author)
    .bind(to_db_time(&post.posted_at))
    .bind(post.likes as i64)
    .bind(post.comments as i64)
    .bind(&tags)
    .bind(to_db_time(&post.ingested_at))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO candidates (post_id, category, normalized_text, signals, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&candidate.post_id)
    .bind(candidate.category.as_str())
    .bind(&candidate.features.normalized_text)
    .bind(&signals)
    .bind(to_db_time(&candidate.created_at))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Load a stored post
pub async fn load_post(pool: &SqlitePool, post_id: &str) -> Result<Option<Post>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, text, author, posted_at, likes, comments, tags, ingested_at
        FROM posts WHERE id = ?
        "#,
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let tags: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags)
        .map_err(|e| Error::Internal(format!("Failed to deserialize tags: {}", e)))?;

    Ok(Some(Post {
        id: row.get("id"),
        title: row.get("title"),
        text: row.get("text"),
        author: row.get("author"),
        posted_at: from_db_time(row.get("posted_at"))?,
        likes: row.get::<i64, _>("likes").max(0) as u64,
        comments: row.get::<i64, _>("comments").max(0) as u64,
        tags,
        ingested_at: from_db_time(row.get("ingested_at"))?,
    }))
}

/// Load a candidate together with the post fields it carries
pub async fn load_candidate(pool: &SqlitePool, post_id: &str) -> Result<Option<Candidate>> {
    let row = sqlx::query(
        r#"
        SELECT c.post_id, c.category, c.normalized_text, c.signals, c.created_at,
               p.title, p.text, p.likes, p.comments
        FROM candidates c
        JOIN posts p ON p.id = c.post_id
        WHERE c.post_id = ?
        "#,
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(candidate_from_row).transpose()
}

/// Candidates that were ingested but never reached a decision
///
/// Happens when a cycle aborts between ingestion and admission; these
/// are picked up again at the start of the next cycle, oldest first.
pub async fn undecided_candidates(pool: &SqlitePool, limit: i64) -> Result<Vec<Candidate>> {
    let rows = sqlx::query(
        r#"
        SELECT c.post_id, c.category, c.normalized_text, c.signals, c.created_at,
               p.title, p.text, p.likes, p.comments
        FROM candidates c
        JOIN posts p ON p.id = c.post_id
        LEFT JOIN build_records b ON b.post_id = c.post_id
        WHERE b.post_id IS NULL
        ORDER BY c.created_at, c.post_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(candidate_from_row).collect()
}

/// Number of posts ever ingested
pub async fn count_posts(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn candidate_from_row(row: &SqliteRow) -> Result<Candidate> {
    let category: String = row.get("category");
    let category: Category = category.parse().map_err(Error::Internal)?;

    let signals: String = row.get("signals");
    let signals: Vec<String> = serde_json::from_str(&signals)
        .map_err(|e| Error::Internal(format!("Failed to deserialize signals: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at: DateTime<Utc> = from_db_time(&created_at)?;

    Ok(Candidate {
        post_id: row.get("post_id"),
        category,
        features: TextFeatures {
            normalized_text: row.get("normalized_text"),
        },
        signals,
        seed_text: row.get("text"),
        title: row.get("title"),
        likes: row.get::<i64, _>("likes").max(0) as u64,
        comments: row.get::<i64, _>("comments").max(0) as u64,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawPost;
    use crate::services::ingest::derive_candidate;
    use forge_common::db::init_memory_database;

    fn sample(id: &str) -> (Post, Candidate) {
        let mut raw = RawPost::new(id, "An AI agent platform for teams", "alice", 120, 8);
        raw.title = Some("Agent hub".to_string());
        raw.tags = vec!["ai".to_string()];
        let post = Post::from_raw(raw, Utc::now()).unwrap();
        let candidate = derive_candidate(&post);
        (post, candidate)
    }

    #[tokio::test]
    async fn test_insert_then_load() {
        let pool = init_memory_database().await.unwrap();
        let (post, candidate) = sample("p1");

        assert!(insert_post_with_candidate(&pool, &post, &candidate).await.unwrap());
        assert!(post_exists(&pool, "p1").await.unwrap());

        let loaded = load_candidate(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(loaded.category, candidate.category);
        assert_eq!(loaded.features, candidate.features);
        assert_eq!(loaded.signals, candidate.signals);
        assert_eq!(loaded.likes, 120);
        assert_eq!(loaded.title.as_deref(), Some("Agent hub"));

        let stored = load_post(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(stored.tags, vec!["ai".to_string()]);
        assert_eq!(stored.author, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_noop() {
        let pool = init_memory_database().await.unwrap();
        let (post, candidate) = sample("p1");

        assert!(insert_post_with_candidate(&pool, &post, &candidate).await.unwrap());
        assert!(!insert_post_with_candidate(&pool, &post, &candidate).await.unwrap());

        assert_eq!(count_posts(&pool).await.unwrap(), 1);
        let candidates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidates")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(candidates, 1);
    }

    #[tokio::test]
    async fn test_undecided_candidates() {
        let pool = init_memory_database().await.unwrap();
        for id in ["p1", "p2"] {
            let (post, candidate) = sample(id);
            insert_post_with_candidate(&pool, &post, &candidate).await.unwrap();
        }
        crate::db::builds::record_low_score(&pool, "p1", Utc::now())
            .await
            .unwrap();

        let pending = undecided_candidates(&pool, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].post_id, "p2");
    }

    #[tokio::test]
    async fn test_missing_candidate() {
        let pool = init_memory_database().await.unwrap();
        assert!(load_candidate(&pool, "nope").await.unwrap().is_none());
        assert!(!post_exists(&pool, "nope").await.unwrap());
    }
}
