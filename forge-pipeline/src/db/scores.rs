//! Candidate scores
//!
//! A candidate has at most one stored score. The first score written is
//! canonical; later writes are ignored and the stored value is returned.

use chrono::{DateTime, Utc};
use forge_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use super::to_db_time;
use crate::models::Score;

/// Store a score unless one exists, returning the canonical stored score
pub async fn store_score(
    pool: &SqlitePool,
    post_id: &str,
    score: &Score,
    scored_at: DateTime<Utc>,
) -> Result<Score> {
    sqlx::query(
        r#"
        INSERT INTO scores (
            post_id, technical_innovation, business_potential, practical_value,
            engagement, category_bonus, total, scored_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(post_id) DO NOTHING
        "#,
    )
    .bind(post_id)
    .bind(score.technical_innovation)
    .bind(score.business_potential)
    .bind(score.practical_value)
    .bind(score.engagement)
    .bind(score.category_bonus)
    .bind(score.total)
    .bind(to_db_time(&scored_at))
    .execute(pool)
    .await?;

    load_score(pool, post_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Score for {} vanished after insert", post_id)))
}

/// Load the stored score for a candidate
pub async fn load_score(pool: &SqlitePool, post_id: &str) -> Result<Option<Score>> {
    let row = sqlx::query(
        r#"
        SELECT technical_innovation, business_potential, practical_value,
               engagement, category_bonus
        FROM scores WHERE post_id = ?
        "#,
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        Score::from_parts(
            row.get("technical_innovation"),
            row.get("business_potential"),
            row.get("practical_value"),
            row.get("engagement"),
            row.get("category_bonus"),
        )
    }))
}
