//! Daily build quota
//!
//! One `quota_windows` row per quota day. A slot is taken with a
//! conditional increment inside the same write transaction that creates
//! the build record, so concurrent admissions can never overshoot the
//! limit and a slot is never taken without a matching `admitted` record.

use chrono::{DateTime, Utc};
use forge_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::debug;

use super::builds::fetch_record;
use super::to_db_time;
use crate::models::{BuildRecord, BuildStatus};

/// Atomically decide admission for an above-threshold candidate
///
/// Inside one transaction:
/// 1. make sure the quota row for `quota_day` exists (a write, so the
///    transaction holds the ledger write lock from here on)
/// 2. return the existing record if this candidate was already decided
/// 3. take a slot if `slots_used < limit`
/// 4. record `admitted` or `rejected_quota_exhausted`
pub async fn try_admit(
    pool: &SqlitePool,
    post_id: &str,
    quota_day: &str,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<BuildRecord> {
    let stamp = to_db_time(&now);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO quota_windows (day, slots_used, updated_at)
        VALUES (?, 0, ?)
        ON CONFLICT(day) DO NOTHING
        "#,
    )
    .bind(quota_day)
    .bind(&stamp)
    .execute(&mut *tx)
    .await?;

    if let Some(existing) = fetch_record(&mut *tx, post_id).await? {
        tx.commit().await?;
        debug!(
            "Candidate {} already decided as {}, quota untouched",
            post_id, existing.status
        );
        return Ok(existing);
    }

    let taken = sqlx::query(
        r#"
        UPDATE quota_windows
        SET slots_used = slots_used + 1, updated_at = ?
        WHERE day = ? AND slots_used < ?
        "#,
    )
    .bind(&stamp)
    .bind(quota_day)
    .bind(i64::from(limit))
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    let (status, day) = if taken {
        (BuildStatus::Admitted, Some(quota_day))
    } else {
        (BuildStatus::RejectedQuotaExhausted, None)
    };

    sqlx::query(
        r#"
        INSERT INTO build_records (post_id, status, quota_day, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(status.as_str())
    .bind(day)
    .bind(&stamp)
    .bind(&stamp)
    .execute(&mut *tx)
    .await?;

    let record = fetch_record(&mut *tx, post_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Build record for {} missing in transaction", post_id)))?;

    tx.commit().await?;
    Ok(record)
}

/// Slots consumed on `quota_day` (0 when the day has no row yet)
pub async fn slots_used(pool: &SqlitePool, quota_day: &str) -> Result<u32> {
    let used: Option<i64> =
        sqlx::query_scalar("SELECT slots_used FROM quota_windows WHERE day = ?")
            .bind(quota_day)
            .fetch_optional(pool)
            .await?;
    Ok(used.unwrap_or(0).max(0) as u32)
}
