//! Build records
//!
//! One row per candidate, keyed by post id. Status transitions are
//! guarded in SQL (`WHERE status = 'admitted'`) so a record can reach
//! `built` at most once no matter how many callers race.
//!
//! An admitted record is claimed before its materializer runs. Only the
//! claimant may finish it, and reconciliation only fails claims that are
//! stale or whose scan cycle is no longer running.

use chrono::{DateTime, Duration, Utc};
use forge_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use super::cycles::OUTCOME_RUNNING;
use super::{from_db_time, to_db_time};
use crate::models::{BuildRecord, BuildStatus};

/// Detail written when a crash left a record in `admitted`
pub const INTERRUPTED_DETAIL: &str = "interrupted before completion";

/// Age after which an unfinished claim (or an unclaimed admission) is
/// considered abandoned
pub const CLAIM_TTL_MINUTES: i64 = 60;

const RECORD_COLUMNS: &str =
    "post_id, status, quota_day, project_ref, detail, claimed_by, created_at, updated_at";

/// Fetch a build record using any executor (pool or open transaction)
pub async fn fetch_record<'e, E>(executor: E, post_id: &str) -> Result<Option<BuildRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM build_records WHERE post_id = ?",
        RECORD_COLUMNS
    ))
    .bind(post_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Load the build record for a candidate
pub async fn load_record(pool: &SqlitePool, post_id: &str) -> Result<Option<BuildRecord>> {
    fetch_record(pool, post_id).await
}

/// Record a low-score rejection unless a record already exists
///
/// Returns the stored record, which is the pre-existing one when another
/// decision got there first.
pub async fn record_low_score(
    pool: &SqlitePool,
    post_id: &str,
    now: DateTime<Utc>,
) -> Result<BuildRecord> {
    let stamp = to_db_time(&now);
    sqlx::query(
        r#"
        INSERT INTO build_records (post_id, status, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(post_id) DO NOTHING
        "#,
    )
    .bind(post_id)
    .bind(BuildStatus::RejectedLowScore.as_str())
    .bind(&stamp)
    .bind(&stamp)
    .execute(pool)
    .await?;

    fetch_record(pool, post_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Build record for {} vanished after insert", post_id)))
}

/// Claim an admitted, unclaimed record for `claimant`
///
/// Returns `true` only for the single caller that won the claim; that
/// caller alone may materialize the candidate.
pub async fn claim_build(
    pool: &SqlitePool,
    post_id: &str,
    claimant: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let stamp = to_db_time(&now);
    let updated = sqlx::query(
        r#"
        UPDATE build_records
        SET claimed_by = ?, claimed_at = ?, updated_at = ?
        WHERE post_id = ? AND status = 'admitted' AND claimed_by IS NULL
        "#,
    )
    .bind(claimant)
    .bind(&stamp)
    .bind(&stamp)
    .bind(post_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Move a claimed record to `built`
///
/// Returns `false` when the record is not (or no longer) `admitted`
/// under `claimant`'s claim.
pub async fn complete_build(
    pool: &SqlitePool,
    post_id: &str,
    claimant: &str,
    project_ref: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE build_records
        SET status = 'built', project_ref = ?, detail = NULL, updated_at = ?
        WHERE post_id = ? AND status = 'admitted' AND claimed_by = ?
        "#,
    )
    .bind(project_ref)
    .bind(to_db_time(&now))
    .bind(post_id)
    .bind(claimant)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Move a claimed record to `build_failed`; the quota slot is kept
pub async fn fail_build(
    pool: &SqlitePool,
    post_id: &str,
    claimant: &str,
    detail: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE build_records
        SET status = 'build_failed', detail = ?, updated_at = ?
        WHERE post_id = ? AND status = 'admitted' AND claimed_by = ?
        "#,
    )
    .bind(detail)
    .bind(to_db_time(&now))
    .bind(post_id)
    .bind(claimant)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Fail admitted records whose builder is gone
///
/// A record qualifies when its claim (or, unclaimed, its admission) is
/// older than [`CLAIM_TTL_MINUTES`], or when it was claimed by a scan
/// cycle that has already finished. Live claims are left alone.
pub async fn reconcile_interrupted(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let stale_before = now - Duration::minutes(CLAIM_TTL_MINUTES);
    let updated = sqlx::query(
        r#"
        UPDATE build_records
        SET status = 'build_failed', detail = ?, updated_at = ?
        WHERE status = 'admitted'
          AND (
            COALESCE(claimed_at, updated_at) < ?
            OR claimed_by IN (SELECT id FROM scan_cycles WHERE outcome != ?)
          )
        "#,
    )
    .bind(INTERRUPTED_DETAIL)
    .bind(to_db_time(&now))
    .bind(to_db_time(&stale_before))
    .bind(OUTCOME_RUNNING)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated)
}

/// Records, newest first, optionally filtered by status
pub async fn list_records(
    pool: &SqlitePool,
    status: Option<BuildStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<BuildRecord>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(&format!(
                "SELECT {} FROM build_records WHERE status = ?
                 ORDER BY updated_at DESC, post_id LIMIT ? OFFSET ?",
                RECORD_COLUMNS
            ))
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM build_records
                 ORDER BY updated_at DESC, post_id LIMIT ? OFFSET ?",
                RECORD_COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(record_from_row).collect()
}

/// Number of records, optionally filtered by status
pub async fn count_records(pool: &SqlitePool, status: Option<BuildStatus>) -> Result<i64> {
    let count: i64 = match status {
        Some(status) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM build_records WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM build_records")
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

/// `built` records that consumed a slot of `quota_day`
pub async fn count_built_on(pool: &SqlitePool, quota_day: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM build_records WHERE status = 'built' AND quota_day = ?",
    )
    .bind(quota_day)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub(crate) fn record_from_row(row: &SqliteRow) -> Result<BuildRecord> {
    let status: String = row.get("status");
    let status: BuildStatus = status.parse().map_err(Error::Internal)?;

    Ok(BuildRecord {
        post_id: row.get("post_id"),
        status,
        quota_day: row.get("quota_day"),
        project_ref: row.get("project_ref"),
        detail: row.get("detail"),
        claimed_by: row.get("claimed_by"),
        created_at: from_db_time(row.get("created_at"))?,
        updated_at: from_db_time(row.get("updated_at"))?,
    })
}
