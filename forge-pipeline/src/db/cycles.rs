//! Scan cycle history

use chrono::{DateTime, Utc};
use forge_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{from_db_time, to_db_time};

/// Outcome label of a cycle that has not finished (or crashed)
pub const OUTCOME_RUNNING: &str = "running";
pub const OUTCOME_COMPLETED: &str = "completed";

/// Per-cycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounts {
    pub fetched: u32,
    pub ingested: u32,
    pub skipped: u32,
    pub malformed: u32,
    pub admitted: u32,
    pub rejected_low_score: u32,
    pub rejected_quota: u32,
    pub built: u32,
    pub build_failed: u32,
}

/// Stored scan cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanCycleRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: String,
    pub counts: CycleCounts,
    pub error: Option<String>,
}

pub async fn start_cycle(pool: &SqlitePool, id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT INTO scan_cycles (id, started_at, outcome) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(to_db_time(&started_at))
        .bind(OUTCOME_RUNNING)
        .execute(pool)
        .await?;
    Ok(())
}

/// Close a cycle with its outcome and final counters
pub async fn finish_cycle(
    pool: &SqlitePool,
    id: Uuid,
    finished_at: DateTime<Utc>,
    outcome: &str,
    counts: &CycleCounts,
    error: Option<&str>,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE scan_cycles SET
            finished_at = ?, outcome = ?,
            fetched = ?, ingested = ?, skipped = ?, malformed = ?,
            admitted = ?, rejected_low_score = ?, rejected_quota = ?,
            built = ?, build_failed = ?, error = ?
        WHERE id = ?
        "#,
    )
    .bind(to_db_time(&finished_at))
    .bind(outcome)
    .bind(counts.fetched)
    .bind(counts.ingested)
    .bind(counts.skipped)
    .bind(counts.malformed)
    .bind(counts.admitted)
    .bind(counts.rejected_low_score)
    .bind(counts.rejected_quota)
    .bind(counts.built)
    .bind(counts.build_failed)
    .bind(error)
    .bind(id.to_string())
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("Scan cycle {}", id)));
    }
    Ok(())
}

/// Most recent cycles, newest first
pub async fn recent_cycles(pool: &SqlitePool, limit: i64) -> Result<Vec<ScanCycleRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, started_at, finished_at, outcome,
               fetched, ingested, skipped, malformed,
               admitted, rejected_low_score, rejected_quota,
               built, build_failed, error
        FROM scan_cycles
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let id = Uuid::parse_str(&id)
                .map_err(|e| Error::Internal(format!("Invalid cycle id {:?}: {}", id, e)))?;
            let finished_at: Option<String> = row.get("finished_at");

            Ok(ScanCycleRecord {
                id,
                started_at: from_db_time(row.get("started_at"))?,
                finished_at: finished_at.as_deref().map(from_db_time).transpose()?,
                outcome: row.get("outcome"),
                counts: CycleCounts {
                    fetched: row.get("fetched"),
                    ingested: row.get("ingested"),
                    skipped: row.get("skipped"),
                    malformed: row.get("malformed"),
                    admitted: row.get("admitted"),
                    rejected_low_score: row.get("rejected_low_score"),
                    rejected_quota: row.get("rejected_quota"),
                    built: row.get("built"),
                    build_failed: row.get("build_failed"),
                },
                error: row.get("error"),
            })
        })
        .collect()
}
