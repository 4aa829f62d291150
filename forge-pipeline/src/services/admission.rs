//! Admission Controller
//!
//! Gates scored candidates on the threshold and the daily quota. The
//! check-and-increment of the quota is a single ledger transaction (see
//! [`crate::db::quota::try_admit`]); nothing here holds state in memory,
//! so several controllers (or processes) can share one ledger.

use chrono::{DateTime, FixedOffset, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::{quota_day, PipelineConfig, ScoreThreshold};
use crate::db::builds::{load_record, record_low_score};
use crate::db::quota::try_admit;
use crate::error::PipelineError;
use crate::models::{BuildRecord, BuildStatus, Candidate, Decision, Score};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

#[derive(Clone)]
pub struct AdmissionController {
    db: SqlitePool,
    threshold: ScoreThreshold,
    daily_limit: u32,
    quota_offset: FixedOffset,
}

impl AdmissionController {
    pub fn new(
        db: SqlitePool,
        threshold: ScoreThreshold,
        daily_limit: u32,
        quota_offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            threshold,
            daily_limit,
            quota_offset,
        }
    }

    pub fn from_config(db: SqlitePool, config: &PipelineConfig) -> Self {
        Self::new(
            db,
            config.threshold,
            config.daily_build_limit,
            config.quota_offset,
        )
    }

    pub async fn admit(
        &self,
        candidate: &Candidate,
        score: &Score,
    ) -> Result<Decision, PipelineError> {
        Ok(self
            .admit_at(candidate, score, Utc::now())
            .await?
            .status
            .decision())
    }

    /// Decide admission at `now`, returning the stored build record
    ///
    /// Re-entry for an already-decided candidate returns the existing
    /// record untouched.
    pub async fn admit_at(
        &self,
        candidate: &Candidate,
        score: &Score,
        now: DateTime<Utc>,
    ) -> Result<BuildRecord, PipelineError> {
        let post_id = candidate.post_id.as_str();

        if let Some(existing) = load_record(&self.db, post_id).await? {
            debug!(post_id, status = %existing.status, "Candidate already decided");
            return Ok(existing);
        }

        if !self.threshold.admits(score) {
            let record = retry_on_lock("record_low_score", DEFAULT_MAX_LOCK_WAIT_MS, || {
                record_low_score(&self.db, post_id, now)
            })
            .await?;
            info!(
                post_id,
                total = score.total,
                threshold = self.threshold.raw(),
                "Candidate rejected: score below threshold"
            );
            return Ok(record);
        }

        let day = quota_day(now, self.quota_offset);
        let record = retry_on_lock("try_admit", DEFAULT_MAX_LOCK_WAIT_MS, || {
            try_admit(&self.db, post_id, &day, self.daily_limit, now)
        })
        .await?;

        match record.status {
            BuildStatus::Admitted => info!(
                post_id,
                total = score.total,
                quota_day = %day,
                "Candidate admitted"
            ),
            BuildStatus::RejectedQuotaExhausted => info!(
                post_id,
                total = score.total,
                quota_day = %day,
                limit = self.daily_limit,
                "Candidate rejected: daily quota exhausted"
            ),
            status => debug!(post_id, %status, "Candidate decided concurrently"),
        }
        Ok(record)
    }
}
