//! Build Orchestrator
//!
//! Claims an admitted candidate, runs the materializer and moves its build
//! record to `built` or `build_failed`. The admitted record is already
//! durable before the materializer starts, so a crash mid-build is
//! recovered as `build_failed` once its claim goes stale.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::builds::{claim_build, complete_build, fail_build, load_record};
use crate::db::scores::load_score;
use crate::error::PipelineError;
use crate::models::{BuildOutcome, BuildRecord, BuildStatus, Candidate};
use crate::services::materializer::{MaterializeRequest, Materializer};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

#[derive(Clone)]
pub struct BuildOrchestrator {
    db: SqlitePool,
    materializer: Arc<dyn Materializer>,
}

impl BuildOrchestrator {
    pub fn new(db: SqlitePool, materializer: Arc<dyn Materializer>) -> Self {
        Self { db, materializer }
    }

    /// Materialize an admitted candidate under a one-off claim
    pub async fn build(&self, candidate: &Candidate) -> Result<BuildOutcome, PipelineError> {
        self.build_as(candidate, &Uuid::new_v4().to_string()).await
    }

    /// Materialize an admitted candidate, claiming it for `claimant`
    ///
    /// A candidate already `built` or `build_failed` gets its stored
    /// outcome back without touching the materializer; one with no record
    /// or a rejected record is [`PipelineError::NotAdmitted`]. When another
    /// builder holds the claim the result is
    /// [`PipelineError::BuildInProgress`].
    pub async fn build_as(
        &self,
        candidate: &Candidate,
        claimant: &str,
    ) -> Result<BuildOutcome, PipelineError> {
        let post_id = candidate.post_id.clone();

        let record = load_record(&self.db, &post_id)
            .await?
            .ok_or_else(|| PipelineError::NotAdmitted(post_id.clone()))?;
        if record.status != BuildStatus::Admitted {
            return stored_outcome(record);
        }

        let claimed = retry_on_lock("claim_build", DEFAULT_MAX_LOCK_WAIT_MS, || {
            claim_build(&self.db, &post_id, claimant, Utc::now())
        })
        .await?;
        if !claimed {
            debug!(post_id = %post_id, claimant, "Build claimed elsewhere");
            return self.reload_outcome(&post_id).await;
        }

        let total = load_score(&self.db, &post_id)
            .await?
            .map(|score| score.total)
            .unwrap_or_default();
        let request = MaterializeRequest {
            post_id: post_id.clone(),
            category: candidate.category,
            seed_text: candidate.seed_text.clone(),
            title: candidate.title.clone(),
            total,
        };

        let materializer = Arc::clone(&self.materializer);
        let result = tokio::task::spawn_blocking(move || materializer.materialize(&request))
            .await
            .map_err(|e| PipelineError::MaterializerFailure(format!("materializer task failed: {}", e)))
            .and_then(|r| r.map_err(|e| PipelineError::MaterializerFailure(e.to_string())));

        let now = Utc::now();
        match result {
            Ok(project_ref) => {
                let updated = retry_on_lock("complete_build", DEFAULT_MAX_LOCK_WAIT_MS, || {
                    complete_build(&self.db, &post_id, claimant, &project_ref, now)
                })
                .await?;
                if !updated {
                    return self.reload_outcome(&post_id).await;
                }
                info!(post_id = %post_id, project_ref = %project_ref, "Build completed");
                Ok(BuildOutcome::Built { project_ref })
            }
            Err(failure) => {
                let detail = failure.to_string();
                let updated = retry_on_lock("fail_build", DEFAULT_MAX_LOCK_WAIT_MS, || {
                    fail_build(&self.db, &post_id, claimant, &detail, now)
                })
                .await?;
                if !updated {
                    return self.reload_outcome(&post_id).await;
                }
                warn!(post_id = %post_id, error = %detail, "Build failed; quota slot stays consumed");
                Ok(BuildOutcome::Failed { error: detail })
            }
        }
    }

    /// Record changed underneath us (claimed or reconciled); report what is stored
    async fn reload_outcome(&self, post_id: &str) -> Result<BuildOutcome, PipelineError> {
        let record = load_record(&self.db, post_id)
            .await?
            .ok_or_else(|| PipelineError::NotAdmitted(post_id.to_string()))?;
        stored_outcome(record)
    }
}

fn stored_outcome(record: BuildRecord) -> Result<BuildOutcome, PipelineError> {
    match record.status {
        BuildStatus::Built => Ok(BuildOutcome::Built {
            project_ref: record.project_ref.unwrap_or_default(),
        }),
        BuildStatus::BuildFailed => Ok(BuildOutcome::Failed {
            error: record.detail.unwrap_or_default(),
        }),
        BuildStatus::Admitted => Err(PipelineError::BuildInProgress(record.post_id)),
        _ => Err(PipelineError::NotAdmitted(record.post_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::quota::{slots_used, try_admit};
    use crate::db::builds::record_low_score;
    use crate::models::RawPost;
    use crate::services::ingest::{IngestOutcome, IngestionBuffer};
    use crate::services::materializer::MaterializeError;
    use forge_common::db::init_memory_database;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls; fails when `fail` is set
    struct CountingMaterializer {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingMaterializer {
        fn new(fail: bool) -> Arc<Self> {
            Self::slow(fail, Duration::ZERO)
        }

        fn slow(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay,
            })
        }
    }

    impl Materializer for CountingMaterializer {
        fn materialize(&self, request: &MaterializeRequest) -> Result<String, MaterializeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                Err(MaterializeError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only filesystem",
                )))
            } else {
                Ok(format!("/projects/{}", request.post_id))
            }
        }
    }

    async fn ingest(db: &SqlitePool, id: &str) -> Candidate {
        match IngestionBuffer::new(db.clone())
            .ingest(RawPost::new(id, "a cli tool", "bob", 0, 0))
            .await
            .unwrap()
        {
            IngestOutcome::Ingested(candidate) => candidate,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_successful_build_runs_once() {
        let db = init_memory_database().await.unwrap();
        let candidate = ingest(&db, "p1").await;
        try_admit(&db, "p1", "2026-01-01", 3, Utc::now()).await.unwrap();

        let materializer = CountingMaterializer::new(false);
        let orchestrator = BuildOrchestrator::new(db.clone(), materializer.clone());

        let first = orchestrator.build(&candidate).await.unwrap();
        let second = orchestrator.build(&candidate).await.unwrap();

        let expected = BuildOutcome::Built {
            project_ref: "/projects/p1".to_string(),
        };
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(materializer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_keeps_slot() {
        let db = init_memory_database().await.unwrap();
        let candidate = ingest(&db, "p1").await;
        try_admit(&db, "p1", "2026-01-01", 3, Utc::now()).await.unwrap();

        let materializer = CountingMaterializer::new(true);
        let orchestrator = BuildOrchestrator::new(db.clone(), materializer.clone());

        let outcome = orchestrator.build(&candidate).await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Failed { ref error } if error.contains("read-only")));

        // Not retried
        orchestrator.build(&candidate).await.unwrap();
        assert_eq!(materializer.calls.load(Ordering::SeqCst), 1);

        let record = load_record(&db, "p1").await.unwrap().unwrap();
        assert_eq!(record.status, BuildStatus::BuildFailed);
        assert_eq!(slots_used(&db, "2026-01-01").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_not_admitted_never_materializes() {
        let db = init_memory_database().await.unwrap();
        let undecided = ingest(&db, "p1").await;
        let rejected = ingest(&db, "p2").await;
        record_low_score(&db, "p2", Utc::now()).await.unwrap();

        let materializer = CountingMaterializer::new(false);
        let orchestrator = BuildOrchestrator::new(db.clone(), materializer.clone());

        assert!(matches!(
            orchestrator.build(&undecided).await,
            Err(PipelineError::NotAdmitted(_))
        ));
        assert!(matches!(
            orchestrator.build(&rejected).await,
            Err(PipelineError::NotAdmitted(_))
        ));
        assert_eq!(materializer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_builds_materialize_once() {
        let db = init_memory_database().await.unwrap();
        let candidate = ingest(&db, "p1").await;
        try_admit(&db, "p1", "2026-01-01", 3, Utc::now()).await.unwrap();

        let materializer = CountingMaterializer::slow(false, Duration::from_millis(300));
        let orchestrator = BuildOrchestrator::new(db.clone(), materializer.clone());

        let (first, second) = tokio::join!(
            orchestrator.build_as(&candidate, "cycle-a"),
            orchestrator.build_as(&candidate, "cycle-b"),
        );

        let (won, lost) = match (first, second) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            other => panic!("expected one winner, got {:?}", other),
        };
        assert!(matches!(won, BuildOutcome::Built { .. }));
        assert!(matches!(lost, PipelineError::BuildInProgress(ref id) if id == "p1"));
        assert_eq!(materializer.calls.load(Ordering::SeqCst), 1);

        let record = load_record(&db, "p1").await.unwrap().unwrap();
        assert_eq!(record.status, BuildStatus::Built);
        assert_eq!(slots_used(&db, "2026-01-01").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claimed_record_is_left_to_its_claimant() {
        let db = init_memory_database().await.unwrap();
        let candidate = ingest(&db, "p1").await;
        try_admit(&db, "p1", "2026-01-01", 3, Utc::now()).await.unwrap();
        claim_build(&db, "p1", "other-process", Utc::now()).await.unwrap();

        let materializer = CountingMaterializer::new(false);
        let orchestrator = BuildOrchestrator::new(db.clone(), materializer.clone());

        assert!(matches!(
            orchestrator.build(&candidate).await,
            Err(PipelineError::BuildInProgress(_))
        ));
        assert_eq!(materializer.calls.load(Ordering::SeqCst), 0);
        let record = load_record(&db, "p1").await.unwrap().unwrap();
        assert_eq!(record.claimed_by.as_deref(), Some("other-process"));
    }
}
