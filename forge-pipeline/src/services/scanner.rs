//! Scan cycle
//!
//! One cycle: reconcile abandoned builds, finish candidates a previous
//! cycle left undecided, then walk the feed pages through
//! ingest → score → admit → build. Each candidate commits independently,
//! so an aborted cycle leaves nothing half-done in the ledger; posts it
//! never reached are simply fetched again next time.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use forge_common::{EventBus, ForgeEvent};

use crate::config::PipelineConfig;
use crate::db::builds::reconcile_interrupted;
use crate::db::cycles::{finish_cycle, start_cycle, CycleCounts, OUTCOME_COMPLETED};
use crate::db::posts::undecided_candidates;
use crate::db::scores::store_score;
use crate::error::PipelineError;
use crate::feed::FeedSource;
use crate::models::{BuildOutcome, BuildStatus, Candidate, RawPost};
use crate::services::admission::AdmissionController;
use crate::services::builder::BuildOrchestrator;
use crate::services::ingest::{IngestOutcome, IngestionBuffer};
use crate::services::materializer::Materializer;
use crate::services::scoring::ScoringEngine;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Undecided candidates resumed per cycle
const MAX_RESUMED_PER_CYCLE: i64 = 500;

/// Summary of one scan cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `completed`, or the error kind that aborted the cycle
    pub outcome: String,
    pub counts: CycleCounts,
    /// Builds found interrupted and marked failed at cycle start
    pub reconciled: u64,
    /// Candidates from earlier cycles decided in this one
    pub resumed: u32,
    pub error: Option<String>,
}

impl CycleReport {
    pub fn is_aborted(&self) -> bool {
        self.outcome != OUTCOME_COMPLETED
    }
}

/// What happened to one post
#[derive(Debug, Clone, PartialEq)]
enum PostResult {
    Skipped,
    /// Not started because the cycle is aborting
    Deferred,
    Decided {
        status: BuildStatus,
        outcome: Option<BuildOutcome>,
    },
}

/// Shared between the posts of one cycle
#[derive(Default)]
struct CycleProgress {
    aborting: AtomicBool,
    ingested: AtomicU32,
}

impl CycleProgress {
    fn note(&self, result: &Result<PostResult, PipelineError>) {
        if matches!(result, Err(e) if e.is_cycle_fatal()) {
            // Stop starting new posts; in-flight ones finish
            self.aborting.store(true, Ordering::SeqCst);
        }
    }
}

/// The ingestion → scoring → admission → build pipeline
pub struct Pipeline {
    db: SqlitePool,
    feed: Arc<dyn FeedSource>,
    ingestion: IngestionBuffer,
    scoring: ScoringEngine,
    admission: AdmissionController,
    builder: BuildOrchestrator,
    event_bus: EventBus,
    worker_count: usize,
    max_pages: u32,
}

impl Pipeline {
    pub fn new(
        db: SqlitePool,
        config: &PipelineConfig,
        feed: Arc<dyn FeedSource>,
        materializer: Arc<dyn Materializer>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            ingestion: IngestionBuffer::new(db.clone()),
            scoring: ScoringEngine::new(config.category_bonus.clone()),
            admission: AdmissionController::from_config(db.clone(), config),
            builder: BuildOrchestrator::new(db.clone(), materializer),
            db,
            feed,
            event_bus,
            worker_count: config.worker_count.max(1),
            max_pages: config.feed.max_pages_per_scan.max(1),
        }
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    /// Run one scan cycle to completion or abort
    ///
    /// Never returns an error: a fatal failure is recorded in the report
    /// (and the ledger, when reachable) and retried next interval.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut counts = CycleCounts::default();
        let mut reconciled = 0;
        let mut resumed = 0;

        info!(cycle_id = %cycle_id, feed = self.feed.name(), "Scan cycle started");
        self.event_bus.emit_lossy(ForgeEvent::ScanStarted {
            cycle_id,
            timestamp: started_at,
        });

        let result = match start_cycle(&self.db, cycle_id, started_at).await {
            Ok(()) => {
                self.run_steps(cycle_id, &mut counts, &mut reconciled, &mut resumed)
                    .await
            }
            Err(e) => Err(PipelineError::from(e)),
        };

        let finished_at = Utc::now();
        let (outcome, error_text) = match &result {
            Ok(()) => (OUTCOME_COMPLETED.to_string(), None),
            Err(e) => (e.kind().to_string(), Some(e.to_string())),
        };

        if let Err(e) = finish_cycle(
            &self.db,
            cycle_id,
            finished_at,
            &outcome,
            &counts,
            error_text.as_deref(),
        )
        .await
        {
            warn!(cycle_id = %cycle_id, error = %e, "Failed to record scan cycle outcome");
        }

        match &result {
            Ok(()) => {
                info!(
                    cycle_id = %cycle_id,
                    fetched = counts.fetched,
                    ingested = counts.ingested,
                    skipped = counts.skipped,
                    malformed = counts.malformed,
                    admitted = counts.admitted,
                    rejected_low_score = counts.rejected_low_score,
                    rejected_quota = counts.rejected_quota,
                    built = counts.built,
                    build_failed = counts.build_failed,
                    "Scan cycle completed"
                );
                self.event_bus.emit_lossy(ForgeEvent::ScanCompleted {
                    cycle_id,
                    ingested: counts.ingested,
                    admitted: counts.admitted,
                    built: counts.built,
                    timestamp: finished_at,
                });
            }
            Err(e) => {
                error!(
                    cycle_id = %cycle_id,
                    cycle_started = %started_at,
                    kind = e.kind(),
                    error = %e,
                    "Scan cycle aborted"
                );
                self.event_bus.emit_lossy(ForgeEvent::ScanAborted {
                    cycle_id,
                    error: e.to_string(),
                    timestamp: finished_at,
                });
            }
        }

        CycleReport {
            cycle_id,
            started_at,
            finished_at,
            outcome,
            counts,
            reconciled,
            resumed,
            error: error_text,
        }
    }

    async fn run_steps(
        &self,
        cycle_id: Uuid,
        counts: &mut CycleCounts,
        reconciled: &mut u64,
        resumed: &mut u32,
    ) -> Result<(), PipelineError> {
        *reconciled = retry_on_lock("reconcile_interrupted", DEFAULT_MAX_LOCK_WAIT_MS, || {
            reconcile_interrupted(&self.db, Utc::now())
        })
        .await?;
        if *reconciled > 0 {
            warn!(
                cycle_id = %cycle_id,
                count = *reconciled,
                "Interrupted builds marked build_failed"
            );
        }

        let progress = CycleProgress::default();

        let pending = undecided_candidates(&self.db, MAX_RESUMED_PER_CYCLE).await?;
        if !pending.is_empty() {
            info!(cycle_id = %cycle_id, count = pending.len(), "Resuming undecided candidates");
        }
        let results: Vec<_> = stream::iter(pending)
            .map(|candidate| self.resume_candidate(cycle_id, candidate, &progress))
            .buffered(self.worker_count)
            .collect()
            .await;
        *resumed = results
            .iter()
            .filter(|r| matches!(r, Ok(PostResult::Decided { .. })))
            .count() as u32;
        self.tally_all(cycle_id, counts, results)?;

        let mut cursor: Option<String> = None;
        for page_number in 1..=self.max_pages {
            let page = self.feed.fetch_page(cursor.as_deref()).await?;
            debug!(
                cycle_id = %cycle_id,
                page = page_number,
                posts = page.posts.len(),
                unparsable = page.unparsable,
                "Fetched feed page"
            );

            counts.fetched += page.posts.len() as u32 + page.unparsable;
            counts.malformed += page.unparsable;

            let results: Vec<_> = stream::iter(page.posts)
                .map(|raw| self.process_post(cycle_id, raw, &progress))
                .buffered(self.worker_count)
                .collect()
                .await;
            counts.ingested = progress.ingested.load(Ordering::SeqCst);
            self.tally_all(cycle_id, counts, results)?;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(())
    }

    /// Fold results into the counters; returns the first fatal error
    fn tally_all(
        &self,
        cycle_id: Uuid,
        counts: &mut CycleCounts,
        results: Vec<Result<PostResult, PipelineError>>,
    ) -> Result<(), PipelineError> {
        let mut fatal = None;

        for result in results {
            match result {
                Ok(PostResult::Skipped) => counts.skipped += 1,
                Ok(PostResult::Deferred) => {}
                Ok(PostResult::Decided { status, outcome }) => {
                    match status {
                        BuildStatus::RejectedLowScore => counts.rejected_low_score += 1,
                        BuildStatus::RejectedQuotaExhausted => counts.rejected_quota += 1,
                        _ => counts.admitted += 1,
                    }
                    match outcome {
                        Some(BuildOutcome::Built { .. }) => counts.built += 1,
                        Some(BuildOutcome::Failed { .. }) => counts.build_failed += 1,
                        None => {}
                    }
                }
                Err(PipelineError::MalformedInput(reason)) => {
                    warn!(cycle_id = %cycle_id, reason = %reason, "Dropping malformed post");
                    counts.malformed += 1;
                }
                Err(e) if e.is_cycle_fatal() => {
                    fatal.get_or_insert(e);
                }
                Err(e) => warn!(cycle_id = %cycle_id, error = %e, "Candidate processing failed"),
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn resume_candidate(
        &self,
        cycle_id: Uuid,
        candidate: Candidate,
        progress: &CycleProgress,
    ) -> Result<PostResult, PipelineError> {
        if progress.aborting.load(Ordering::SeqCst) {
            return Ok(PostResult::Deferred);
        }
        let result = self.decide_and_build(cycle_id, &candidate).await;
        progress.note(&result);
        result
    }

    async fn process_post(
        &self,
        cycle_id: Uuid,
        raw: RawPost,
        progress: &CycleProgress,
    ) -> Result<PostResult, PipelineError> {
        if progress.aborting.load(Ordering::SeqCst) {
            return Ok(PostResult::Deferred);
        }

        let display_id = raw.display_id();
        let result = match self.ingestion.ingest(raw).await {
            Ok(IngestOutcome::Skipped { .. }) => Ok(PostResult::Skipped),
            Ok(IngestOutcome::Ingested(candidate)) => {
                progress.ingested.fetch_add(1, Ordering::SeqCst);
                self.decide_and_build(cycle_id, &candidate).await
            }
            Err(e) => Err(e),
        };

        progress.note(&result);
        if let Err(e) = &result {
            debug!(post_id = %display_id, error = %e, "Post not processed");
        }
        result
    }

    /// Score, admit and (when admitted) build one ingested candidate
    async fn decide_and_build(
        &self,
        cycle_id: Uuid,
        candidate: &Candidate,
    ) -> Result<PostResult, PipelineError> {
        let computed = self.scoring.score(candidate);
        let score = retry_on_lock("store_score", DEFAULT_MAX_LOCK_WAIT_MS, || {
            store_score(&self.db, &candidate.post_id, &computed, Utc::now())
        })
        .await?;

        let record = self.admission.admit_at(candidate, &score, Utc::now()).await?;

        match record.status {
            BuildStatus::RejectedLowScore | BuildStatus::RejectedQuotaExhausted => {
                self.event_bus.emit_lossy(ForgeEvent::CandidateRejected {
                    cycle_id,
                    post_id: candidate.post_id.clone(),
                    total: score.total,
                    reason: record.status.as_str().to_string(),
                    timestamp: Utc::now(),
                });
                return Ok(PostResult::Decided {
                    status: record.status,
                    outcome: None,
                });
            }
            BuildStatus::Admitted => {
                self.event_bus.emit_lossy(ForgeEvent::CandidateAdmitted {
                    cycle_id,
                    post_id: candidate.post_id.clone(),
                    total: score.total,
                    quota_day: record.quota_day.clone().unwrap_or_default(),
                    timestamp: Utc::now(),
                });
            }
            // Decided elsewhere in the meantime
            BuildStatus::Built | BuildStatus::BuildFailed => return Ok(PostResult::Skipped),
        }

        let outcome = match self.builder.build_as(candidate, &cycle_id.to_string()).await {
            Ok(outcome) => outcome,
            Err(PipelineError::BuildInProgress(post_id)) => {
                debug!(cycle_id = %cycle_id, post_id = %post_id, "Build owned by another builder");
                return Ok(PostResult::Skipped);
            }
            Err(e) => return Err(e),
        };
        match &outcome {
            BuildOutcome::Built { project_ref } => {
                self.event_bus.emit_lossy(ForgeEvent::BuildCompleted {
                    cycle_id,
                    post_id: candidate.post_id.clone(),
                    project_ref: project_ref.clone(),
                    timestamp: Utc::now(),
                })
            }
            BuildOutcome::Failed { error } => self.event_bus.emit_lossy(ForgeEvent::BuildFailed {
                cycle_id,
                post_id: candidate.post_id.clone(),
                error: error.clone(),
                timestamp: Utc::now(),
            }),
        }

        Ok(PostResult::Decided {
            status: record.status,
            outcome: Some(outcome),
        })
    }
}
