//! Scan scheduler
//!
//! Runs a cycle immediately, then once per interval until cancelled. A
//! cycle that overruns the interval delays the next tick instead of
//! firing a burst of catch-up cycles.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::scanner::{CycleReport, Pipeline};

pub struct ScanScheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    last_cycle: Arc<RwLock<Option<CycleReport>>>,
}

impl ScanScheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            last_cycle: Arc::new(RwLock::new(None)),
        }
    }

    /// Shared slot holding the most recent cycle report
    pub fn last_cycle(&self) -> Arc<RwLock<Option<CycleReport>>> {
        Arc::clone(&self.last_cycle)
    }

    /// Loop until `cancel_token` fires; returns the number of cycles run
    ///
    /// Cancellation is checked between cycles. A cycle in progress runs to
    /// completion so its ledger writes stay whole.
    pub async fn run(&self, cancel_token: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        info!(
            interval_secs = self.interval.as_secs(),
            "Scan scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.pipeline.run_cycle().await;
            cycles += 1;
            if report.is_aborted() {
                warn!(
                    cycle_id = %report.cycle_id,
                    outcome = %report.outcome,
                    "Cycle aborted; retrying next interval"
                );
            }
            *self.last_cycle.write().await = Some(report);

            if cancel_token.is_cancelled() {
                break;
            }
        }

        info!(cycles, "Scan scheduler stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::feed::StaticFeed;
    use crate::models::RawPost;
    use crate::services::materializer::ScaffoldMaterializer;
    use forge_common::db::init_memory_database;
    use forge_common::EventBus;

    #[tokio::test]
    async fn test_first_cycle_runs_immediately_and_stops_on_cancel() {
        let db = init_memory_database().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let feed = StaticFeed::single_page(vec![RawPost::new("p1", "hello", "alice", 0, 0)]);
        let pipeline = Pipeline::new(
            db,
            &PipelineConfig::default(),
            Arc::new(feed),
            Arc::new(ScaffoldMaterializer::new(dir.path())),
            EventBus::new(16),
        );

        let scheduler = ScanScheduler::new(Arc::new(pipeline), Duration::from_secs(3600));
        let last_cycle = scheduler.last_cycle();
        let cancel_token = CancellationToken::new();

        let token = cancel_token.clone();
        let handle = tokio::spawn(async move { scheduler.run(token).await });

        // Wait for the immediate first cycle, then stop during the long sleep
        for _ in 0..200 {
            if last_cycle.read().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel_token.cancel();

        let cycles = handle.await.unwrap();
        assert_eq!(cycles, 1);
        let report = last_cycle.read().await.clone().unwrap();
        assert!(!report.is_aborted());
        assert_eq!(report.counts.ingested, 1);
    }
}
