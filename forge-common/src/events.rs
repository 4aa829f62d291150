//! Pipeline event types and broadcast bus
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE transmission
//! by the reporting API. Emission is fire-and-forget: the pipeline never
//! waits on, or fails because of, a missing subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted while a scan cycle runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ForgeEvent {
    /// Scan cycle started
    ScanStarted {
        cycle_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Candidate consumed a quota slot
    CandidateAdmitted {
        cycle_id: Uuid,
        post_id: String,
        total: f64,
        quota_day: String,
        timestamp: DateTime<Utc>,
    },

    /// Candidate was refused (low score or quota exhausted)
    CandidateRejected {
        cycle_id: Uuid,
        post_id: String,
        total: f64,
        /// Stored build status, e.g. `rejected_low_score`
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Project skeleton materialized
    BuildCompleted {
        cycle_id: Uuid,
        post_id: String,
        project_ref: String,
        timestamp: DateTime<Utc>,
    },

    /// Materializer failed; the quota slot stays consumed
    BuildFailed {
        cycle_id: Uuid,
        post_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Scan cycle finished normally
    ScanCompleted {
        cycle_id: Uuid,
        ingested: u32,
        admitted: u32,
        built: u32,
        timestamp: DateTime<Utc>,
    },

    /// Scan cycle aborted (feed or ledger unavailable)
    ScanAborted {
        cycle_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ForgeEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ForgeEvent::ScanStarted { .. } => "ScanStarted",
            ForgeEvent::CandidateAdmitted { .. } => "CandidateAdmitted",
            ForgeEvent::CandidateRejected { .. } => "CandidateRejected",
            ForgeEvent::BuildCompleted { .. } => "BuildCompleted",
            ForgeEvent::BuildFailed { .. } => "BuildFailed",
            ForgeEvent::ScanCompleted { .. } => "ScanCompleted",
            ForgeEvent::ScanAborted { .. } => "ScanAborted",
        }
    }
}

/// Broadcast bus for [`ForgeEvent`]
///
/// Cloning shares the same underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ForgeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ForgeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ForgeEvent,
    ) -> Result<usize, broadcast::error::SendError<ForgeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ForgeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let cycle_id = Uuid::new_v4();
        bus.emit(ForgeEvent::ScanStarted {
            cycle_id,
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            ForgeEvent::ScanStarted { cycle_id: got, .. } => assert_eq!(got, cycle_id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .emit(ForgeEvent::ScanAborted {
                cycle_id: Uuid::new_v4(),
                error: "feed down".to_string(),
                timestamp: Utc::now(),
            })
            .is_err());

        // Lossy emission never panics or errors
        bus.emit_lossy(ForgeEvent::ScanAborted {
            cycle_id: Uuid::new_v4(),
            error: "feed down".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_serialized_with_type_tag() {
        let event = ForgeEvent::BuildFailed {
            cycle_id: Uuid::nil(),
            post_id: "p9".to_string(),
            error: "disk full".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BuildFailed");
        assert_eq!(json["post_id"], "p9");
        assert_eq!(event.event_type(), "BuildFailed");
    }
}
