//! Event types for the LegWatch event system
//!
//! Engine progress is broadcast over an in-process bus and forwarded to SSE
//! subscribers by the API layer. Losing an event is acceptable (slow
//! subscribers are lagged, not blocked).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// LegWatch engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A synchronization run started
    RunStarted {
        run_id: Uuid,
        trigger_source: String,
        lookback_days: u32,
        timestamp: DateTime<Utc>,
    },

    /// Progress update during a run
    RunProgress {
        run_id: Uuid,
        phase: String,
        current: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch committed successfully
    BatchCommitted {
        run_id: Uuid,
        batch_index: usize,
        records_applied: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch failed and was rolled back to its checkpoint
    BatchRolledBack {
        run_id: Uuid,
        batch_index: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Post-apply validation finished
    ValidationCompleted {
        run_id: Uuid,
        passed: bool,
        critical_issues: usize,
        warnings: usize,
        confidence_score: f64,
        timestamp: DateTime<Utc>,
    },

    /// A run finished in a terminal state
    RunCompleted {
        run_id: Uuid,
        status: String,
        checked: usize,
        added: usize,
        updated: usize,
        errors: usize,
        timestamp: DateTime<Utc>,
    },

    /// A run failed with a fatal error
    RunFailed {
        run_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A run was cancelled at a batch boundary
    RunCancelled {
        run_id: Uuid,
        completed_batches: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event type name, used as the SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::RunStarted { .. } => "RunStarted",
            SyncEvent::RunProgress { .. } => "RunProgress",
            SyncEvent::BatchCommitted { .. } => "BatchCommitted",
            SyncEvent::BatchRolledBack { .. } => "BatchRolledBack",
            SyncEvent::ValidationCompleted { .. } => "ValidationCompleted",
            SyncEvent::RunCompleted { .. } => "RunCompleted",
            SyncEvent::RunFailed { .. } => "RunFailed",
            SyncEvent::RunCancelled { .. } => "RunCancelled",
        }
    }
}

/// Broadcast event bus shared between the engine and SSE handlers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count. Zero subscribers is not an error; the
    /// engine runs the same with or without observers.
    pub fn emit(&self, event: SyncEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_variant() {
        let event = SyncEvent::RunStarted {
            run_id: Uuid::new_v4(),
            trigger_source: "manual".to_string(),
            lookback_days: 7,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "RunStarted");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SyncEvent::BatchCommitted {
            run_id: Uuid::new_v4(),
            batch_index: 2,
            records_applied: 25,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"BatchCommitted\""));
        assert!(json.contains("\"batch_index\":2"));

        let back: SyncEvent = serde_json::from_str(&json).unwrap();
        match back {
            SyncEvent::BatchCommitted { records_applied, .. } => assert_eq!(records_applied, 25),
            _ => panic!("wrong event type deserialized"),
        }
    }

    #[tokio::test]
    async fn bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let delivered = bus.emit(SyncEvent::RunCancelled {
            run_id: Uuid::new_v4(),
            completed_batches: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "RunCancelled");
    }

    #[test]
    fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(16);
        let delivered = bus.emit(SyncEvent::RunFailed {
            run_id: Uuid::new_v4(),
            error: "upstream unreachable".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 0);
    }
}
