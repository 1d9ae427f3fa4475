//! Run lifecycle state machine
//!
//! A run progresses RUNNING → {COMPLETED | PARTIAL | FAILED | CANCELLED}.
//! Every run, whatever its outcome, stays in the ledger with its final
//! metrics; the ledger row also carries enough state (batch_count,
//! completed_batches) for a later process to resume an interrupted run.

use super::SyncComponent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run outcome / lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Actively processing (or interrupted mid-flight and awaiting resumption)
    Running,
    /// All batches committed, validation passed
    Completed,
    /// Finished, but some batches rolled back or records were skipped
    Partial,
    /// Fatal error or run-level rollback
    Failed,
    /// Stopped at a batch boundary on operator request
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// What caused a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Scheduled,
    Test,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::Test => "test",
        }
    }
}

/// Aggregated counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Records returned by the Fetchers and classified
    pub checked: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Record-level errors (parse/validation skips) plus records lost to
    /// rolled-back batches
    pub errors: usize,
}

/// One execution of the synchronization engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub trigger_source: TriggerSource,
    /// Schedule that caused this run, for scheduled triggers
    pub schedule_id: Option<Uuid>,
    pub lookback_days: u32,
    pub components: Vec<SyncComponent>,
    pub metrics: RunMetrics,
    pub batch_count: usize,
    pub completed_batches: usize,
    pub cancel_requested: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn new(
        trigger_source: TriggerSource,
        schedule_id: Option<Uuid>,
        lookback_days: u32,
        components: Vec<SyncComponent>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Running,
            trigger_source,
            schedule_id,
            lookback_days,
            components,
            metrics: RunMetrics::default(),
            batch_count: 0,
            completed_batches: 0,
            cancel_requested: false,
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a terminal state and stamp the end time
    pub fn finish(&mut self, status: RunStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Start timestamp of the lookback window for this run
    pub fn window_start(&self) -> DateTime<Utc> {
        self.started_at - chrono::Duration::days(self.lookback_days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_running_and_open() {
        let run = SyncRun::new(TriggerSource::Manual, None, 7, SyncComponent::all());
        assert_eq!(run.status, RunStatus::Running);
        assert!(!run.is_terminal());
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn finish_stamps_end_time() {
        let mut run = SyncRun::new(TriggerSource::Test, None, 1, vec![SyncComponent::Hearings]);
        run.finish(RunStatus::Completed);
        assert!(run.is_terminal());
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn window_start_honors_lookback() {
        let run = SyncRun::new(TriggerSource::Manual, None, 30, SyncComponent::all());
        let days = (run.started_at - run.window_start()).num_days();
        assert_eq!(days, 30);
    }
}
