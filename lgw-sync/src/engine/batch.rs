//! Batch coordination
//!
//! Changes are partitioned into fixed-size, single-component batches and
//! applied strictly in plan order. Each batch is one SQLite transaction:
//! commit or roll back as a unit, so a failure inside one batch never
//! touches previously committed batches, and later batches are still
//! attempted. Cancellation is honored between batches, never mid-batch.

use super::upsert;
use crate::db::batches::{self, BatchRow, BatchState};
use crate::db::runs;
use crate::models::{Change, ChangeKind, SyncComponent, SyncRun};
use anyhow::Result;
use chrono::Utc;
use lgw_common::events::{EventBus, SyncEvent};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

/// A batch as planned before apply
#[derive(Debug)]
pub struct PlannedBatch {
    pub index: usize,
    pub component: SyncComponent,
    pub changes: Vec<Change>,
}

impl PlannedBatch {
    pub fn natural_keys(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|c| c.record.natural_key().to_string())
            .collect()
    }

    /// Persisted form for the sync_batches plan
    pub fn to_row(&self, run_id: uuid::Uuid) -> BatchRow {
        BatchRow {
            run_id,
            batch_index: self.index,
            state: BatchState::Pending,
            component: self.component,
            natural_keys: self.natural_keys(),
            records_applied: 0,
            error_message: None,
        }
    }
}

/// Partition applicable changes into fixed-size batches
///
/// Order is preserved; batches never mix components, so consecutive runs of
/// the same component are chunked independently.
pub fn partition(changes: Vec<Change>, batch_size: usize) -> Vec<PlannedBatch> {
    let batch_size = batch_size.max(1);
    let mut batches: Vec<PlannedBatch> = Vec::new();

    for change in changes {
        let component = change.record.component();
        match batches.last_mut() {
            Some(last) if last.component == component && last.changes.len() < batch_size => {
                last.changes.push(change);
            }
            _ => {
                batches.push(PlannedBatch {
                    index: batches.len(),
                    component,
                    changes: vec![change],
                });
            }
        }
    }

    batches
}

/// Aggregate outcome of an apply pass
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub committed: usize,
    pub rolled_back: usize,
    /// Stopped at a batch boundary on cancellation
    pub cancelled: bool,
}

/// Applies planned batches in order, isolating failures per batch
pub struct BatchCoordinator {
    pool: SqlitePool,
    event_bus: EventBus,
}

impl BatchCoordinator {
    pub fn new(pool: SqlitePool, event_bus: EventBus) -> Self {
        Self { pool, event_bus }
    }

    /// Apply all given batches for a run, updating the ledger as it goes
    ///
    /// The run's metrics and completed_batches are updated in place and
    /// persisted after every batch so an interrupted process can resume.
    pub async fn apply_all(
        &self,
        run: &mut SyncRun,
        planned: Vec<PlannedBatch>,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        let total = planned.len();

        for batch in planned {
            // Cancellation is only honored between batches
            if cancel.is_cancelled() || runs::is_cancel_requested(&self.pool, run.run_id).await? {
                tracing::info!(
                    run_id = %run.run_id,
                    batch_index = batch.index,
                    "Cancellation requested, stopping before next batch"
                );
                outcome.cancelled = true;
                return Ok(outcome);
            }

            self.event_bus.emit(SyncEvent::RunProgress {
                run_id: run.run_id,
                phase: "applying".to_string(),
                current: batch.index,
                total,
                timestamp: Utc::now(),
            });

            batches::mark_state(
                &self.pool,
                run.run_id,
                batch.index,
                BatchState::Running,
                0,
                None,
            )
            .await?;

            match self.apply_one(&batch).await {
                Ok(stats) => {
                    run.metrics.added += stats.added;
                    run.metrics.updated += stats.updated;
                    run.metrics.unchanged += stats.noop_updates;
                    run.completed_batches += 1;
                    outcome.committed += 1;

                    batches::mark_state(
                        &self.pool,
                        run.run_id,
                        batch.index,
                        BatchState::Committed,
                        stats.applied,
                        None,
                    )
                    .await?;
                    runs::save_run(&self.pool, run).await?;

                    tracing::info!(
                        run_id = %run.run_id,
                        batch_index = batch.index,
                        records = stats.applied,
                        "Batch committed"
                    );
                    self.event_bus.emit(SyncEvent::BatchCommitted {
                        run_id: run.run_id,
                        batch_index: batch.index,
                        records_applied: stats.applied,
                        timestamp: Utc::now(),
                    });
                }
                Err(err) => {
                    // The transaction already rolled back; the failure is
                    // isolated to this batch and the run continues.
                    run.metrics.errors += batch.changes.len();
                    run.completed_batches += 1;
                    outcome.rolled_back += 1;

                    batches::mark_state(
                        &self.pool,
                        run.run_id,
                        batch.index,
                        BatchState::RolledBack,
                        0,
                        Some(&err.to_string()),
                    )
                    .await?;
                    runs::save_run(&self.pool, run).await?;

                    tracing::warn!(
                        run_id = %run.run_id,
                        batch_index = batch.index,
                        records = batch.changes.len(),
                        error = %err,
                        "Batch rolled back"
                    );
                    self.event_bus.emit(SyncEvent::BatchRolledBack {
                        run_id: run.run_id,
                        batch_index: batch.index,
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Apply one batch inside a single transaction
    async fn apply_one(&self, batch: &PlannedBatch) -> Result<BatchStats> {
        fast_checks(batch).map_err(|msg| anyhow::anyhow!("fast validation failed: {}", msg))?;

        let mut txn = self.pool.begin().await?;
        let mut stats = BatchStats::default();

        for change in &batch.changes {
            let result = upsert::apply_change(&mut *txn, change).await?;
            stats.applied += 1;
            match change.kind {
                ChangeKind::Added => stats.added += 1,
                ChangeKind::Updated if result.fields_changed => stats.updated += 1,
                ChangeKind::Updated => stats.noop_updates += 1,
                ChangeKind::Unchanged => {}
            }
        }

        txn.commit().await?;
        Ok(stats)
    }
}

#[derive(Debug, Default)]
struct BatchStats {
    applied: usize,
    added: usize,
    updated: usize,
    /// Updates where no stored field actually changed
    noop_updates: usize,
}

/// Cheap checks scoped to one batch: duplicate natural keys within the
/// batch and missing required fields
fn fast_checks(batch: &PlannedBatch) -> std::result::Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for change in &batch.changes {
        let key = change.record.natural_key();
        if !seen.insert(key) {
            return Err(format!("duplicate natural key in batch: {}", key));
        }

        let missing = change.record.missing_required_fields();
        if !missing.is_empty() {
            return Err(format!(
                "record {} missing required fields: {}",
                key,
                missing.join(", ")
            ));
        }
    }
    Ok(())
}
