//! Run orchestration
//!
//! Owns the lifecycle of one run: checkpoint → detect → batch apply →
//! validate → finalize. Failures recover as locally as possible (record →
//! batch → run); only integrity-threatening conditions escalate to the
//! run-level rollback, and a restore failure is the one condition that
//! propagates as a hard error to the caller.

use super::backup::{BackupManager, CheckpointHandle};
use super::batch::{partition, BatchCoordinator, PlannedBatch};
use super::detector;
use super::validator::Validator;
use crate::db::batches::{self, BatchState};
use crate::db::runs;
use crate::db::settings::SyncSettings;
use crate::fetch::SourceRegistry;
use crate::models::{RunStatus, SyncComponent, SyncRun, TriggerSource};
use anyhow::{Context, Result};
use chrono::Utc;
use lgw_common::events::{EventBus, SyncEvent};
use lgw_common::Error;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The incremental synchronization engine
///
/// All state lives in the database; the engine itself is cheap to construct
/// and safe to drop between invocations.
pub struct SyncEngine {
    db: SqlitePool,
    event_bus: EventBus,
    registry: SourceRegistry,
    backup_dir: PathBuf,
}

impl SyncEngine {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        registry: SourceRegistry,
        backup_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            event_bus,
            registry,
            backup_dir,
        }
    }

    /// Register a new run in the ledger without executing it yet
    ///
    /// Refuses while another run is active: the engine is a single active
    /// writer. The returned run is already persisted as running, so the
    /// caller can hand its id out and execute in the background.
    pub async fn prepare_run(
        &self,
        trigger_source: TriggerSource,
        schedule_id: Option<Uuid>,
        lookback_days: u32,
        components: Vec<SyncComponent>,
    ) -> Result<SyncRun> {
        if runs::has_active_run(&self.db).await? {
            anyhow::bail!("a synchronization run is already active");
        }

        let components = if components.is_empty() {
            SyncComponent::all()
        } else {
            components
        };

        let run = SyncRun::new(trigger_source, schedule_id, lookback_days, components);
        runs::save_run(&self.db, &run).await?;

        tracing::info!(
            run_id = %run.run_id,
            trigger = trigger_source.as_str(),
            lookback_days,
            "Starting synchronization run"
        );
        self.event_bus.emit(SyncEvent::RunStarted {
            run_id: run.run_id,
            trigger_source: trigger_source.as_str().to_string(),
            lookback_days,
            timestamp: Utc::now(),
        });

        Ok(run)
    }

    /// Execute a prepared run to its terminal state
    ///
    /// Returns the finished run for every ledgered outcome, including
    /// failures; an Err means the engine could not even record what
    /// happened, or a checkpoint restore failed (operator intervention
    /// required).
    pub async fn execute_prepared(
        &self,
        mut run: SyncRun,
        cancel: CancellationToken,
    ) -> Result<SyncRun> {
        match self.execute_new(&mut run, cancel).await {
            Ok(()) => Ok(run),
            Err(err) => self.record_failure(run, err).await,
        }
    }

    /// Prepare and execute a run end to end (CLI and scheduler path)
    pub async fn start_run(
        &self,
        trigger_source: TriggerSource,
        schedule_id: Option<Uuid>,
        lookback_days: u32,
        components: Vec<SyncComponent>,
        cancel: CancellationToken,
    ) -> Result<SyncRun> {
        let run = self
            .prepare_run(trigger_source, schedule_id, lookback_days, components)
            .await?;
        self.execute_prepared(run, cancel).await
    }

    /// Discover and continue an interrupted run
    ///
    /// A run left in the running state by a dead process resumes from its
    /// first pending batch; committed batches are never re-applied.
    pub async fn resume_run(&self, run_id: Uuid, cancel: CancellationToken) -> Result<SyncRun> {
        let mut run = runs::get_run(&self.db, run_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))?;

        if run.is_terminal() {
            anyhow::bail!("run {} is already {}", run_id, run.status.as_str());
        }

        tracing::info!(
            run_id = %run.run_id,
            completed_batches = run.completed_batches,
            batch_count = run.batch_count,
            "Resuming interrupted run"
        );

        match self.execute_resume(&mut run, cancel).await {
            Ok(()) => Ok(run),
            Err(err) => self.record_failure(run, err).await,
        }
    }

    async fn execute_new(&self, run: &mut SyncRun, cancel: CancellationToken) -> Result<()> {
        let settings = SyncSettings::load(&self.db).await?;
        let backup = self.backup_manager(&settings);

        let checkpoint = backup
            .checkpoint(&self.db, run.run_id)
            .await
            .context("failed to create run checkpoint")?;

        // Detection phase: read-only, classification is pure
        self.event_bus.emit(SyncEvent::RunProgress {
            run_id: run.run_id,
            phase: "detecting".to_string(),
            current: 0,
            total: 0,
            timestamp: Utc::now(),
        });

        let sources = self.registry.select(&run.components);
        let detection =
            detector::detect_changes(&self.db, run.run_id, &sources, run.window_start())
                .await
                .context("change detection failed")?;

        run.metrics.checked = detection.checked;
        run.metrics.unchanged = detection.unchanged;
        run.metrics.errors = detection.skipped;

        let planned = partition(detection.changes, settings.batch_size);
        run.batch_count = planned.len();

        let rows: Vec<_> = planned.iter().map(|b| b.to_row(run.run_id)).collect();
        batches::insert_plan(&self.db, &rows).await?;
        runs::save_run(&self.db, run).await?;

        self.apply_and_finalize(run, planned, checkpoint, &backup, &settings, cancel)
            .await
    }

    async fn execute_resume(&self, run: &mut SyncRun, cancel: CancellationToken) -> Result<()> {
        let settings = SyncSettings::load(&self.db).await?;
        let backup = self.backup_manager(&settings);

        // Reuse the original pre-run checkpoint so a run-level rollback
        // still restores to the state before batch 1
        let checkpoint = match backup.find_checkpoint(&self.db, run.run_id).await? {
            Some(handle) => handle,
            None => {
                tracing::warn!(
                    run_id = %run.run_id,
                    "No checkpoint registered for resumed run, taking a new one"
                );
                backup.checkpoint(&self.db, run.run_id).await?
            }
        };

        // Re-detect: committed records now classify Unchanged, so only the
        // pending remainder yields applicable changes
        let sources = self.registry.select(&run.components);
        let detection =
            detector::detect_changes(&self.db, run.run_id, &sources, run.window_start())
                .await
                .context("change detection failed during resume")?;

        let mut by_key: HashMap<String, _> = detection
            .changes
            .into_iter()
            .map(|c| (c.record.natural_key().to_string(), c))
            .collect();

        let planned: Vec<PlannedBatch> = batches::load_batches(&self.db, run.run_id)
            .await?
            .into_iter()
            .filter(|b| matches!(b.state, BatchState::Pending | BatchState::Running))
            .map(|b| {
                let changes = b
                    .natural_keys
                    .iter()
                    .filter_map(|key| by_key.remove(key))
                    .collect::<Vec<_>>();
                if changes.len() < b.natural_keys.len() {
                    tracing::warn!(
                        run_id = %run.run_id,
                        batch_index = b.batch_index,
                        planned = b.natural_keys.len(),
                        found = changes.len(),
                        "Some planned records no longer classify as changes"
                    );
                }
                PlannedBatch {
                    index: b.batch_index,
                    component: b.component,
                    changes,
                }
            })
            .collect();

        self.apply_and_finalize(run, planned, checkpoint, &backup, &settings, cancel)
            .await
    }

    /// Shared tail: batch apply, validation, rollback-or-commit, ledger
    async fn apply_and_finalize(
        &self,
        run: &mut SyncRun,
        planned: Vec<PlannedBatch>,
        checkpoint: CheckpointHandle,
        backup: &BackupManager,
        settings: &SyncSettings,
        cancel: CancellationToken,
    ) -> Result<()> {
        let coordinator = BatchCoordinator::new(self.db.clone(), self.event_bus.clone());
        let outcome = coordinator.apply_all(run, planned, &cancel).await?;

        if outcome.cancelled {
            run.finish(RunStatus::Cancelled);
            runs::save_run(&self.db, run).await?;
            tracing::info!(
                run_id = %run.run_id,
                completed_batches = run.completed_batches,
                "Run cancelled; committed batches left intact"
            );
            self.event_bus.emit(SyncEvent::RunCancelled {
                run_id: run.run_id,
                completed_batches: run.completed_batches,
                timestamp: Utc::now(),
            });
            return Ok(());
        }

        // Validation phase
        self.event_bus.emit(SyncEvent::RunProgress {
            run_id: run.run_id,
            phase: "validating".to_string(),
            current: run.completed_batches,
            total: run.batch_count,
            timestamp: Utc::now(),
        });

        let validator = Validator::new(
            settings.staleness_threshold_hours,
            settings.anomaly_window_runs,
        );
        let report = validator.validate(&self.db, run).await;
        runs::save_validation_report(&self.db, run.run_id, &report).await?;

        let critical = report.critical_issues().count();
        self.event_bus.emit(SyncEvent::ValidationCompleted {
            run_id: run.run_id,
            passed: report.passed,
            critical_issues: critical,
            warnings: report.warnings().count(),
            confidence_score: report.confidence_score,
            timestamp: Utc::now(),
        });

        if !report.passed {
            // Critical issues: roll the whole run back. A restore failure
            // here is fatal and non-retryable; it propagates as Err.
            tracing::error!(
                run_id = %run.run_id,
                critical_issues = critical,
                "Critical validation issues, rolling back run"
            );
            backup
                .restore(&self.db, &checkpoint)
                .await
                .context("run-level rollback failed")?;

            run.error_message = Some(format!(
                "{} critical validation issues; run rolled back to checkpoint",
                critical
            ));
            run.finish(RunStatus::Failed);
            runs::save_run(&self.db, run).await?;
            self.event_bus.emit(SyncEvent::RunFailed {
                run_id: run.run_id,
                error: run.error_message.clone().unwrap_or_default(),
                timestamp: Utc::now(),
            });
            return Ok(());
        }

        // Success path: prune old snapshots, settle final status
        backup.prune(&self.db).await?;

        let status = if outcome.rolled_back > 0 || run.metrics.errors > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };
        run.finish(status);
        runs::save_run(&self.db, run).await?;

        tracing::info!(
            run_id = %run.run_id,
            status = status.as_str(),
            checked = run.metrics.checked,
            added = run.metrics.added,
            updated = run.metrics.updated,
            errors = run.metrics.errors,
            confidence = report.confidence_score,
            "Synchronization run finished"
        );
        self.event_bus.emit(SyncEvent::RunCompleted {
            run_id: run.run_id,
            status: status.as_str().to_string(),
            checked: run.metrics.checked,
            added: run.metrics.added,
            updated: run.metrics.updated,
            errors: run.metrics.errors,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Record a failed run in the ledger, then decide whether the error is
    /// also fatal to the caller
    async fn record_failure(&self, mut run: SyncRun, err: anyhow::Error) -> Result<SyncRun> {
        tracing::error!(run_id = %run.run_id, error = %err, "Synchronization run failed");

        run.error_message = Some(err.to_string());
        run.finish(RunStatus::Failed);
        runs::save_run(&self.db, &run).await?;
        self.event_bus.emit(SyncEvent::RunFailed {
            run_id: run.run_id,
            error: err.to_string(),
            timestamp: Utc::now(),
        });

        // A failed restore leaves the store in an unknown state; never
        // swallow it
        if err
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<Error>(), Some(Error::RestoreFailed(_))))
        {
            return Err(err);
        }

        Ok(run)
    }

    fn backup_manager(&self, settings: &SyncSettings) -> BackupManager {
        BackupManager::new(self.backup_dir.clone(), settings.backup_retention)
    }
}
