//! Run Ledger persistence
//!
//! Append-only in spirit: a run row is written once when the run starts and
//! updated in place as it progresses, but never deleted. Every run, whatever
//! its outcome, stays queryable for audit and for the scheduler adapter.

use crate::models::{
    RunMetrics, RunStatus, SyncComponent, SyncRun, TriggerSource, ValidationReport,
};
use crate::utils::retry_on_lock;
use chrono::{DateTime, Utc};
use lgw_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Filters for run history queries
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub trigger_source: Option<TriggerSource>,
    pub limit: Option<u32>,
}

/// Insert or update a run row
///
/// Uses lock retry: the ledger is written mid-run while API readers may hold
/// read transactions.
pub async fn save_run(pool: &SqlitePool, run: &SyncRun) -> Result<()> {
    let run_id = run.run_id.to_string();
    let schedule_id = run.schedule_id.map(|id| id.to_string());
    let components = serde_json::to_string(&run.components)
        .map_err(|e| Error::Internal(format!("Failed to serialize components: {}", e)))?;
    let started_at = run.started_at.to_rfc3339();
    let ended_at = run.ended_at.map(|dt| dt.to_rfc3339());

    let max_wait_ms = crate::db::settings::SyncSettings::load(pool)
        .await?
        .database_max_lock_wait_ms;

    retry_on_lock("save_run", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                run_id, status, trigger_source, schedule_id, lookback_days, components,
                records_checked, records_added, records_updated, records_unchanged, records_errors,
                batch_count, completed_batches, cancel_requested, error_message,
                started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = excluded.status,
                records_checked = excluded.records_checked,
                records_added = excluded.records_added,
                records_updated = excluded.records_updated,
                records_unchanged = excluded.records_unchanged,
                records_errors = excluded.records_errors,
                batch_count = excluded.batch_count,
                completed_batches = excluded.completed_batches,
                error_message = excluded.error_message,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&run_id)
        .bind(run.status.as_str())
        .bind(run.trigger_source.as_str())
        .bind(&schedule_id)
        .bind(run.lookback_days as i64)
        .bind(&components)
        .bind(run.metrics.checked as i64)
        .bind(run.metrics.added as i64)
        .bind(run.metrics.updated as i64)
        .bind(run.metrics.unchanged as i64)
        .bind(run.metrics.errors as i64)
        .bind(run.batch_count as i64)
        .bind(run.completed_batches as i64)
        .bind(run.cancel_requested as i64)
        .bind(&run.error_message)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load a run by id
pub async fn get_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<SyncRun>> {
    let row = sqlx::query(
        "SELECT * FROM sync_runs WHERE run_id = ?",
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| run_from_row(&r)).transpose()
}

/// Query run history, newest first
pub async fn run_history(pool: &SqlitePool, filter: &RunFilter) -> Result<Vec<SyncRun>> {
    let limit = filter.limit.unwrap_or(50).min(500) as i64;

    let rows = sqlx::query(
        r#"
        SELECT * FROM sync_runs
        WHERE (? IS NULL OR status = ?)
          AND (? IS NULL OR trigger_source = ?)
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.trigger_source.map(|t| t.as_str()))
    .bind(filter.trigger_source.map(|t| t.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(run_from_row).collect()
}

/// Whether any run is currently in the running state
///
/// The engine is a single active writer; a second start is refused while
/// this returns true.
pub async fn has_active_run(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs WHERE status = 'running'")
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Find an interrupted run left in the running state by a previous process
///
/// Supports resumption across short-lived invocations: batch plans persist
/// in sync_batches, so a new process can continue from the next pending
/// batch instead of restarting.
pub async fn find_resumable_run(pool: &SqlitePool) -> Result<Option<SyncRun>> {
    let row = sqlx::query(
        "SELECT * FROM sync_runs WHERE status = 'running' ORDER BY started_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    row.map(|r| run_from_row(&r)).transpose()
}

/// Request cancellation of a run (out-of-band; checked between batches)
///
/// Returns false when the run does not exist or is already terminal.
pub async fn request_cancel(pool: &SqlitePool, run_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE sync_runs SET cancel_requested = 1 WHERE run_id = ? AND status = 'running'",
    )
    .bind(run_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Check the out-of-band cancellation flag
pub async fn is_cancel_requested(pool: &SqlitePool, run_id: Uuid) -> Result<bool> {
    let flag: Option<i64> =
        sqlx::query_scalar("SELECT cancel_requested FROM sync_runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(flag.unwrap_or(0) != 0)
}

/// Attach the final validation report to a run
pub async fn save_validation_report(
    pool: &SqlitePool,
    run_id: Uuid,
    report: &ValidationReport,
) -> Result<()> {
    let json = serde_json::to_string(report)
        .map_err(|e| Error::Internal(format!("Failed to serialize validation report: {}", e)))?;

    sqlx::query("UPDATE sync_runs SET validation_report = ? WHERE run_id = ?")
        .bind(json)
        .bind(run_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Load a run's validation report, if one was recorded
pub async fn get_validation_report(
    pool: &SqlitePool,
    run_id: Uuid,
) -> Result<Option<ValidationReport>> {
    let json: Option<Option<String>> =
        sqlx::query_scalar("SELECT validation_report FROM sync_runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(pool)
            .await?;

    match json.flatten() {
        Some(json) => {
            let report = serde_json::from_str(&json).map_err(|e| {
                Error::Internal(format!("Failed to deserialize validation report: {}", e))
            })?;
            Ok(Some(report))
        }
        None => Ok(None),
    }
}

/// End timestamp of the most recent successful run (freshness check input)
pub async fn latest_success_ended_at(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>> {
    let ended_at: Option<String> = sqlx::query_scalar(
        r#"
        SELECT ended_at FROM sync_runs
        WHERE status IN ('completed', 'partial') AND ended_at IS NOT NULL
        ORDER BY ended_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    ended_at
        .map(|s| parse_timestamp(&s, "ended_at"))
        .transpose()
}

/// Added+updated volumes of recent successful runs, excluding the given run
///
/// Baseline input for the anomaly check, newest first.
pub async fn recent_success_volumes(
    pool: &SqlitePool,
    exclude_run: Uuid,
    window: usize,
) -> Result<Vec<u64>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT records_added, records_updated FROM sync_runs
        WHERE status IN ('completed', 'partial') AND run_id != ?
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(exclude_run.to_string())
    .bind(window as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(added, updated)| (added + updated) as u64)
        .collect())
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncRun> {
    let run_id: String = row.get("run_id");
    let run_id = Uuid::parse_str(&run_id)
        .map_err(|e| Error::Internal(format!("Failed to parse run_id: {}", e)))?;

    let schedule_id: Option<String> = row.get("schedule_id");
    let schedule_id = schedule_id
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse schedule_id: {}", e)))?;

    let components: String = row.get("components");
    let components: Vec<SyncComponent> = serde_json::from_str(&components)
        .map_err(|e| Error::Internal(format!("Failed to deserialize components: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = parse_timestamp(&started_at, "started_at")?;
    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| parse_timestamp(&s, "ended_at"))
        .transpose()?;

    Ok(SyncRun {
        run_id,
        status: status_from_str(row.get("status"))?,
        trigger_source: trigger_from_str(row.get("trigger_source"))?,
        schedule_id,
        lookback_days: row.get::<i64, _>("lookback_days") as u32,
        components,
        metrics: RunMetrics {
            checked: row.get::<i64, _>("records_checked") as usize,
            added: row.get::<i64, _>("records_added") as usize,
            updated: row.get::<i64, _>("records_updated") as usize,
            unchanged: row.get::<i64, _>("records_unchanged") as usize,
            errors: row.get::<i64, _>("records_errors") as usize,
        },
        batch_count: row.get::<i64, _>("batch_count") as usize,
        completed_batches: row.get::<i64, _>("completed_batches") as usize,
        cancel_requested: row.get::<i64, _>("cancel_requested") != 0,
        error_message: row.get("error_message"),
        started_at,
        ended_at,
    })
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

fn status_from_str(value: String) -> Result<RunStatus> {
    match value.as_str() {
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "partial" => Ok(RunStatus::Partial),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(Error::Internal(format!("Unknown run status: {}", other))),
    }
}

fn trigger_from_str(value: String) -> Result<TriggerSource> {
    match value.as_str() {
        "manual" => Ok(TriggerSource::Manual),
        "scheduled" => Ok(TriggerSource::Scheduled),
        "test" => Ok(TriggerSource::Test),
        other => Err(Error::Internal(format!("Unknown trigger source: {}", other))),
    }
}
