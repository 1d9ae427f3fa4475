//! Scheduler adapter
//!
//! Reads persisted schedule definitions and registers one cron job per
//! runnable schedule. A fired job triggers a scheduled run with the
//! schedule's lookback window and component filter, then writes run linkage
//! (last_run_at, next_run_at, last_run_id) back to the schedule row.
//!
//! Overlap protection comes from the engine: a job firing while a run is
//! still active is refused and logged, not queued.

use crate::db::schedules;
use crate::engine::SyncEngine;
use crate::models::{ScheduleDefinition, TriggerSource};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// Build and start the cron scheduler from the schedules table
///
/// Returns None when no schedule is runnable.
pub async fn start(engine: Arc<SyncEngine>, pool: SqlitePool) -> Result<Option<JobScheduler>> {
    let runnable = schedules::list_runnable(&pool).await?;
    if runnable.is_empty() {
        tracing::info!("No active deployed schedules, scheduler not started");
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;

    for schedule in runnable {
        let cron = normalize_cron(&schedule.cron);
        tracing::info!(
            schedule = %schedule.name,
            cron = %cron,
            lookback_days = schedule.clamped_lookback_days(),
            "Registering schedule"
        );

        let engine = engine.clone();
        let pool = pool.clone();
        let job = Job::new_async(cron.as_str(), move |job_id, mut scheduler| {
            let engine = engine.clone();
            let pool = pool.clone();
            let schedule = schedule.clone();
            Box::pin(async move {
                run_scheduled(&engine, &pool, &schedule, job_id, &mut scheduler).await;
            })
        })
        .with_context(|| format!("creating scheduler job for cron {}", cron))?;

        sched.add(job).await.context("adding scheduler job")?;
    }

    sched.start().await.context("starting scheduler")?;
    Ok(Some(sched))
}

/// One scheduled firing: trigger a run and write linkage back
async fn run_scheduled(
    engine: &SyncEngine,
    pool: &SqlitePool,
    schedule: &ScheduleDefinition,
    job_id: uuid::Uuid,
    scheduler: &mut JobScheduler,
) {
    tracing::info!(schedule = %schedule.name, "Schedule fired");

    let result = engine
        .start_run(
            TriggerSource::Scheduled,
            Some(schedule.schedule_id),
            schedule.clamped_lookback_days(),
            schedule.effective_components(),
            CancellationToken::new(),
        )
        .await;

    let run_id = match result {
        Ok(run) => {
            tracing::info!(
                schedule = %schedule.name,
                run_id = %run.run_id,
                status = run.status.as_str(),
                "Scheduled run finished"
            );
            Some(run.run_id)
        }
        Err(err) => {
            // Most commonly another run was still active; the schedule will
            // fire again at the next tick
            tracing::warn!(schedule = %schedule.name, error = %err, "Scheduled run not executed");
            None
        }
    };

    let next_run_at = match scheduler.next_tick_for_job(job_id).await {
        Ok(next) => next,
        Err(err) => {
            tracing::warn!(schedule = %schedule.name, error = %err, "Could not compute next tick");
            None
        }
    };

    if let Some(run_id) = run_id {
        if let Err(err) =
            schedules::record_run_linkage(pool, schedule.schedule_id, Utc::now(), next_run_at, run_id)
                .await
        {
            tracing::error!(
                schedule = %schedule.name,
                error = %err,
                "Failed to write schedule run linkage"
            );
        }
    }
}

/// Accept both 5-field cron (operator convention) and the 6-field form the
/// scheduler library expects, by prepending a seconds column when absent
fn normalize_cron(expr: &str) -> String {
    match expr.split_whitespace().count() {
        5 => format!("0 {}", expr.trim()),
        _ => expr.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_cron_gains_a_seconds_column() {
        assert_eq!(normalize_cron("0 6 * * *"), "0 0 6 * * *");
        assert_eq!(normalize_cron("  */15 * * * *  "), "0 */15 * * * *");
    }

    #[test]
    fn six_field_cron_is_untouched() {
        assert_eq!(normalize_cron("30 0 6 * * *"), "30 0 6 * * *");
    }
}
