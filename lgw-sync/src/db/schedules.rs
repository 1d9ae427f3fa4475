//! Schedule definition persistence
//!
//! Schedules are operator-owned rows; the engine reads them and writes back
//! only the run-linkage fields (last_run_at, next_run_at, last_run_id).

use crate::models::{ScheduleDefinition, SyncComponent};
use chrono::{DateTime, Utc};
use lgw_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Load all schedules, runnable or not
pub async fn list_schedules(pool: &SqlitePool) -> Result<Vec<ScheduleDefinition>> {
    let rows = sqlx::query("SELECT * FROM schedules ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(schedule_from_row).collect()
}

/// Load the schedules the scheduler adapter should register
pub async fn list_runnable(pool: &SqlitePool) -> Result<Vec<ScheduleDefinition>> {
    let rows = sqlx::query("SELECT * FROM schedules WHERE active = 1 AND deployed = 1 ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(schedule_from_row).collect()
}

/// Load one schedule
pub async fn get_schedule(pool: &SqlitePool, schedule_id: Uuid) -> Result<Option<ScheduleDefinition>> {
    let row = sqlx::query("SELECT * FROM schedules WHERE schedule_id = ?")
        .bind(schedule_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(schedule_from_row).transpose()
}

/// Insert a schedule definition (operator tooling and tests)
pub async fn insert_schedule(pool: &SqlitePool, schedule: &ScheduleDefinition) -> Result<()> {
    let components = serde_json::to_string(&schedule.components)
        .map_err(|e| Error::Internal(format!("Failed to serialize components: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO schedules (schedule_id, name, cron, lookback_days, components, active, deployed,
                               last_run_at, next_run_at, last_run_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(schedule.schedule_id.to_string())
    .bind(&schedule.name)
    .bind(&schedule.cron)
    .bind(schedule.lookback_days as i64)
    .bind(components)
    .bind(schedule.active as i64)
    .bind(schedule.deployed as i64)
    .bind(schedule.last_run_at.map(|dt| dt.to_rfc3339()))
    .bind(schedule.next_run_at.map(|dt| dt.to_rfc3339()))
    .bind(schedule.last_run_id.map(|id| id.to_string()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Write run linkage back to a schedule after a triggered run finishes
pub async fn record_run_linkage(
    pool: &SqlitePool,
    schedule_id: Uuid,
    last_run_at: DateTime<Utc>,
    next_run_at: Option<DateTime<Utc>>,
    last_run_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE schedules
        SET last_run_at = ?, next_run_at = ?, last_run_id = ?
        WHERE schedule_id = ?
        "#,
    )
    .bind(last_run_at.to_rfc3339())
    .bind(next_run_at.map(|dt| dt.to_rfc3339()))
    .bind(last_run_id.to_string())
    .bind(schedule_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

fn schedule_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduleDefinition> {
    let schedule_id: String = row.get("schedule_id");
    let schedule_id = Uuid::parse_str(&schedule_id)
        .map_err(|e| Error::Internal(format!("Failed to parse schedule_id: {}", e)))?;

    let components: String = row.get("components");
    let components: Vec<SyncComponent> = serde_json::from_str(&components)
        .map_err(|e| Error::Internal(format!("Failed to deserialize components: {}", e)))?;

    let last_run_id: Option<String> = row.get("last_run_id");
    let last_run_id = last_run_id
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse last_run_id: {}", e)))?;

    Ok(ScheduleDefinition {
        schedule_id,
        name: row.get("name"),
        cron: row.get("cron"),
        lookback_days: row.get::<i64, _>("lookback_days") as u32,
        components,
        active: row.get::<i64, _>("active") != 0,
        deployed: row.get::<i64, _>("deployed") != 0,
        last_run_at: parse_optional_timestamp(row.get("last_run_at"))?,
        next_run_at: parse_optional_timestamp(row.get("next_run_at"))?,
        last_run_id,
    })
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))
        })
        .transpose()
}
