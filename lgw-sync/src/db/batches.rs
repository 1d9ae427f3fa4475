//! Persisted batch plans
//!
//! The batch coordinator writes the full plan (ordered natural-key lists)
//! before applying anything, then updates each row's state as it goes. A
//! later process can load the pending remainder and continue the run.

use crate::models::SyncComponent;
use chrono::Utc;
use lgw_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Batch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    Committed,
    RolledBack,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Pending => "pending",
            BatchState::Running => "running",
            BatchState::Committed => "committed",
            BatchState::RolledBack => "rolled_back",
        }
    }

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(BatchState::Pending),
            "running" => Ok(BatchState::Running),
            "committed" => Ok(BatchState::Committed),
            "rolled_back" => Ok(BatchState::RolledBack),
            other => Err(Error::Internal(format!("Unknown batch state: {}", other))),
        }
    }
}

/// One persisted batch of a run's plan
#[derive(Debug, Clone)]
pub struct BatchRow {
    pub run_id: Uuid,
    pub batch_index: usize,
    pub state: BatchState,
    pub component: SyncComponent,
    /// Ordered natural keys of the changes assigned to this batch
    pub natural_keys: Vec<String>,
    pub records_applied: usize,
    pub error_message: Option<String>,
}

/// Persist a run's batch plan before the first apply
pub async fn insert_plan(pool: &SqlitePool, batches: &[BatchRow]) -> Result<()> {
    for batch in batches {
        let keys = serde_json::to_string(&batch.natural_keys)
            .map_err(|e| Error::Internal(format!("Failed to serialize natural keys: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO sync_batches (run_id, batch_index, state, component, natural_keys)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch.run_id.to_string())
        .bind(batch.batch_index as i64)
        .bind(batch.state.as_str())
        .bind(batch.component.as_str())
        .bind(keys)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Load all batches of a run, in plan order
pub async fn load_batches(pool: &SqlitePool, run_id: Uuid) -> Result<Vec<BatchRow>> {
    let rows = sqlx::query(
        "SELECT * FROM sync_batches WHERE run_id = ? ORDER BY batch_index",
    )
    .bind(run_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let run_id: String = row.get("run_id");
            let run_id = Uuid::parse_str(&run_id)
                .map_err(|e| Error::Internal(format!("Failed to parse run_id: {}", e)))?;

            let state: String = row.get("state");
            let component: String = row.get("component");
            let component = component
                .parse::<SyncComponent>()
                .map_err(Error::Internal)?;

            let natural_keys: String = row.get("natural_keys");
            let natural_keys: Vec<String> = serde_json::from_str(&natural_keys)
                .map_err(|e| Error::Internal(format!("Failed to deserialize natural keys: {}", e)))?;

            Ok(BatchRow {
                run_id,
                batch_index: row.get::<i64, _>("batch_index") as usize,
                state: BatchState::from_str(&state)?,
                component,
                natural_keys,
                records_applied: row.get::<i64, _>("records_applied") as usize,
                error_message: row.get("error_message"),
            })
        })
        .collect()
}

/// Update a batch's state as the coordinator works through the plan
pub async fn mark_state(
    pool: &SqlitePool,
    run_id: Uuid,
    batch_index: usize,
    state: BatchState,
    records_applied: usize,
    error_message: Option<&str>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let (started_at, ended_at) = match state {
        BatchState::Running => (Some(now.as_str()), None),
        BatchState::Committed | BatchState::RolledBack => (None, Some(now.as_str())),
        BatchState::Pending => (None, None),
    };

    sqlx::query(
        r#"
        UPDATE sync_batches
        SET state = ?,
            records_applied = ?,
            error_message = ?,
            started_at = COALESCE(?, started_at),
            ended_at = COALESCE(?, ended_at)
        WHERE run_id = ? AND batch_index = ?
        "#,
    )
    .bind(state.as_str())
    .bind(records_applied as i64)
    .bind(error_message)
    .bind(started_at)
    .bind(ended_at)
    .bind(run_id.to_string())
    .bind(batch_index as i64)
    .execute(pool)
    .await?;

    Ok(())
}
