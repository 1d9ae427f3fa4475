//! Record-level error log
//!
//! Parse and validation failures skip the offending record; the skip is
//! recorded here so a run's losses are diagnosable without re-running.

use crate::models::SyncComponent;
use chrono::{DateTime, Utc};
use lgw_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Kind of record-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorType {
    ParseError,
    ValidationError,
}

impl SyncErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorType::ParseError => "parse_error",
            SyncErrorType::ValidationError => "validation_error",
        }
    }
}

/// One logged record-level error
#[derive(Debug, Clone)]
pub struct SyncErrorRow {
    pub run_id: Uuid,
    pub component: SyncComponent,
    pub natural_key: Option<String>,
    pub error_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Log a skipped record
pub async fn record_error(
    pool: &SqlitePool,
    run_id: Uuid,
    component: SyncComponent,
    natural_key: Option<&str>,
    error_type: SyncErrorType,
    message: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_errors (run_id, component, natural_key, error_type, message, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run_id.to_string())
    .bind(component.as_str())
    .bind(natural_key)
    .bind(error_type.as_str())
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// All logged errors for one run, oldest first
pub async fn errors_for_run(pool: &SqlitePool, run_id: Uuid) -> Result<Vec<SyncErrorRow>> {
    let rows = sqlx::query(
        "SELECT * FROM sync_errors WHERE run_id = ? ORDER BY id",
    )
    .bind(run_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let component: String = row.get("component");
            let component = component
                .parse::<SyncComponent>()
                .map_err(Error::Internal)?;

            let created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
                .with_timezone(&Utc);

            Ok(SyncErrorRow {
                run_id,
                component,
                natural_key: row.get("natural_key"),
                error_type: row.get("error_type"),
                message: row.get("message"),
                created_at,
            })
        })
        .collect()
}
