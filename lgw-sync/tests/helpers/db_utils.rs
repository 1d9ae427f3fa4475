//! Database test utilities

use anyhow::Result;
use lgw_common::events::EventBus;
use lgw_sync::engine::SyncEngine;
use lgw_sync::fetch::SourceRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Create a temporary test database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for the
/// duration of the test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_lgw.db");
    let pool = lgw_sync::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Build an engine over a test database and the given sources
///
/// Backups land in a subdirectory of the test's temp dir.
pub fn create_test_engine(
    temp_dir: &TempDir,
    pool: SqlitePool,
    registry: SourceRegistry,
) -> Arc<SyncEngine> {
    let event_bus = EventBus::new(100);
    Arc::new(SyncEngine::new(
        pool,
        event_bus,
        registry,
        temp_dir.path().join("backups"),
    ))
}

/// Count rows in a table
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Current auto-increment counter for a table (0 when never used)
pub async fn sequence_value(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar("SELECT seq FROM sqlite_sequence WHERE name = ?")
        .bind(table)
        .fetch_optional(pool)
        .await
        .unwrap()
        .unwrap_or(0)
}
