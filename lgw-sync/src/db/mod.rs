//! Database access for lgw-sync
//!
//! One SQLite database under the root folder holds both the synchronized
//! entity tables and the engine's own state (run ledger, batch plans,
//! schedules, settings).

pub mod batches;
pub mod committees;
pub mod errors;
pub mod hearings;
pub mod runs;
pub mod schedules;
pub mod schema;
pub mod settings;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the database file if missing and applies the schema. Foreign key
/// enforcement is enabled on every pooled connection; constraint violations
/// must surface as errors, not silent corruption.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    tracing::debug!(path = %db_path.display(), "Connecting to database");

    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    schema::init_tables(&pool).await?;

    Ok(pool)
}
