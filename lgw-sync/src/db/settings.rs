//! Operational settings with compiled defaults
//!
//! Stored in the `settings` table so a deployment can tune the engine
//! without a rebuild. Missing keys fall back to the defaults below.

use lgw_common::Result;
use sqlx::SqlitePool;

/// Engine settings loaded once per run
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Records per batch
    pub batch_size: usize,
    /// Run-level snapshots to keep after pruning
    pub backup_retention: usize,
    /// Freshness check threshold
    pub staleness_threshold_hours: i64,
    /// Prior successful runs used for the anomaly baseline
    pub anomaly_window_runs: usize,
    /// Upstream fetch retry cap
    pub max_fetch_attempts: u32,
    /// Base delay for fetch retry backoff
    pub fetch_base_delay_ms: u64,
    /// Minimum interval between upstream requests
    pub rate_limit_ms: u64,
    /// Total time budget for SQLite lock retries
    pub database_max_lock_wait_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            backup_retention: 5,
            staleness_threshold_hours: 48,
            anomaly_window_runs: 10,
            max_fetch_attempts: 4,
            fetch_base_delay_ms: 500,
            rate_limit_ms: 1000,
            database_max_lock_wait_ms: 5000,
        }
    }
}

impl SyncSettings {
    /// Load settings from the database, defaulting each missing key
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            batch_size: get_u64(pool, "sync.batch_size", defaults.batch_size as u64).await?.max(1)
                as usize,
            backup_retention: get_u64(pool, "sync.backup_retention", defaults.backup_retention as u64)
                .await? as usize,
            staleness_threshold_hours: get_u64(
                pool,
                "sync.staleness_threshold_hours",
                defaults.staleness_threshold_hours as u64,
            )
            .await? as i64,
            anomaly_window_runs: get_u64(
                pool,
                "sync.anomaly_window_runs",
                defaults.anomaly_window_runs as u64,
            )
            .await? as usize,
            max_fetch_attempts: get_u64(
                pool,
                "sync.max_fetch_attempts",
                defaults.max_fetch_attempts as u64,
            )
            .await? as u32,
            fetch_base_delay_ms: get_u64(
                pool,
                "sync.fetch_base_delay_ms",
                defaults.fetch_base_delay_ms,
            )
            .await?,
            rate_limit_ms: get_u64(pool, "sync.rate_limit_ms", defaults.rate_limit_ms).await?,
            database_max_lock_wait_ms: get_u64(
                pool,
                "sync.database_max_lock_wait_ms",
                defaults.database_max_lock_wait_ms,
            )
            .await?,
        })
    }
}

async fn get_u64(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
}

/// Write a setting (used by tests and operator tooling)
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
