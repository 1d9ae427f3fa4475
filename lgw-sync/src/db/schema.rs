//! Schema creation for the lgw-sync database
//!
//! Tables are created on startup with CREATE TABLE IF NOT EXISTS. The
//! entity tables (hearings, committees and their dependents) are the data
//! set the engine synchronizes and the backup manager snapshots; the engine
//! tables (sync_runs, sync_batches, sync_errors, schedules, backups,
//! settings) are never rolled back.

use anyhow::Result;
use sqlx::SqlitePool;

/// Entity tables covered by run-level checkpoints, in FK-safe insert order.
/// Restore deletes them in reverse.
pub const ENTITY_TABLES: [&str; 5] = [
    "committees",
    "hearings",
    "hearing_committees",
    "witnesses",
    "hearing_documents",
];

/// Initialize all lgw-sync tables
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS committees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            system_code TEXT NOT NULL,
            name TEXT NOT NULL,
            chamber TEXT NOT NULL,
            committee_type TEXT,
            last_modified TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS hearings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL,
            title TEXT NOT NULL,
            chamber TEXT NOT NULL,
            congress INTEGER NOT NULL,
            event_date TEXT,
            status TEXT,
            last_modified TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS hearing_committees (
            hearing_id INTEGER NOT NULL REFERENCES hearings(id) ON DELETE CASCADE,
            committee_id INTEGER NOT NULL REFERENCES committees(id),
            UNIQUE(hearing_id, committee_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS witnesses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hearing_id INTEGER NOT NULL REFERENCES hearings(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            organization TEXT,
            position TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS hearing_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hearing_id INTEGER NOT NULL REFERENCES hearings(id) ON DELETE CASCADE,
            doc_type TEXT NOT NULL,
            title TEXT,
            url TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            run_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            trigger_source TEXT NOT NULL,
            schedule_id TEXT,
            lookback_days INTEGER NOT NULL,
            components TEXT NOT NULL,
            records_checked INTEGER NOT NULL DEFAULT 0,
            records_added INTEGER NOT NULL DEFAULT 0,
            records_updated INTEGER NOT NULL DEFAULT 0,
            records_unchanged INTEGER NOT NULL DEFAULT 0,
            records_errors INTEGER NOT NULL DEFAULT 0,
            batch_count INTEGER NOT NULL DEFAULT 0,
            completed_batches INTEGER NOT NULL DEFAULT 0,
            cancel_requested INTEGER NOT NULL DEFAULT 0,
            validation_report TEXT,
            error_message TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sync_batches (
            run_id TEXT NOT NULL REFERENCES sync_runs(run_id),
            batch_index INTEGER NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            component TEXT NOT NULL,
            natural_keys TEXT NOT NULL,
            records_applied INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            started_at TEXT,
            ended_at TEXT,
            UNIQUE(run_id, batch_index)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sync_errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            component TEXT NOT NULL,
            natural_key TEXT,
            error_type TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            schedule_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            cron TEXT NOT NULL,
            lookback_days INTEGER NOT NULL CHECK (lookback_days BETWEEN 1 AND 90),
            components TEXT NOT NULL DEFAULT '[]',
            active INTEGER NOT NULL DEFAULT 1,
            deployed INTEGER NOT NULL DEFAULT 0,
            last_run_at TEXT,
            next_run_at TEXT,
            last_run_id TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS backups (
            run_id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_hearings_event_id ON hearings(event_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_committees_system_code ON committees(system_code)",
        "CREATE INDEX IF NOT EXISTS idx_hearings_last_modified ON hearings(last_modified)",
        "CREATE INDEX IF NOT EXISTS idx_witnesses_hearing ON witnesses(hearing_id)",
        "CREATE INDEX IF NOT EXISTS idx_documents_hearing ON hearing_documents(hearing_id)",
        "CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at)",
        "CREATE INDEX IF NOT EXISTS idx_sync_errors_run ON sync_errors(run_id)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized");

    Ok(())
}
