//! Backup & rollback management
//!
//! Run-level checkpoints are consistent snapshot files produced with
//! `VACUUM INTO`, checksummed with SHA-256 and registered in the `backups`
//! table. Restoring swaps the entity tables (and their auto-increment
//! counters in `sqlite_sequence`) back from the snapshot; the run ledger is
//! never rolled back, so a failed run stays auditable.
//!
//! Batch-level checkpoints are the enclosing SQLite transaction and live in
//! the batch coordinator, not here.

use crate::db::schema::ENTITY_TABLES;
use chrono::{DateTime, Utc};
use lgw_common::{Error, Result};
use sha2::{Digest, Sha256};
use sqlx::{Connection, Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Handle to one run-level checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointHandle {
    pub run_id: Uuid,
    pub path: PathBuf,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Creates, restores, and prunes run-level snapshots
pub struct BackupManager {
    backup_dir: PathBuf,
    /// Snapshots kept after pruning
    retention: usize,
}

impl BackupManager {
    pub fn new(backup_dir: PathBuf, retention: usize) -> Self {
        Self {
            backup_dir,
            retention: retention.max(1),
        }
    }

    /// Snapshot the store before a run mutates it
    pub async fn checkpoint(&self, pool: &SqlitePool, run_id: Uuid) -> Result<CheckpointHandle> {
        std::fs::create_dir_all(&self.backup_dir)?;

        let created_at = Utc::now();
        let path = self.backup_dir.join(format!(
            "lgw-{}-{}.db",
            created_at.format("%Y%m%dT%H%M%S"),
            run_id
        ));

        // VACUUM INTO produces a consistent single-file snapshot without
        // blocking readers
        sqlx::query("VACUUM INTO ?")
            .bind(path.display().to_string())
            .execute(pool)
            .await?;

        let sha256 = file_sha256(&path)?;

        sqlx::query(
            "INSERT INTO backups (run_id, path, sha256, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(run_id.to_string())
        .bind(path.display().to_string())
        .bind(&sha256)
        .bind(created_at.to_rfc3339())
        .execute(pool)
        .await?;

        tracing::info!(
            run_id = %run_id,
            path = %path.display(),
            "Checkpoint created"
        );

        Ok(CheckpointHandle {
            run_id,
            path,
            sha256,
            created_at,
        })
    }

    /// Load the registered checkpoint for a run, if any
    pub async fn find_checkpoint(
        &self,
        pool: &SqlitePool,
        run_id: Uuid,
    ) -> Result<Option<CheckpointHandle>> {
        let row = sqlx::query("SELECT path, sha256, created_at FROM backups WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(pool)
            .await?;

        row.map(|row| {
            let created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
                .with_timezone(&Utc);

            Ok(CheckpointHandle {
                run_id,
                path: PathBuf::from(row.get::<String, _>("path")),
                sha256: row.get("sha256"),
                created_at,
            })
        })
        .transpose()
    }

    /// Restore the entity tables exactly as they were at checkpoint time
    ///
    /// Verification failures (missing or corrupt snapshot) and any error
    /// mid-restore are fatal and non-retryable; the caller must surface them
    /// loudly and stop.
    pub async fn restore(&self, pool: &SqlitePool, handle: &CheckpointHandle) -> Result<()> {
        if !handle.path.exists() {
            return Err(Error::RestoreFailed(format!(
                "checkpoint file missing: {}",
                handle.path.display()
            )));
        }

        let actual = file_sha256(&handle.path)
            .map_err(|e| Error::RestoreFailed(format!("checkpoint unreadable: {}", e)))?;
        if actual != handle.sha256 {
            return Err(Error::RestoreFailed(format!(
                "checkpoint checksum mismatch for {} (expected {}, got {})",
                handle.path.display(),
                handle.sha256,
                actual
            )));
        }

        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| Error::RestoreFailed(format!("cannot acquire connection: {}", e)))?;

        let result = restore_tables(&mut conn, &handle.path).await;

        // Best-effort detach; the connection returns to the pool either way
        let _ = sqlx::query("DETACH DATABASE checkpoint")
            .execute(&mut *conn)
            .await;

        result.map_err(|e| Error::RestoreFailed(e.to_string()))?;

        tracing::warn!(
            run_id = %handle.run_id,
            path = %handle.path.display(),
            "Store restored from checkpoint"
        );

        Ok(())
    }

    /// Keep only the newest `retention` snapshots
    ///
    /// Called after each successful run.
    pub async fn prune(&self, pool: &SqlitePool) -> Result<usize> {
        let stale: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT run_id, path FROM backups
            ORDER BY created_at DESC
            LIMIT -1 OFFSET ?
            "#,
        )
        .bind(self.retention as i64)
        .fetch_all(pool)
        .await?;

        for (run_id, path) in &stale {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path, error = %e, "Failed to remove stale snapshot");
                }
            }
            sqlx::query("DELETE FROM backups WHERE run_id = ?")
                .bind(run_id)
                .execute(pool)
                .await?;
        }

        if !stale.is_empty() {
            tracing::debug!(pruned = stale.len(), "Pruned stale snapshots");
        }

        Ok(stale.len())
    }
}

/// Swap entity-table contents back from an attached snapshot
async fn restore_tables(
    conn: &mut sqlx::SqliteConnection,
    snapshot: &Path,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("ATTACH DATABASE ? AS checkpoint")
        .bind(snapshot.display().to_string())
        .execute(&mut *conn)
        .await?;

    let mut txn = conn.begin().await?;

    // Children first on delete, parents first on insert
    for table in ENTITY_TABLES.iter().rev() {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *txn)
            .await?;
    }
    for table in ENTITY_TABLES {
        sqlx::query(&format!(
            "INSERT INTO {} SELECT * FROM checkpoint.{}",
            table, table
        ))
        .execute(&mut *txn)
        .await?;
    }

    // Auto-increment counters must match the checkpoint exactly; otherwise
    // new rows after a restore would reuse or skip surrogate ids
    let placeholders = ENTITY_TABLES.map(|_| "?").join(", ");
    sqlx::query(&format!(
        "DELETE FROM sqlite_sequence WHERE name IN ({})",
        placeholders
    ))
    .bind(ENTITY_TABLES[0])
    .bind(ENTITY_TABLES[1])
    .bind(ENTITY_TABLES[2])
    .bind(ENTITY_TABLES[3])
    .bind(ENTITY_TABLES[4])
    .execute(&mut *txn)
    .await?;

    sqlx::query(&format!(
        "INSERT INTO sqlite_sequence (name, seq)
         SELECT name, seq FROM checkpoint.sqlite_sequence WHERE name IN ({})",
        placeholders
    ))
    .bind(ENTITY_TABLES[0])
    .bind(ENTITY_TABLES[1])
    .bind(ENTITY_TABLES[2])
    .bind(ENTITY_TABLES[3])
    .bind(ENTITY_TABLES[4])
    .execute(&mut *txn)
    .await?;

    txn.commit().await
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = std::fs::read(path)?;
    let hash = Sha256::digest(&contents);
    Ok(format!("{:x}", hash))
}
