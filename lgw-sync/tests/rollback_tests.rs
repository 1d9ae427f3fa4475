//! Checkpoint exactness, run-level rollback on critical validation issues,
//! and loud restore failures.

mod helpers;

use helpers::db_utils::{count_rows, create_test_db, create_test_engine, sequence_value};
use helpers::mock_source::{hearing, MockSource};
use lgw_sync::engine::backup::BackupManager;
use lgw_sync::models::{RunStatus, TriggerSource};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test]
async fn restore_returns_store_to_checkpoint_state_exactly() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    // Seed some data so the auto-increment counters are non-trivial
    let source = MockSource::new();
    source.set_records(vec![
        hearing("A1", "Hearing A1", 10),
        hearing("A2", "Hearing A2", 10),
    ]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());
    engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    let backup = BackupManager::new(temp_dir.path().join("backups"), 3);
    let handle = backup.checkpoint(&pool, Uuid::new_v4()).await.unwrap();

    let hearings_before = count_rows(&pool, "hearings").await;
    let witnesses_before = count_rows(&pool, "witnesses").await;
    let seq_before = sequence_value(&pool, "hearings").await;

    // Mutate: add rows, delete a witness
    let source_b = MockSource::new();
    source_b.set_records(vec![
        hearing("A1", "Hearing A1", 10),
        hearing("A2", "Hearing A2", 10),
        hearing("A3", "Hearing A3", 11),
        hearing("A4", "Hearing A4", 11),
    ]);
    let engine_b = create_test_engine(&temp_dir, pool.clone(), source_b.registry());
    engine_b
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();
    sqlx::query("DELETE FROM witnesses WHERE hearing_id = 1")
        .execute(&pool)
        .await
        .unwrap();

    assert_ne!(count_rows(&pool, "hearings").await, hearings_before);

    backup.restore(&pool, &handle).await.unwrap();

    assert_eq!(count_rows(&pool, "hearings").await, hearings_before);
    assert_eq!(count_rows(&pool, "witnesses").await, witnesses_before);
    // Auto-increment counters restored too: the next insert must not skip
    // or reuse surrogate ids relative to checkpoint time
    assert_eq!(sequence_value(&pool, "hearings").await, seq_before);

    let next_id: i64 = {
        let result = sqlx::query(
            "INSERT INTO hearings (event_id, title, chamber, congress, last_modified, created_at, updated_at)
             VALUES ('ZZ', 'After restore', 'house', 119, '2026-03-01T00:00:00+00:00', '2026-03-01T00:00:00+00:00', '2026-03-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .unwrap();
        result.last_insert_rowid()
    };
    assert_eq!(next_id, seq_before + 1);
}

#[tokio::test]
async fn critical_validation_issue_rolls_back_the_whole_run() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    // Legacy-style corruption: two rows sharing a natural key. The unique
    // index guards new stores, so drop it to seed the condition the
    // validator must catch.
    sqlx::query("DROP INDEX idx_hearings_event_id")
        .execute(&pool)
        .await
        .unwrap();
    for title in ["Duplicate one", "Duplicate two"] {
        sqlx::query(
            "INSERT INTO hearings (event_id, title, chamber, congress, last_modified, created_at, updated_at)
             VALUES ('DUP', ?, 'house', 119, '2026-02-01T00:00:00+00:00', '2026-02-01T00:00:00+00:00', '2026-02-01T00:00:00+00:00')",
        )
        .bind(title)
        .execute(&pool)
        .await
        .unwrap();
    }

    let source = MockSource::new();
    source.set_records(vec![hearing("A1", "New hearing", 10)]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .contains("critical validation issues"));

    let report = lgw_sync::db::runs::get_validation_report(&pool, run.run_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!report.passed);
    assert!(report.critical_issues().count() >= 1);

    // The run's own additions were rolled back with the checkpoint; the
    // pre-existing duplicates are back exactly as they were
    let added: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hearings WHERE event_id = 'A1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(added, 0);
    let duplicates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hearings WHERE event_id = 'DUP'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(duplicates, 2);
}

#[tokio::test]
async fn missing_snapshot_makes_restore_fail_loudly() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let backup = BackupManager::new(temp_dir.path().join("backups"), 3);
    let handle = backup.checkpoint(&pool, Uuid::new_v4()).await.unwrap();

    std::fs::remove_file(&handle.path).unwrap();

    let err = backup.restore(&pool, &handle).await.unwrap_err();
    assert!(matches!(err, lgw_common::Error::RestoreFailed(_)));
}

#[tokio::test]
async fn corrupt_snapshot_makes_restore_fail_loudly() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let backup = BackupManager::new(temp_dir.path().join("backups"), 3);
    let handle = backup.checkpoint(&pool, Uuid::new_v4()).await.unwrap();

    // Flip bytes in the snapshot so the checksum no longer matches
    let mut bytes = std::fs::read(&handle.path).unwrap();
    let len = bytes.len();
    bytes[len / 2] ^= 0xFF;
    std::fs::write(&handle.path, bytes).unwrap();

    let err = backup.restore(&pool, &handle).await.unwrap_err();
    match err {
        lgw_common::Error::RestoreFailed(message) => {
            assert!(message.contains("checksum mismatch"));
        }
        other => panic!("expected RestoreFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn snapshots_are_pruned_to_the_retention_limit() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let backup = BackupManager::new(temp_dir.path().join("backups"), 2);
    for _ in 0..4 {
        backup.checkpoint(&pool, Uuid::new_v4()).await.unwrap();
        // Distinct created_at ordering for deterministic pruning
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let pruned = backup.prune(&pool).await.unwrap();
    assert_eq!(pruned, 2);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM backups")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 2);
}
