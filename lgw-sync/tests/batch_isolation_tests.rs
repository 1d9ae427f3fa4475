//! Batch isolation: a failing batch must not disturb earlier committed
//! batches, and later batches must still be attempted.

mod helpers;

use helpers::db_utils::{count_rows, create_test_db, create_test_engine};
use helpers::mock_source::{hearing, MockSource};
use lgw_sync::db::batches::BatchState;
use lgw_sync::db::settings::set_setting;
use lgw_sync::models::{CanonicalRecord, RunStatus, TriggerSource};
use tokio_util::sync::CancellationToken;

/// A hearing that passes parsing but fails the batch coordinator's fast
/// required-field checks
fn poisoned_hearing(event_id: &str) -> CanonicalRecord {
    let mut record = hearing(event_id, "placeholder", 10);
    if let CanonicalRecord::Hearing(ref mut h) = record {
        h.title = String::new();
    }
    record
}

#[tokio::test]
async fn failing_middle_batch_is_isolated() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    set_setting(&pool, "sync.batch_size", "2").await.unwrap();

    // Batches: [A1, A2] [B1(poisoned), B2] [C1, C2]
    let source = MockSource::new();
    source.set_records(vec![
        hearing("A1", "Hearing A1", 10),
        hearing("A2", "Hearing A2", 10),
        poisoned_hearing("B1"),
        hearing("B2", "Hearing B2", 10),
        hearing("C1", "Hearing C1", 10),
        hearing("C2", "Hearing C2", 10),
    ]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.batch_count, 3);
    assert_eq!(run.completed_batches, 3);
    // Two records lost to the rolled-back batch
    assert_eq!(run.metrics.errors, 2);
    assert_eq!(run.metrics.added, 4);

    let batches = lgw_sync::db::batches::load_batches(&pool, run.run_id)
        .await
        .unwrap();
    assert_eq!(batches[0].state, BatchState::Committed);
    assert_eq!(batches[1].state, BatchState::RolledBack);
    assert!(batches[1]
        .error_message
        .as_deref()
        .unwrap()
        .contains("missing required fields"));
    assert_eq!(batches[2].state, BatchState::Committed);

    // Earlier and later batches are in the store; the failed batch is not
    for key in ["A1", "A2", "C1", "C2"] {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hearings WHERE event_id = ?")
            .bind(key)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1, "{} should be committed", key);
    }
    for key in ["B1", "B2"] {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hearings WHERE event_id = ?")
            .bind(key)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "{} should have rolled back", key);
    }
}

#[tokio::test]
async fn cancellation_stops_at_a_batch_boundary() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    set_setting(&pool, "sync.batch_size", "1").await.unwrap();

    let source = MockSource::new();
    source.set_records(vec![
        hearing("A1", "Hearing A1", 10),
        hearing("A2", "Hearing A2", 10),
    ]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    // Token cancelled before the run starts applying: the coordinator
    // checks between batches, so nothing commits
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), cancel)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.completed_batches, 0);
    assert_eq!(count_rows(&pool, "hearings").await, 0);

    let batches = lgw_sync::db::batches::load_batches(&pool, run.run_id)
        .await
        .unwrap();
    assert!(batches.iter().all(|b| b.state == BatchState::Pending));
}

#[tokio::test]
async fn out_of_band_cancel_flag_is_honored() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let source = MockSource::new();
    source.set_records(vec![hearing("A1", "Hearing A1", 10)]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    // Prepare, set the persisted cancel flag as an operator would, then
    // execute: the coordinator reads the flag between batches
    let run = engine
        .prepare_run(TriggerSource::Test, None, 7, Vec::new())
        .await
        .unwrap();
    lgw_sync::db::runs::request_cancel(&pool, run.run_id)
        .await
        .unwrap();

    let settled = engine
        .execute_prepared(run, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(settled.status, RunStatus::Cancelled);
    assert_eq!(count_rows(&pool, "hearings").await, 0);
}
