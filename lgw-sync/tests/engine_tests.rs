//! End-to-end engine scenarios: initial import, idempotent re-run, and
//! surrogate-key stability across updates.

mod helpers;

use helpers::db_utils::{count_rows, create_test_db, create_test_engine};
use helpers::mock_source::{hearing, MockSource};
use lgw_sync::db::settings::set_setting;
use lgw_sync::models::{RunStatus, TriggerSource};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn initial_import_processes_in_two_batches() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    set_setting(&pool, "sync.batch_size", "2").await.unwrap();

    let source = MockSource::new();
    source.set_records(vec![
        hearing("A1", "First hearing", 10),
        hearing("A2", "Second hearing", 10),
        hearing("A3", "Third hearing", 10),
    ]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.metrics.checked, 3);
    assert_eq!(run.metrics.added, 3);
    assert_eq!(run.metrics.updated, 0);
    assert_eq!(run.metrics.errors, 0);

    // Batch size 2 over 3 records: two batches, both committed
    assert_eq!(run.batch_count, 2);
    assert_eq!(run.completed_batches, 2);
    let batches = lgw_sync::db::batches::load_batches(&pool, run.run_id)
        .await
        .unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].natural_keys.len(), 2);
    assert_eq!(batches[1].natural_keys.len(), 1);
    assert!(batches
        .iter()
        .all(|b| b.state == lgw_sync::db::batches::BatchState::Committed));

    assert_eq!(count_rows(&pool, "hearings").await, 3);
    assert_eq!(count_rows(&pool, "witnesses").await, 3);
    // Committee placeholder created for the link target
    assert_eq!(count_rows(&pool, "committees").await, 1);
}

#[tokio::test]
async fn rerun_with_no_upstream_changes_is_idempotent() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let source = MockSource::new();
    source.set_records(vec![
        hearing("A1", "First hearing", 10),
        hearing("A2", "Second hearing", 10),
        hearing("A3", "Third hearing", 10),
    ]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let first = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.metrics.added, 3);

    let second = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.metrics.checked, 3);
    assert_eq!(second.metrics.added, 0);
    assert_eq!(second.metrics.updated, 0);
    assert_eq!(second.metrics.unchanged, 3);
    assert_eq!(second.batch_count, 0);

    assert_eq!(count_rows(&pool, "hearings").await, 3);
}

#[tokio::test]
async fn update_reuses_surrogate_id_and_keeps_dependents_valid() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let source = MockSource::new();
    source.set_records(vec![
        hearing("A1", "First hearing", 10),
        hearing("A2", "Second hearing", 10),
        hearing("A3", "Third hearing", 10),
    ]);
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    let id_before: i64 = sqlx::query_scalar("SELECT id FROM hearings WHERE event_id = 'A2'")
        .fetch_one(&pool)
        .await
        .unwrap();

    // A2 changed remotely: newer last_modified, new title
    source.set_records(vec![
        hearing("A1", "First hearing", 10),
        hearing("A2", "Second hearing (rescheduled)", 12),
        hearing("A3", "Third hearing", 10),
    ]);

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.metrics.updated, 1);
    assert_eq!(run.metrics.added, 0);
    assert_eq!(run.metrics.unchanged, 2);

    let (id_after, title): (i64, String) =
        sqlx::query_as("SELECT id, title FROM hearings WHERE event_id = 'A2'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(id_after, id_before, "update must reuse the surrogate id");
    assert_eq!(title, "Second hearing (rescheduled)");

    // Dependent rows still reference a valid hearing
    let orphaned: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM witnesses w LEFT JOIN hearings h ON w.hearing_id = h.id WHERE h.id IS NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphaned, 0);
}

#[tokio::test]
async fn parse_failures_skip_the_record_and_continue() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let source = MockSource::new();
    source.set_records(vec![hearing("A1", "Good hearing", 10)]);
    source.push_raw(serde_json::json!({"component": "hearing", "garbage": true}));
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.metrics.checked, 2);
    assert_eq!(run.metrics.added, 1);
    assert_eq!(run.metrics.errors, 1);

    let errors = lgw_sync::db::errors::errors_for_run(&pool, run.run_id)
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, "parse_error");
}

#[tokio::test]
async fn fetch_failure_fails_the_run_but_stays_in_the_ledger() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let source = MockSource::new();
    source.fail_with("connection reset by upstream");
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let run = engine
        .start_run(TriggerSource::Test, None, 7, Vec::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.as_deref().unwrap().contains("detection"));

    let stored = lgw_sync::db::runs::get_run(&pool, run.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(stored.ended_at.is_some());
}

#[tokio::test]
async fn second_concurrent_run_is_refused() {
    let (temp_dir, pool) = create_test_db().await.unwrap();

    let source = MockSource::new();
    let engine = create_test_engine(&temp_dir, pool.clone(), source.registry());

    let prepared = engine
        .prepare_run(TriggerSource::Test, None, 7, Vec::new())
        .await
        .unwrap();

    // First run is still registered as running
    let refused = engine.prepare_run(TriggerSource::Test, None, 7, Vec::new()).await;
    assert!(refused.is_err());

    // Settle the first run so the store is clean for other assertions
    let settled = engine
        .execute_prepared(prepared, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(settled.status, RunStatus::Completed);

    let terminal: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs WHERE status != 'running'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(terminal, 1);
}
