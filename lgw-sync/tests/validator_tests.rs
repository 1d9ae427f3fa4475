//! Validator behavior against real store states.

mod helpers;

use helpers::db_utils::create_test_db;
use lgw_sync::engine::validator::Validator;
use lgw_sync::models::{Severity, SyncComponent, SyncRun, TriggerSource};

fn test_run() -> SyncRun {
    SyncRun::new(TriggerSource::Test, None, 7, SyncComponent::all())
}

#[tokio::test]
async fn clean_store_passes() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();

    let report = Validator::new(48, 10).validate(&pool, &test_run()).await;

    assert!(report.passed);
    assert_eq!(report.checks_completed, report.checks_total);
    assert_eq!(report.critical_issues().count(), 0);
    // Empty store, no history: a pass, but not a confident one
    assert!(report.confidence_score < 0.8);
}

#[tokio::test]
async fn orphaned_dependent_rows_are_critical() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();

    // Seed an orphan with FK enforcement off, as legacy data might carry
    let mut conn = pool.acquire().await.unwrap();
    sqlx::query("PRAGMA foreign_keys = OFF")
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query("INSERT INTO witnesses (hearing_id, name) VALUES (9999, 'Orphan Witness')")
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await
        .unwrap();
    drop(conn);

    let report = Validator::new(48, 10).validate(&pool, &test_run()).await;

    assert!(!report.passed);
    let critical: Vec<_> = report.critical_issues().collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].check, "referential_integrity");
}

#[tokio::test]
async fn stale_last_success_is_a_warning_not_a_failure() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();

    // A successful run that ended 10 days ago
    sqlx::query(
        r#"
        INSERT INTO sync_runs (run_id, status, trigger_source, lookback_days, components,
                               started_at, ended_at)
        VALUES ('00000000-0000-0000-0000-000000000001', 'completed', 'scheduled', 7, '[]',
                ?, ?)
        "#,
    )
    .bind((chrono::Utc::now() - chrono::Duration::days(10)).to_rfc3339())
    .bind((chrono::Utc::now() - chrono::Duration::days(10)).to_rfc3339())
    .execute(&pool)
    .await
    .unwrap();

    let report = Validator::new(48, 10).validate(&pool, &test_run()).await;

    assert!(report.passed);
    let freshness: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.check == "freshness")
        .collect();
    assert_eq!(freshness.len(), 1);
    assert_eq!(freshness[0].severity, Severity::Warning);
}

#[tokio::test]
async fn volume_spike_against_baseline_is_a_warning() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();

    // Baseline: five successful runs that each changed ~10 records
    for i in 0..5 {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (run_id, status, trigger_source, lookback_days, components,
                                   records_added, records_updated, started_at, ended_at)
            VALUES (?, 'completed', 'scheduled', 7, '[]', 8, 2, ?, ?)
            "#,
        )
        .bind(format!("00000000-0000-0000-0000-00000000000{}", i + 1))
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();
    }

    // This run claims a 50x spike
    let mut run = test_run();
    run.metrics.added = 450;
    run.metrics.updated = 50;

    let report = Validator::new(48, 10).validate(&pool, &run).await;

    assert!(report.passed, "anomalies warn, they do not fail the run");
    assert_eq!(report.baseline_runs, 5);
    let anomalies: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.check == "anomaly")
        .collect();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].severity, Severity::Warning);
    assert!(anomalies[0].message.contains("exceeds baseline"));
}
