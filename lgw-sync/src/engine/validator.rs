//! Post-apply validation
//!
//! Runs after a run's mutations are applied and produces an immutable
//! ValidationReport. Critical issues (referential violations, duplicate
//! natural keys) trigger a run-level rollback in the runner; warnings
//! (anomalies, staleness, low-confidence samples) are recorded only.
//!
//! The confidence score tells downstream monitoring how much to trust a
//! "passed" result: a pass over three rows with no history is worth less
//! than a pass over thousands with a deep baseline.

use crate::db::runs;
use crate::models::{SyncRun, ValidationIssue, ValidationReport};
use chrono::Utc;
use lgw_common::Result;
use sqlx::SqlitePool;

/// Confidence score weights
const WEIGHT_CHECK_COMPLETION: f64 = 0.35;
const WEIGHT_SAMPLE_SIZE: f64 = 0.25;
const WEIGHT_BASELINE: f64 = 0.20;
const WEIGHT_WARNING_DENSITY: f64 = 0.20;

/// Sample size at which the sample-adequacy factor saturates
const SAMPLE_SATURATION: f64 = 100.0;
/// Warning count at which the warning-density factor bottoms out
const WARNING_SATURATION: f64 = 10.0;

/// Post-apply integrity and anomaly checks
pub struct Validator {
    pub staleness_threshold_hours: i64,
    pub anomaly_window_runs: usize,
}

impl Validator {
    pub fn new(staleness_threshold_hours: i64, anomaly_window_runs: usize) -> Self {
        Self {
            staleness_threshold_hours,
            anomaly_window_runs,
        }
    }

    /// Run the full check suite against the store
    pub async fn validate(&self, pool: &SqlitePool, run: &SyncRun) -> ValidationReport {
        let mut issues = Vec::new();
        let mut records_sampled = 0usize;
        let mut checks_completed = 0usize;
        let mut baseline_runs = 0usize;

        let checks: [(&str, CheckResult); 5] = [
            ("referential_integrity", self.check_referential_integrity(pool).await),
            ("duplicate_natural_keys", self.check_duplicate_natural_keys(pool).await),
            ("duplicate_dependents", self.check_duplicate_dependents(pool).await),
            ("freshness", self.check_freshness(pool).await),
            ("anomaly", self.check_anomaly(pool, run, &mut baseline_runs).await),
        ];
        let checks_total = checks.len();

        for (name, result) in checks {
            match result {
                Ok(outcome) => {
                    checks_completed += 1;
                    records_sampled += outcome.rows_examined;
                    issues.extend(outcome.issues);
                }
                Err(err) => {
                    // A check that cannot run is itself a warning; the
                    // confidence score drops through check completion
                    tracing::error!(check = name, error = %err, "Validation check failed to run");
                    issues.push(ValidationIssue::warning(
                        name,
                        format!("check did not complete: {}", err),
                    ));
                }
            }
        }

        let warnings = issues
            .iter()
            .filter(|i| i.severity == crate::models::Severity::Warning)
            .count();
        let passed = issues
            .iter()
            .all(|i| i.severity != crate::models::Severity::Critical);

        let confidence_score = confidence(
            checks_completed,
            checks_total,
            records_sampled,
            baseline_runs,
            self.anomaly_window_runs,
            warnings,
        );

        tracing::info!(
            run_id = %run.run_id,
            passed,
            issues = issues.len(),
            confidence = confidence_score,
            "Validation complete"
        );

        ValidationReport {
            passed,
            issues,
            confidence_score,
            checks_completed,
            checks_total,
            records_sampled,
            baseline_runs,
        }
    }

    /// Every foreign key in dependent tables must resolve to an existing row
    async fn check_referential_integrity(&self, pool: &SqlitePool) -> CheckResult {
        let mut outcome = CheckOutcome::default();

        let orphan_queries = [
            (
                "witnesses",
                "SELECT COUNT(*) FROM witnesses w LEFT JOIN hearings h ON w.hearing_id = h.id WHERE h.id IS NULL",
            ),
            (
                "hearing_documents",
                "SELECT COUNT(*) FROM hearing_documents d LEFT JOIN hearings h ON d.hearing_id = h.id WHERE h.id IS NULL",
            ),
            (
                "hearing_committees(hearing)",
                "SELECT COUNT(*) FROM hearing_committees hc LEFT JOIN hearings h ON hc.hearing_id = h.id WHERE h.id IS NULL",
            ),
            (
                "hearing_committees(committee)",
                "SELECT COUNT(*) FROM hearing_committees hc LEFT JOIN committees c ON hc.committee_id = c.id WHERE c.id IS NULL",
            ),
        ];

        for (table, query) in orphan_queries {
            let orphans: i64 = sqlx::query_scalar(query).fetch_one(pool).await?;
            if orphans > 0 {
                outcome.issues.push(ValidationIssue::critical(
                    "referential_integrity",
                    format!("{} orphaned rows in {}", orphans, table),
                ));
            }
        }

        let total_dependents: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM witnesses)
                  + (SELECT COUNT(*) FROM hearing_documents)
                  + (SELECT COUNT(*) FROM hearing_committees)",
        )
        .fetch_one(pool)
        .await?;
        outcome.rows_examined = total_dependents as usize;

        Ok(outcome)
    }

    /// No two rows may share a natural key
    async fn check_duplicate_natural_keys(&self, pool: &SqlitePool) -> CheckResult {
        let mut outcome = CheckOutcome::default();

        let duplicate_hearings: Vec<(String, i64)> = sqlx::query_as(
            "SELECT event_id, COUNT(*) FROM hearings GROUP BY event_id HAVING COUNT(*) > 1",
        )
        .fetch_all(pool)
        .await?;
        for (event_id, count) in duplicate_hearings {
            outcome.issues.push(ValidationIssue::critical(
                "duplicate_natural_keys",
                format!("hearing natural key {} appears {} times", event_id, count),
            ));
        }

        let duplicate_committees: Vec<(String, i64)> = sqlx::query_as(
            "SELECT system_code, COUNT(*) FROM committees GROUP BY system_code HAVING COUNT(*) > 1",
        )
        .fetch_all(pool)
        .await?;
        for (system_code, count) in duplicate_committees {
            outcome.issues.push(ValidationIssue::critical(
                "duplicate_natural_keys",
                format!("committee natural key {} appears {} times", system_code, count),
            ));
        }

        let total: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM hearings) + (SELECT COUNT(*) FROM committees)",
        )
        .fetch_one(pool)
        .await?;
        outcome.rows_examined = total as usize;

        Ok(outcome)
    }

    /// Dependent rows must not be unintentionally duplicated
    async fn check_duplicate_dependents(&self, pool: &SqlitePool) -> CheckResult {
        let mut outcome = CheckOutcome::default();

        let duplicate_witnesses: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT hearing_id FROM witnesses
                GROUP BY hearing_id, name, COALESCE(organization, '')
                HAVING COUNT(*) > 1
            )
            "#,
        )
        .fetch_one(pool)
        .await?;
        if duplicate_witnesses > 0 {
            outcome.issues.push(ValidationIssue::warning(
                "duplicate_dependents",
                format!(
                    "{} witness appearances duplicated within a hearing",
                    duplicate_witnesses
                ),
            ));
        }

        let duplicate_links: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT hearing_id FROM hearing_committees
                GROUP BY hearing_id, committee_id
                HAVING COUNT(*) > 1
            )
            "#,
        )
        .fetch_one(pool)
        .await?;
        if duplicate_links > 0 {
            outcome.issues.push(ValidationIssue::warning(
                "duplicate_dependents",
                format!("{} hearing-committee links duplicated", duplicate_links),
            ));
        }

        let total: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM witnesses) + (SELECT COUNT(*) FROM hearing_committees)",
        )
        .fetch_one(pool)
        .await?;
        outcome.rows_examined = total as usize;

        Ok(outcome)
    }

    /// The most recent successful run must not be older than the staleness
    /// threshold
    async fn check_freshness(&self, pool: &SqlitePool) -> CheckResult {
        let mut outcome = CheckOutcome::default();

        match runs::latest_success_ended_at(pool).await? {
            Some(ended_at) => {
                outcome.rows_examined = 1;
                let age_hours = (Utc::now() - ended_at).num_hours();
                if age_hours > self.staleness_threshold_hours {
                    outcome.issues.push(ValidationIssue::warning(
                        "freshness",
                        format!(
                            "last successful run is {} hours old (threshold {})",
                            age_hours, self.staleness_threshold_hours
                        ),
                    ));
                }
            }
            None => {
                // First run ever; nothing to be stale against
            }
        }

        Ok(outcome)
    }

    /// Compare this run's change volume against a rolling baseline of prior
    /// successful runs; statistically unusual spikes are warnings, never
    /// hard failures
    async fn check_anomaly(
        &self,
        pool: &SqlitePool,
        run: &SyncRun,
        baseline_runs: &mut usize,
    ) -> CheckResult {
        let mut outcome = CheckOutcome::default();

        let volumes =
            runs::recent_success_volumes(pool, run.run_id, self.anomaly_window_runs).await?;
        *baseline_runs = volumes.len();
        outcome.rows_examined = volumes.len();

        // Need a few runs of history before deviation means anything
        if volumes.len() < 3 {
            return Ok(outcome);
        }

        let volume = (run.metrics.added + run.metrics.updated) as f64;
        let (mean, std_dev) = mean_and_std_dev(&volumes);
        let threshold = mean + 2.0 * std_dev.max(1.0);

        if volume > threshold {
            outcome.issues.push(ValidationIssue::warning(
                "anomaly",
                format!(
                    "change volume {} exceeds baseline {:.1} ± 2×{:.1} over {} prior runs",
                    volume as u64,
                    mean,
                    std_dev,
                    volumes.len()
                ),
            ));
        }

        // Per-chamber activity: a single chamber absorbing the whole run's
        // additions is unusual for a mixed store
        let chamber_counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT chamber, COUNT(*) FROM hearings WHERE created_at >= ? GROUP BY chamber",
        )
        .bind(run.started_at.to_rfc3339())
        .fetch_all(pool)
        .await?;

        let added_total: i64 = chamber_counts.iter().map(|(_, c)| c).sum();
        if added_total >= 20 {
            for (chamber, count) in &chamber_counts {
                let share = *count as f64 / added_total as f64;
                if share > 0.95 {
                    outcome.issues.push(ValidationIssue::warning(
                        "anomaly",
                        format!(
                            "{:.0}% of this run's {} new hearings are in chamber '{}'",
                            share * 100.0,
                            added_total,
                            chamber
                        ),
                    ));
                }
            }
        }

        Ok(outcome)
    }
}

#[derive(Debug, Default)]
struct CheckOutcome {
    issues: Vec<ValidationIssue>,
    rows_examined: usize,
}

type CheckResult = Result<CheckOutcome>;

fn mean_and_std_dev(values: &[u64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<u64>() as f64 / n;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Weighted confidence in a validation result
fn confidence(
    checks_completed: usize,
    checks_total: usize,
    records_sampled: usize,
    baseline_runs: usize,
    baseline_window: usize,
    warnings: usize,
) -> f64 {
    let completion = if checks_total == 0 {
        0.0
    } else {
        checks_completed as f64 / checks_total as f64
    };
    let sample = (records_sampled as f64 / SAMPLE_SATURATION).min(1.0);
    let baseline = if baseline_window == 0 {
        0.0
    } else {
        (baseline_runs as f64 / baseline_window as f64).min(1.0)
    };
    let warning_density = 1.0 - (warnings as f64 / WARNING_SATURATION).min(1.0);

    let score = completion * WEIGHT_CHECK_COMPLETION
        + sample * WEIGHT_SAMPLE_SIZE
        + baseline * WEIGHT_BASELINE
        + warning_density * WEIGHT_WARNING_DENSITY;

    (score * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev_basics() {
        let (mean, std_dev) = mean_and_std_dev(&[10, 10, 10]);
        assert_eq!(mean, 10.0);
        assert_eq!(std_dev, 0.0);

        let (mean, std_dev) = mean_and_std_dev(&[5, 15]);
        assert_eq!(mean, 10.0);
        assert_eq!(std_dev, 5.0);
    }

    #[test]
    fn full_marks_when_everything_is_healthy() {
        let score = confidence(5, 5, 500, 10, 10, 0);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn incomplete_checks_reduce_confidence() {
        let healthy = confidence(5, 5, 500, 10, 10, 0);
        let degraded = confidence(3, 5, 500, 10, 10, 0);
        assert!(degraded < healthy);
    }

    #[test]
    fn small_samples_and_thin_baselines_reduce_confidence() {
        let deep = confidence(5, 5, 500, 10, 10, 0);
        let shallow = confidence(5, 5, 3, 0, 10, 0);
        assert!(shallow < deep);
        // Check completion still dominates a shallow-history pass
        assert!(shallow >= WEIGHT_CHECK_COMPLETION);
    }

    #[test]
    fn warnings_drag_the_score_down() {
        let clean = confidence(5, 5, 500, 10, 10, 0);
        let noisy = confidence(5, 5, 500, 10, 10, 5);
        assert!(noisy < clean);
        assert!((clean - noisy - WEIGHT_WARNING_DENSITY * 0.5).abs() < 1e-9);
    }
}
