//! Validation report types
//!
//! Produced once per run after mutations are applied, never mutated
//! afterward. Serializable so monitoring collaborators can consume it from
//! the ledger.

use serde::{Deserialize, Serialize};

/// Issue severity
///
/// Critical issues (referential violations, duplicate natural keys) trigger
/// a run-level rollback; warnings are recorded but do not block commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

/// One finding from a validation check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Check that produced the issue (e.g. "referential_integrity")
    pub check: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn critical(check: &str, message: String) -> Self {
        Self {
            severity: Severity::Critical,
            check: check.to_string(),
            message,
        }
    }

    pub fn warning(check: &str, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            check: check.to_string(),
            message,
        }
    }
}

/// Result of a post-apply validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no critical issue was found
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
    /// 0.0–1.0; how much a "passed" result should be trusted
    pub confidence_score: f64,
    /// Checks that ran to completion without internal error
    pub checks_completed: usize,
    pub checks_total: usize,
    /// Rows examined across the checks
    pub records_sampled: usize,
    /// Prior successful runs available for the anomaly baseline
    pub baseline_runs: usize,
}

impl ValidationReport {
    pub fn critical_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_filters_partition_issues() {
        let report = ValidationReport {
            passed: false,
            issues: vec![
                ValidationIssue::critical("duplicate_natural_keys", "event LC1 twice".into()),
                ValidationIssue::warning("anomaly", "unusual spike".into()),
            ],
            confidence_score: 0.7,
            checks_completed: 5,
            checks_total: 5,
            records_sampled: 42,
            baseline_runs: 3,
        };
        assert_eq!(report.critical_issues().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn report_serializes_for_monitoring() {
        let report = ValidationReport {
            passed: true,
            issues: vec![],
            confidence_score: 0.93,
            checks_completed: 5,
            checks_total: 5,
            records_sampled: 10,
            baseline_runs: 8,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"passed\":true"));
        assert!(json.contains("\"confidence_score\":0.93"));
    }
}
