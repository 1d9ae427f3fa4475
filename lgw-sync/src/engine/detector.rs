//! Change detection
//!
//! Asks each selected Fetcher for candidate records inside the lookback
//! window, parses them, resolves natural keys, and classifies every record
//! as Added / Updated / Unchanged. Classification itself is pure; the only
//! writes here are record-level error log entries for skipped records.

use super::resolver;
use crate::db::errors::{record_error, SyncErrorType};
use crate::fetch::Source;
use crate::models::{CanonicalRecord, Change, ChangeKind};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Result of one detection pass
#[derive(Debug, Default)]
pub struct DetectionOutcome {
    /// Applicable changes (Added/Updated), in fetch order per component
    pub changes: Vec<Change>,
    /// All records returned by the fetchers, including skipped ones
    pub checked: usize,
    pub unchanged: usize,
    /// Records skipped for parse/validation failures
    pub skipped: usize,
}

/// Fetch, parse, resolve, and classify all records in the window
///
/// A Fetcher failure (already retried inside the client) aborts detection;
/// a Parser failure skips only the offending record.
pub async fn detect_changes(
    pool: &SqlitePool,
    run_id: Uuid,
    sources: &[Source],
    since: DateTime<Utc>,
) -> Result<DetectionOutcome> {
    let mut outcome = DetectionOutcome::default();

    for source in sources {
        let component = source.component();
        let raw_records = source.fetcher.fetch_changed_since(since).await?;

        tracing::info!(
            component = %component,
            fetched = raw_records.len(),
            since = %since,
            "Fetched candidate records"
        );

        for raw in &raw_records {
            outcome.checked += 1;

            let record = match source.parser.parse(raw) {
                Ok(record) => record,
                Err(err) => {
                    outcome.skipped += 1;
                    let natural_key = raw
                        .payload
                        .get("eventId")
                        .or_else(|| raw.payload.get("systemCode"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    tracing::warn!(
                        component = %component,
                        natural_key = natural_key.as_deref().unwrap_or("<unknown>"),
                        error = %err,
                        "Skipping unparseable record"
                    );
                    record_error(
                        pool,
                        run_id,
                        component,
                        natural_key.as_deref(),
                        SyncErrorType::ParseError,
                        &err.to_string(),
                    )
                    .await?;
                    continue;
                }
            };

            let change = classify_against_store(pool, record).await?;
            match change.kind {
                ChangeKind::Unchanged => outcome.unchanged += 1,
                ChangeKind::Added | ChangeKind::Updated => outcome.changes.push(change),
            }
        }
    }

    tracing::info!(
        checked = outcome.checked,
        added = outcome.changes.iter().filter(|c| c.kind == ChangeKind::Added).count(),
        updated = outcome.changes.iter().filter(|c| c.kind == ChangeKind::Updated).count(),
        unchanged = outcome.unchanged,
        skipped = outcome.skipped,
        "Change detection complete"
    );

    Ok(outcome)
}

/// Resolve one record against the store and classify it
pub async fn classify_against_store(pool: &SqlitePool, record: CanonicalRecord) -> Result<Change> {
    let component = record.component();
    let existing_id = resolver::resolve(pool, component, record.natural_key()).await?;

    let stored = match existing_id {
        Some(id) => resolver::stored_last_modified(pool, component, id).await?,
        None => None,
    };

    let kind = classify(record.last_modified(), existing_id.is_some(), stored);

    Ok(Change {
        kind,
        record,
        existing_id,
    })
}

/// Pure classification of a remote timestamp against local state
fn classify(
    remote_last_modified: DateTime<Utc>,
    exists: bool,
    stored_last_modified: Option<DateTime<Utc>>,
) -> ChangeKind {
    if !exists {
        return ChangeKind::Added;
    }
    match stored_last_modified {
        // Stored timestamp missing or unparseable: take the remote copy
        None => ChangeKind::Updated,
        Some(stored) if remote_last_modified > stored => ChangeKind::Updated,
        Some(_) => ChangeKind::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn unknown_key_is_added() {
        assert_eq!(classify(at(12), false, None), ChangeKind::Added);
    }

    #[test]
    fn newer_remote_is_updated() {
        assert_eq!(classify(at(12), true, Some(at(10))), ChangeKind::Updated);
    }

    #[test]
    fn equal_or_older_remote_is_unchanged() {
        assert_eq!(classify(at(10), true, Some(at(10))), ChangeKind::Unchanged);
        assert_eq!(classify(at(9), true, Some(at(10))), ChangeKind::Unchanged);
    }

    #[test]
    fn missing_stored_timestamp_forces_update() {
        assert_eq!(classify(at(12), true, None), ChangeKind::Updated);
    }
}
