//! Upsert execution
//!
//! Applies one classified change inside the caller's transaction. Updates
//! always execute as UPDATE keyed by the existing surrogate id, never
//! delete-and-reinsert: witness, document, and committee-link rows hold
//! foreign keys to that id, and re-creating the row would orphan them.

use crate::db;
use crate::models::{CanonicalRecord, Change, ChangeKind};
use lgw_common::{Error, Result};
use sqlx::sqlite::SqliteConnection;

/// Result of applying one change
#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    pub surrogate_id: i64,
    /// False when the update turned out to be a no-op; the run must not
    /// count it as an applied update
    pub fields_changed: bool,
}

/// Apply one Added/Updated change within the caller's active transaction
///
/// A constraint violation here is fatal to the batch, not just the record:
/// it indicates an inconsistent transaction state, and the caller rolls the
/// whole batch back to its checkpoint.
pub async fn apply_change(conn: &mut SqliteConnection, change: &Change) -> Result<UpsertOutcome> {
    match (change.kind, &change.record) {
        (ChangeKind::Added, CanonicalRecord::Hearing(hearing)) => {
            let id = db::hearings::insert_hearing(&mut *conn, hearing).await?;
            db::hearings::replace_children(&mut *conn, id, hearing).await?;
            Ok(UpsertOutcome {
                surrogate_id: id,
                fields_changed: true,
            })
        }
        (ChangeKind::Added, CanonicalRecord::Committee(committee)) => {
            let id = db::committees::insert_committee(&mut *conn, committee).await?;
            Ok(UpsertOutcome {
                surrogate_id: id,
                fields_changed: true,
            })
        }
        (ChangeKind::Updated, CanonicalRecord::Hearing(hearing)) => {
            let id = existing_id(change)?;
            let fields_changed = db::hearings::update_hearing(&mut *conn, id, hearing).await?;
            db::hearings::replace_children(&mut *conn, id, hearing).await?;
            Ok(UpsertOutcome {
                surrogate_id: id,
                fields_changed,
            })
        }
        (ChangeKind::Updated, CanonicalRecord::Committee(committee)) => {
            let id = existing_id(change)?;
            let fields_changed = db::committees::update_committee(&mut *conn, id, committee).await?;
            Ok(UpsertOutcome {
                surrogate_id: id,
                fields_changed,
            })
        }
        (ChangeKind::Unchanged, _) => Err(Error::InvalidInput(
            "Unchanged records are discarded before apply".to_string(),
        )),
    }
}

fn existing_id(change: &Change) -> Result<i64> {
    change.existing_id.ok_or_else(|| {
        Error::Internal(format!(
            "Updated change for {} carries no surrogate id",
            change.record.natural_key()
        ))
    })
}
