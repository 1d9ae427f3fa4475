//! Hearing row operations
//!
//! A hearing row owns dependent witness, document, and committee-link rows.
//! The hearing row itself is only ever inserted once and updated in place;
//! dependent rows are reconciled inside the caller's transaction.

use crate::models::HearingRecord;
use chrono::Utc;
use lgw_common::Result;
use sqlx::sqlite::SqliteConnection;

/// Resolve a hearing natural key to its surrogate id
pub async fn find_id_by_event_id<'e, E>(executor: E, event_id: &str) -> Result<Option<i64>>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM hearings WHERE event_id = ?")
        .bind(event_id)
        .fetch_optional(executor)
        .await?;

    Ok(id)
}

/// Stored last_modified for a hearing, used by change classification
pub async fn last_modified<'e, E>(executor: E, id: i64) -> Result<Option<String>>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let value = sqlx::query_scalar::<_, String>("SELECT last_modified FROM hearings WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(value)
}

/// Insert a new hearing row, returning the generated surrogate id
///
/// Dependent rows are written separately via [`replace_children`].
pub async fn insert_hearing(conn: &mut SqliteConnection, record: &HearingRecord) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO hearings (event_id, title, chamber, congress, event_date, status, last_modified, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.event_id)
    .bind(&record.title)
    .bind(&record.chamber)
    .bind(record.congress)
    .bind(&record.event_date)
    .bind(&record.status)
    .bind(record.last_modified.to_rfc3339())
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Update an existing hearing row in place, keyed by surrogate id
///
/// Never delete-and-reinsert: witnesses, documents, and committee links hold
/// foreign keys to this id. Returns true when any stored field changed.
pub async fn update_hearing(
    conn: &mut SqliteConnection,
    id: i64,
    record: &HearingRecord,
) -> Result<bool> {
    let existing: Option<(String, String, i64, Option<String>, Option<String>, String)> =
        sqlx::query_as(
            "SELECT title, chamber, congress, event_date, status, last_modified
             FROM hearings WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some((title, chamber, congress, event_date, status, stored_last_modified)) = existing
    else {
        return Err(lgw_common::Error::NotFound(format!("hearing id {}", id)));
    };

    let new_last_modified = record.last_modified.to_rfc3339();
    let changed = title != record.title
        || chamber != record.chamber
        || congress != record.congress
        || event_date != record.event_date
        || status != record.status
        || stored_last_modified != new_last_modified;

    if !changed {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE hearings
        SET title = ?, chamber = ?, congress = ?, event_date = ?, status = ?, last_modified = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&record.title)
    .bind(&record.chamber)
    .bind(record.congress)
    .bind(&record.event_date)
    .bind(&record.status)
    .bind(&new_last_modified)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(conn)
    .await?;

    Ok(true)
}

/// Reconcile dependent rows for a hearing inside the caller's transaction
///
/// Witness and document rows are owned entirely by the payload and carry no
/// inbound references, so they are rebuilt. Committee links resolve each
/// system code to a committee surrogate id (inserting a placeholder when the
/// committee is unknown).
pub async fn replace_children(
    conn: &mut SqliteConnection,
    hearing_id: i64,
    record: &HearingRecord,
) -> Result<()> {
    sqlx::query("DELETE FROM witnesses WHERE hearing_id = ?")
        .bind(hearing_id)
        .execute(&mut *conn)
        .await?;
    for witness in &record.witnesses {
        sqlx::query(
            "INSERT INTO witnesses (hearing_id, name, organization, position) VALUES (?, ?, ?, ?)",
        )
        .bind(hearing_id)
        .bind(&witness.name)
        .bind(&witness.organization)
        .bind(&witness.position)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM hearing_documents WHERE hearing_id = ?")
        .bind(hearing_id)
        .execute(&mut *conn)
        .await?;
    for document in &record.documents {
        sqlx::query(
            "INSERT INTO hearing_documents (hearing_id, doc_type, title, url) VALUES (?, ?, ?, ?)",
        )
        .bind(hearing_id)
        .bind(&document.doc_type)
        .bind(&document.title)
        .bind(&document.url)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM hearing_committees WHERE hearing_id = ?")
        .bind(hearing_id)
        .execute(&mut *conn)
        .await?;
    for code in &record.committee_codes {
        let committee_id = super::committees::ensure_committee(&mut *conn, code).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO hearing_committees (hearing_id, committee_id) VALUES (?, ?)",
        )
        .bind(hearing_id)
        .bind(committee_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
