//! Committee row operations

use crate::models::CommitteeRecord;
use chrono::Utc;
use lgw_common::Result;
use sqlx::sqlite::SqliteConnection;

/// Resolve a committee natural key to its surrogate id
pub async fn find_id_by_system_code<'e, E>(executor: E, system_code: &str) -> Result<Option<i64>>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM committees WHERE system_code = ?")
        .bind(system_code)
        .fetch_optional(executor)
        .await?;

    Ok(id)
}

/// Insert a new committee row, returning the generated surrogate id
pub async fn insert_committee(conn: &mut SqliteConnection, record: &CommitteeRecord) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO committees (system_code, name, chamber, committee_type, last_modified, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.system_code)
    .bind(&record.name)
    .bind(&record.chamber)
    .bind(&record.committee_type)
    .bind(record.last_modified.to_rfc3339())
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Update an existing committee row in place, keyed by surrogate id
///
/// Returns true when any stored field actually changed.
pub async fn update_committee(
    conn: &mut SqliteConnection,
    id: i64,
    record: &CommitteeRecord,
) -> Result<bool> {
    let existing: Option<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT name, chamber, committee_type, last_modified FROM committees WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((name, chamber, committee_type, last_modified)) = existing else {
        return Err(lgw_common::Error::NotFound(format!("committee id {}", id)));
    };

    let new_last_modified = record.last_modified.to_rfc3339();
    let changed = name != record.name
        || chamber != record.chamber
        || committee_type != record.committee_type
        || last_modified.as_deref() != Some(new_last_modified.as_str());

    if !changed {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE committees
        SET name = ?, chamber = ?, committee_type = ?, last_modified = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&record.name)
    .bind(&record.chamber)
    .bind(&record.committee_type)
    .bind(&new_last_modified)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(conn)
    .await?;

    Ok(true)
}

/// Resolve a committee by system code, inserting a placeholder row when the
/// code has not been synced yet
///
/// Hearings may reference committees the committee sync has not seen; the
/// link row needs a valid FK target either way. A later committee sync fills
/// the placeholder in through the normal update path.
pub async fn ensure_committee(conn: &mut SqliteConnection, system_code: &str) -> Result<i64> {
    if let Some(id) = find_id_by_system_code(&mut *conn, system_code).await? {
        return Ok(id);
    }

    let now = Utc::now().to_rfc3339();
    let chamber = chamber_from_system_code(system_code);
    let result = sqlx::query(
        r#"
        INSERT INTO committees (system_code, name, chamber, committee_type, last_modified, created_at, updated_at)
        VALUES (?, ?, ?, NULL, NULL, ?, ?)
        "#,
    )
    .bind(system_code)
    .bind(system_code)
    .bind(chamber)
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Infer chamber from the system code prefix ("hs" house, "ss" senate, "js" joint)
fn chamber_from_system_code(system_code: &str) -> &'static str {
    match system_code.get(..2) {
        Some("hs") => "house",
        Some("ss") => "senate",
        Some("js") => "joint",
        _ => "unknown",
    }
}
