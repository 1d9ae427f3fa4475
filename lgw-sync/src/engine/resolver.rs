//! Natural-key resolution
//!
//! Pure lookups against each entity table's unique natural-key index. The
//! surrogate id returned here is the one an update must reuse.

use crate::db;
use crate::models::SyncComponent;
use chrono::{DateTime, Utc};
use lgw_common::Result;

/// Resolve a natural key to its local surrogate id, if one exists
pub async fn resolve<'e, E>(
    executor: E,
    component: SyncComponent,
    natural_key: &str,
) -> Result<Option<i64>>
where
    E: sqlx::SqliteExecutor<'e>,
{
    match component {
        SyncComponent::Hearings => db::hearings::find_id_by_event_id(executor, natural_key).await,
        SyncComponent::Committees => {
            db::committees::find_id_by_system_code(executor, natural_key).await
        }
    }
}

/// Stored last-modified timestamp for a resolved record
///
/// An unparseable stored value is treated as absent, which classifies the
/// remote copy as newer and lets the next update repair the row.
pub async fn stored_last_modified<'e, E>(
    executor: E,
    component: SyncComponent,
    surrogate_id: i64,
) -> Result<Option<DateTime<Utc>>>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let raw = match component {
        SyncComponent::Hearings => db::hearings::last_modified(executor, surrogate_id).await?,
        SyncComponent::Committees => {
            sqlx::query_scalar::<_, Option<String>>(
                "SELECT last_modified FROM committees WHERE id = ?",
            )
            .bind(surrogate_id)
            .fetch_optional(executor)
            .await?
            .flatten()
        }
    };

    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }))
}
