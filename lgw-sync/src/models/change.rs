//! Change classification of a fetched record against local state

use super::CanonicalRecord;
use serde::{Deserialize, Serialize};

/// Classification of one fetched record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// No local row for this natural key
    Added,
    /// Local row exists and the remote copy is newer
    Updated,
    /// Local row exists and is at least as new; discarded before apply
    Unchanged,
}

/// A classified change, ready for the batch coordinator
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub record: CanonicalRecord,
    /// Existing surrogate id when the natural key already resolves.
    /// Updates must reuse this id; dependent rows hold foreign keys to it.
    pub existing_id: Option<i64>,
}

impl Change {
    /// Only Added/Updated changes are applied; Unchanged is counted and dropped
    pub fn is_applicable(&self) -> bool {
        matches!(self.kind, ChangeKind::Added | ChangeKind::Updated)
    }
}
