//! Canonical record types
//!
//! These are the already-validated shapes the Parser collaborators hand the
//! engine. A hearing payload owns its dependent witnesses, documents, and
//! committee references; the store gives those rows foreign keys to the
//! hearing's surrogate id.

use super::SyncComponent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A canonical record from one of the synchronized components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum CanonicalRecord {
    Hearing(HearingRecord),
    Committee(CommitteeRecord),
}

impl CanonicalRecord {
    /// The external system's stable identifier
    pub fn natural_key(&self) -> &str {
        match self {
            CanonicalRecord::Hearing(h) => &h.event_id,
            CanonicalRecord::Committee(c) => &c.system_code,
        }
    }

    /// Remote-supplied last-modified timestamp used for change detection
    pub fn last_modified(&self) -> DateTime<Utc> {
        match self {
            CanonicalRecord::Hearing(h) => h.last_modified,
            CanonicalRecord::Committee(c) => c.last_modified,
        }
    }

    pub fn component(&self) -> SyncComponent {
        match self {
            CanonicalRecord::Hearing(_) => SyncComponent::Hearings,
            CanonicalRecord::Committee(_) => SyncComponent::Committees,
        }
    }
}

/// A congressional hearing with its dependent entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearingRecord {
    /// Natural key (remote event identifier)
    pub event_id: String,
    pub title: String,
    /// "house" or "senate"
    pub chamber: String,
    pub congress: i64,
    /// Scheduled date, if announced
    pub event_date: Option<String>,
    /// Remote status string (scheduled, postponed, held, ...)
    pub status: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// Committee system codes this hearing belongs to
    pub committee_codes: Vec<String>,
    pub witnesses: Vec<WitnessRecord>,
    pub documents: Vec<DocumentRecord>,
}

/// A congressional committee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeRecord {
    /// Natural key (e.g. "hsju00")
    pub system_code: String,
    pub name: String,
    pub chamber: String,
    pub committee_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// A witness appearing at a hearing (dependent row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub name: String,
    pub organization: Option<String>,
    pub position: Option<String>,
}

/// A document attached to a hearing (dependent row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// e.g. "transcript", "witness_statement"
    pub doc_type: String,
    pub title: Option<String>,
    pub url: String,
}

impl HearingRecord {
    /// Required-field check used by the batch coordinator's fast validation
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.event_id.trim().is_empty() {
            missing.push("event_id");
        }
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.chamber.trim().is_empty() {
            missing.push("chamber");
        }
        missing
    }
}

impl CommitteeRecord {
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.system_code.trim().is_empty() {
            missing.push("system_code");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        missing
    }
}

impl CanonicalRecord {
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        match self {
            CanonicalRecord::Hearing(h) => h.missing_required_fields(),
            CanonicalRecord::Committee(c) => c.missing_required_fields(),
        }
    }
}
