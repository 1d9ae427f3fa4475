//! Scripted in-memory Fetcher/Parser for engine tests
//!
//! The fetcher serves whatever payloads the test scripts into it; the
//! parser deserializes canonical records straight from JSON, so tests can
//! inject both valid records and malformed payloads.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lgw_sync::fetch::{FetchError, Fetcher, ParseError, Parser, RawRecord, Source, SourceRegistry};
use lgw_sync::models::{CanonicalRecord, HearingRecord, SyncComponent, WitnessRecord};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Scripted source for one component
#[derive(Clone, Default)]
pub struct MockSource {
    payloads: Arc<Mutex<Vec<Value>>>,
    fail_fetch: Arc<Mutex<Option<String>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the scripted records
    pub fn set_records(&self, records: Vec<CanonicalRecord>) {
        let payloads = records
            .into_iter()
            .map(|r| serde_json::to_value(&r).unwrap())
            .collect();
        *self.payloads.lock().unwrap() = payloads;
    }

    /// Add a raw payload (for parse-failure scenarios)
    pub fn push_raw(&self, payload: Value) {
        self.payloads.lock().unwrap().push(payload);
    }

    /// Make the next fetches fail with a network error
    pub fn fail_with(&self, message: &str) {
        *self.fail_fetch.lock().unwrap() = Some(message.to_string());
    }

    /// Registry containing this source for the hearings component
    ///
    /// The registry shares this mock's state, so re-scripting records after
    /// engine construction affects subsequent fetches.
    pub fn registry(&self) -> SourceRegistry {
        let source = Source {
            fetcher: Arc::new(MockHearingEnd {
                inner: self.clone(),
            }),
            parser: Arc::new(MockHearingEnd {
                inner: self.clone(),
            }),
        };
        SourceRegistry::new(vec![source])
    }
}

struct MockHearingEnd {
    inner: MockSource,
}

#[async_trait]
impl Fetcher for MockHearingEnd {
    fn component(&self) -> SyncComponent {
        SyncComponent::Hearings
    }

    async fn fetch_changed_since(&self, _since: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError> {
        if let Some(message) = self.inner.fail_fetch.lock().unwrap().clone() {
            return Err(FetchError::Network(message));
        }

        Ok(self
            .inner
            .payloads
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|payload| RawRecord {
                component: SyncComponent::Hearings,
                payload,
            })
            .collect())
    }
}

impl Parser for MockHearingEnd {
    fn component(&self) -> SyncComponent {
        SyncComponent::Hearings
    }

    fn parse(&self, raw: &RawRecord) -> Result<CanonicalRecord, ParseError> {
        serde_json::from_value(raw.payload.clone())
            .map_err(|e| ParseError::Malformed(e.to_string()))
    }
}

/// A hearing record with deterministic content derived from the event id
pub fn hearing(event_id: &str, title: &str, modified_hour: u32) -> CanonicalRecord {
    CanonicalRecord::Hearing(HearingRecord {
        event_id: event_id.to_string(),
        title: title.to_string(),
        chamber: "house".to_string(),
        congress: 119,
        event_date: Some("2026-03-14".to_string()),
        status: Some("scheduled".to_string()),
        last_modified: Utc.with_ymd_and_hms(2026, 3, 1, modified_hour, 0, 0).unwrap(),
        committee_codes: vec!["hsju00".to_string()],
        witnesses: vec![WitnessRecord {
            name: format!("Witness for {}", event_id),
            organization: Some("GAO".to_string()),
            position: Some("Director".to_string()),
        }],
        documents: vec![],
    })
}
