//! Congress API sources
//!
//! One Fetcher/Parser pair per component, all sharing a single rate-limited
//! client. The parsers validate raw payloads into canonical records; any
//! field problem is a per-record ParseError, never a batch failure.

use super::client::CongressApiClient;
use super::{FetchError, Fetcher, ParseError, Parser, RawRecord, Source, SourceRegistry};
use crate::models::{
    CanonicalRecord, CommitteeRecord, DocumentRecord, HearingRecord, SyncComponent, WitnessRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Build the full source registry over one shared client
pub fn build_registry(client: Arc<CongressApiClient>) -> SourceRegistry {
    SourceRegistry::new(vec![
        Source {
            fetcher: Arc::new(CommitteeFetcher {
                client: client.clone(),
            }),
            parser: Arc::new(CommitteeParser),
        },
        Source {
            fetcher: Arc::new(HearingFetcher { client }),
            parser: Arc::new(HearingParser),
        },
    ])
}

struct HearingFetcher {
    client: Arc<CongressApiClient>,
}

#[async_trait]
impl Fetcher for HearingFetcher {
    fn component(&self) -> SyncComponent {
        SyncComponent::Hearings
    }

    async fn fetch_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError> {
        let query = [(
            "fromDateTime",
            since.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        )];
        let items = self.client.fetch_paged("hearings", &query, "hearings").await?;

        Ok(items
            .into_iter()
            .map(|payload| RawRecord {
                component: SyncComponent::Hearings,
                payload,
            })
            .collect())
    }
}

struct CommitteeFetcher {
    client: Arc<CongressApiClient>,
}

#[async_trait]
impl Fetcher for CommitteeFetcher {
    fn component(&self) -> SyncComponent {
        SyncComponent::Committees
    }

    async fn fetch_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError> {
        let query = [(
            "fromDateTime",
            since.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        )];
        let items = self
            .client
            .fetch_paged("committees", &query, "committees")
            .await?;

        Ok(items
            .into_iter()
            .map(|payload| RawRecord {
                component: SyncComponent::Committees,
                payload,
            })
            .collect())
    }
}

/// Parser for hearing payloads
pub struct HearingParser;

impl Parser for HearingParser {
    fn component(&self) -> SyncComponent {
        SyncComponent::Hearings
    }

    fn parse(&self, raw: &RawRecord) -> Result<CanonicalRecord, ParseError> {
        let payload = &raw.payload;

        let event_id = required_str(payload, "eventId")?;
        let title = required_str(payload, "title")?;
        let chamber = required_str(payload, "chamber")?.to_lowercase();
        let congress = payload
            .get("congress")
            .and_then(|v| v.as_i64())
            .ok_or(ParseError::MissingField("congress"))?;
        let last_modified = required_timestamp(payload, "updateDate")?;

        let committee_codes = payload
            .get("committees")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|c| c.get("systemCode").and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let witnesses = payload
            .get("witnesses")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|w| {
                        let name = w.get("name").and_then(|v| v.as_str())?;
                        Some(WitnessRecord {
                            name: name.to_string(),
                            organization: optional_str(w, "organization"),
                            position: optional_str(w, "position"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let documents = payload
            .get("documents")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|d| {
                        let url = d.get("url").and_then(|v| v.as_str())?;
                        Some(DocumentRecord {
                            doc_type: d
                                .get("documentType")
                                .and_then(|v| v.as_str())
                                .unwrap_or("unknown")
                                .to_string(),
                            title: optional_str(d, "title"),
                            url: url.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(CanonicalRecord::Hearing(HearingRecord {
            event_id: event_id.to_string(),
            title: title.to_string(),
            chamber,
            congress,
            event_date: optional_str(payload, "date"),
            status: optional_str(payload, "status"),
            last_modified,
            committee_codes,
            witnesses,
            documents,
        }))
    }
}

/// Parser for committee payloads
pub struct CommitteeParser;

impl Parser for CommitteeParser {
    fn component(&self) -> SyncComponent {
        SyncComponent::Committees
    }

    fn parse(&self, raw: &RawRecord) -> Result<CanonicalRecord, ParseError> {
        let payload = &raw.payload;

        Ok(CanonicalRecord::Committee(CommitteeRecord {
            system_code: required_str(payload, "systemCode")?.to_string(),
            name: required_str(payload, "name")?.to_string(),
            chamber: required_str(payload, "chamber")?.to_lowercase(),
            committee_type: optional_str(payload, "committeeTypeCode"),
            last_modified: required_timestamp(payload, "updateDate")?,
        }))
    }
}

fn required_str<'a>(payload: &'a Value, field: &'static str) -> Result<&'a str, ParseError> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or(ParseError::MissingField(field))
}

fn optional_str(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn required_timestamp(payload: &Value, field: &'static str) -> Result<DateTime<Utc>, ParseError> {
    let value = payload
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or(ParseError::MissingField(field))?;

    // The API emits both RFC 3339 and a space-separated UTC variant
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
        })
        .map_err(|_| ParseError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_hearing(payload: Value) -> RawRecord {
        RawRecord {
            component: SyncComponent::Hearings,
            payload,
        }
    }

    #[test]
    fn parses_complete_hearing() {
        let raw = raw_hearing(json!({
            "eventId": "LC65432",
            "title": "Oversight of the Department",
            "chamber": "House",
            "congress": 119,
            "date": "2026-03-14",
            "status": "scheduled",
            "updateDate": "2026-03-01T12:00:00Z",
            "committees": [{"systemCode": "hsju00", "name": "Judiciary"}],
            "witnesses": [{"name": "Dr. A. Smith", "organization": "GAO", "position": "Director"}],
            "documents": [{"documentType": "transcript", "url": "https://example.gov/t.pdf"}]
        }));

        let record = HearingParser.parse(&raw).unwrap();
        let CanonicalRecord::Hearing(hearing) = record else {
            panic!("expected hearing");
        };
        assert_eq!(hearing.event_id, "LC65432");
        assert_eq!(hearing.chamber, "house");
        assert_eq!(hearing.committee_codes, vec!["hsju00"]);
        assert_eq!(hearing.witnesses.len(), 1);
        assert_eq!(hearing.documents[0].doc_type, "transcript");
    }

    #[test]
    fn missing_event_id_is_a_parse_error() {
        let raw = raw_hearing(json!({
            "title": "No id",
            "chamber": "senate",
            "congress": 119,
            "updateDate": "2026-03-01T12:00:00Z"
        }));

        match HearingParser.parse(&raw) {
            Err(ParseError::MissingField("eventId")) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn bad_timestamp_is_a_parse_error() {
        let raw = raw_hearing(json!({
            "eventId": "LC1",
            "title": "Bad date",
            "chamber": "house",
            "congress": 119,
            "updateDate": "not-a-date"
        }));

        assert!(matches!(
            HearingParser.parse(&raw),
            Err(ParseError::InvalidTimestamp { field: "updateDate", .. })
        ));
    }

    #[test]
    fn parses_committee() {
        let raw = RawRecord {
            component: SyncComponent::Committees,
            payload: json!({
                "systemCode": "ssga00",
                "name": "Homeland Security and Governmental Affairs",
                "chamber": "Senate",
                "committeeTypeCode": "standing",
                "updateDate": "2026-02-20T09:30:00Z"
            }),
        };

        let record = CommitteeParser.parse(&raw).unwrap();
        let CanonicalRecord::Committee(committee) = record else {
            panic!("expected committee");
        };
        assert_eq!(committee.system_code, "ssga00");
        assert_eq!(committee.chamber, "senate");
    }
}
