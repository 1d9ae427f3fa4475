//! Fetcher and Parser collaborator contracts
//!
//! One Fetcher/Parser pair exists per entity component; the component filter
//! selects which pairs participate in a run. The engine only sees the
//! contracts, so tests substitute in-memory sources.

pub mod client;
pub mod congress;

use crate::backoff::Retryable;
use crate::models::{CanonicalRecord, SyncComponent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// A raw record as returned by the upstream API, not yet validated
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub component: SyncComponent,
    pub payload: serde_json::Value,
}

/// Fetch failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Upstream rate limit exceeded")]
    RateLimited,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout | FetchError::RateLimited => true,
            FetchError::Api(status, _) => *status >= 500,
            FetchError::Auth(_) | FetchError::MalformedResponse(_) => false,
        }
    }
}

/// Per-record parse/validation failure; non-fatal to the fetched batch
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Fetches raw records changed within a lookback window
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn component(&self) -> SyncComponent;

    /// All remote records whose last-modified timestamp falls on or after
    /// `since`. Transient failures are retried internally; the error
    /// returned here has already exhausted its retry budget.
    async fn fetch_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<RawRecord>, FetchError>;
}

/// Validates a raw record into its canonical shape
pub trait Parser: Send + Sync {
    fn component(&self) -> SyncComponent;

    fn parse(&self, raw: &RawRecord) -> Result<CanonicalRecord, ParseError>;
}

/// A fetcher/parser capability pair for one component
#[derive(Clone)]
pub struct Source {
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn Parser>,
}

impl Source {
    pub fn component(&self) -> SyncComponent {
        self.fetcher.component()
    }
}

/// Registry of all available sources, filtered per run
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Sources participating in a run, in the order given by `components`
    pub fn select(&self, components: &[SyncComponent]) -> Vec<Source> {
        components
            .iter()
            .filter_map(|component| {
                self.sources
                    .iter()
                    .find(|s| s.component() == *component)
                    .cloned()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::RateLimited.is_transient());
        assert!(FetchError::Api(503, "unavailable".into()).is_transient());
        assert!(!FetchError::Api(404, "not found".into()).is_transient());
        assert!(!FetchError::Auth("bad key".into()).is_transient());
    }
}
