//! HTTP client for the authoritative Congress API
//!
//! Upstream access is rate limited (the public API allows on the order of
//! one request per second per key), so every request waits on a shared
//! minimum-interval limiter before going out, and transient failures retry
//! through the injected backoff policy.

use super::FetchError;
use crate::backoff::BackoffPolicy;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("lgw-sync/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 250;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub min_request_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.congress.gov/v3".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(1000),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with the rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Congress API client
pub struct CongressApiClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    config: ClientConfig,
}

impl CongressApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(config.min_request_interval)),
            config,
        })
    }

    /// Fetch every page of a list endpoint, concatenating the items under
    /// `item_key` until a short page ends the listing
    pub async fn fetch_paged(
        &self,
        path: &str,
        query: &[(&str, String)],
        item_key: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut page_query: Vec<(&str, String)> = query.to_vec();
            page_query.push(("offset", offset.to_string()));
            page_query.push(("limit", PAGE_SIZE.to_string()));

            let page = self.get_json(path, &page_query).await?;
            let page_items = page
                .get(item_key)
                .and_then(|v| v.as_array())
                .cloned()
                .ok_or_else(|| {
                    FetchError::MalformedResponse(format!("response missing '{}' array", item_key))
                })?;

            let page_len = page_items.len();
            items.extend(page_items);

            if page_len < PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        Ok(items)
    }

    /// One rate-limited, retried GET returning parsed JSON
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        self.config
            .backoff
            .retry(path, || async {
                self.rate_limiter.wait().await;
                self.request_once(&url, query).await
            })
            .await
    }

    async fn request_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        tracing::debug!(url = %url, "Querying Congress API");

        let mut request = self.http_client.get(url).query(query);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        match status.as_u16() {
            200 => response
                .json::<Value>()
                .await
                .map_err(|e| FetchError::MalformedResponse(e.to_string())),
            401 | 403 => Err(FetchError::Auth(format!("status {}", status))),
            429 => Err(FetchError::RateLimited),
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(FetchError::Api(code, truncate(&body, 200)))
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(30));

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;

        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn truncate_preserves_short_strings() {
        assert_eq!(truncate("short", 200), "short");
        assert!(truncate(&"x".repeat(300), 200).ends_with("..."));
    }
}
