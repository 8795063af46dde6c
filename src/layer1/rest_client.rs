// REST Client for the market-data provider
// Single-shot grouped daily aggregates fetch with an explicit request timeout

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum RestClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

// ============================================================================
// Response Types
// ============================================================================

/// One per-symbol daily aggregate from the grouped endpoint.
/// Every field is optional so a sparse result is skipped instead of failing the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupedDailyBar {
    #[serde(rename = "T")]
    pub symbol: Option<String>,
    #[serde(rename = "c")]
    pub close: Option<f64>,
    #[serde(rename = "o")]
    pub open: Option<f64>,
    #[serde(rename = "h")]
    pub high: Option<f64>,
    #[serde(rename = "l")]
    pub low: Option<f64>,
    #[serde(rename = "v")]
    pub volume: Option<f64>,
    #[serde(rename = "t")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupedDailyResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "resultsCount", default)]
    pub results_count: Option<u64>,
    #[serde(default)]
    pub results: Option<Vec<GroupedDailyBar>>,
}

impl GroupedDailyResponse {
    /// (symbol, close) pairs in provider order; incomplete results are dropped
    pub fn closes(&self) -> Vec<(String, f64)> {
        let results = match &self.results {
            Some(r) => r,
            None => return Vec::new(),
        };

        let mut skipped = 0usize;
        let closes: Vec<(String, f64)> = results
            .iter()
            .filter_map(|bar| match (&bar.symbol, bar.close) {
                (Some(symbol), Some(close)) => Some((symbol.clone(), close)),
                _ => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        if skipped > 0 {
            debug!(skipped = skipped, "Grouped results without symbol or close");
        }
        closes
    }
}

// ============================================================================
// Client Statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct RestClientStats {
    pub requests_sent: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
}

impl fmt::Display for RestClientStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RestClientStats(sent={}, ok={}, fail={})",
            self.requests_sent, self.requests_succeeded, self.requests_failed
        )
    }
}

// ============================================================================
// Polygon REST Client
// ============================================================================

/// REST client for the reference-data provider.
///
/// No retries: a failed fetch is reported to the caller, which decides
/// whether the run can continue.
pub struct PolygonRestClient {
    base_url: String,
    api_key: String,
    client: Client,

    requests_sent: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
}

impl PolygonRestClient {
    pub fn new(base_url: &str, api_key: &str, timeout_seconds: u64) -> Result<Self, RestClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self::with_client(base_url, api_key, client))
    }

    /// Use a caller-built `reqwest::Client` (custom proxy/TLS settings)
    pub fn with_client(base_url: &str, api_key: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            requests_sent: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &crate::core::ProviderConfig) -> Result<Self, RestClientError> {
        Self::new(&config.rest_base_url, &config.api_key, config.request_timeout_seconds)
    }

    fn grouped_daily_url(&self, date: &str) -> Result<reqwest::Url, RestClientError> {
        let raw = format!("{}/v2/aggs/grouped/locale/us/market/stocks/{}", self.base_url, date);
        reqwest::Url::parse_with_params(&raw, &[("apiKey", self.api_key.as_str())])
            .map_err(|e| RestClientError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    /// Grouped end-of-day aggregates for every symbol on `date` (YYYY-MM-DD)
    pub async fn get_grouped_daily(&self, date: &str) -> Result<GroupedDailyResponse, RestClientError> {
        let url = self.grouped_daily_url(date)?;
        debug!(date = date, "Requesting grouped daily aggregates");

        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        match self.fetch(url).await {
            Ok(data) => {
                self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    date = date,
                    results = data.results.as_ref().map(|r| r.len()).unwrap_or(0),
                    "Grouped daily aggregates received"
                );
                Ok(data)
            }
            Err(e) => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn fetch(&self, url: reqwest::Url) -> Result<GroupedDailyResponse, RestClientError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(RestClientError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Closing prices for `date`, ready for `ReferencePriceStore::from_closes`
    pub async fn previous_closes(&self, date: &str) -> Result<Vec<(String, f64)>, RestClientError> {
        Ok(self.get_grouped_daily(date).await?.closes())
    }

    pub fn get_stats(&self) -> RestClientStats {
        RestClientStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
