//! The Odds API (v4) price source.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Base URL: https://api.the-odds-api.com/v4
//! Auth: `apiKey` query parameter. Quota is reported back in the
//! `x-requests-remaining` response header.
//!
//! Prices are requested in American format so the native scale matches
//! the movement threshold.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, warn};

use super::{OddsSource, RawEvent};
use crate::types::FeedError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";
const SOURCE_NAME: &str = "the-odds-api";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for The Odds API.
pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    regions: String,
}

impl OddsApiClient {
    /// Create a new client. `timeout` bounds every request.
    pub fn new(
        api_key: SecretString,
        base_url: Option<String>,
        regions: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SHARPLINE/0.1.0")
            .build()
            .context("Failed to build HTTP client for The Odds API")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            regions: regions.unwrap_or_else(|| "us".to_string()),
        })
    }

    fn events_url(&self, source_key: &str) -> String {
        format!(
            "{}/sports/{}/events?apiKey={}&dateFormat=iso",
            self.base_url,
            urlencoding::encode(source_key),
            urlencoding::encode(self.api_key.expose_secret()),
        )
    }

    fn odds_url(&self, source_key: &str, markets: &[String]) -> String {
        format!(
            "{}/sports/{}/odds?apiKey={}&regions={}&markets={}&oddsFormat=american&dateFormat=iso",
            self.base_url,
            urlencoding::encode(source_key),
            urlencoding::encode(self.api_key.expose_secret()),
            urlencoding::encode(&self.regions),
            urlencoding::encode(&markets.join(",")),
        )
    }

    async fn fetch_json(&self, source_key: &str, url: &str) -> Result<Vec<RawEvent>, FeedError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key; keep it out of errors and logs.
                FeedError::unavailable(source_key, format!("request failed: {}", e.without_url()))
            })?;

        if let Some(remaining) = resp
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!(source_key, remaining, "Odds API quota");
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(source_key, %status, "Odds API returned an error status");
            return Err(FeedError::unavailable(source_key, format!("HTTP {status}: {body}")));
        }

        resp.json::<Vec<RawEvent>>()
            .await
            .map_err(|e| FeedError::MalformedData {
                source_key: source_key.to_string(),
                message: format!("failed to decode payload: {}", e.without_url()),
            })
    }
}

#[async_trait]
impl OddsSource for OddsApiClient {
    async fn fetch_events(&self, source_key: &str) -> Result<Vec<RawEvent>, FeedError> {
        debug!(source_key, "Fetching events");
        self.fetch_json(source_key, &self.events_url(source_key)).await
    }

    async fn fetch_odds(
        &self,
        source_key: &str,
        markets: &[String],
    ) -> Result<Vec<RawEvent>, FeedError> {
        debug!(source_key, markets = %markets.join(","), "Fetching odds");
        self.fetch_json(source_key, &self.odds_url(source_key, markets)).await
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
