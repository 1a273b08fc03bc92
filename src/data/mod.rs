//! Upstream price sources.
//!
//! Defines the `OddsSource` trait, the raw wire types every source
//! returns, and the parser that turns them into the validated model.

pub mod feed;
pub mod odds_api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::FeedError;

// ---------------------------------------------------------------------------
// Raw wire types (The Odds API v4 shape, every field optional)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sport_key: Option<String>,
    /// RFC 3339 start time.
    #[serde(default)]
    pub commence_time: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<RawBookmaker>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBookmaker {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub markets: Vec<RawMarket>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMarket {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOutcome {
    #[serde(default)]
    pub name: Option<String>,
    /// Player name on prop markets.
    #[serde(default)]
    pub description: Option<String>,
    /// American price.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub point: Option<f64>,
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Abstraction over sportsbook price feeds.
///
/// Implementors return raw payloads; validation happens in
/// [`feed`] so every source gets the same treatment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Upcoming events for one source key.
    async fn fetch_events(&self, source_key: &str) -> Result<Vec<RawEvent>, FeedError>;

    /// Events with per-book prices for the given market keys.
    async fn fetch_odds(
        &self,
        source_key: &str,
        markets: &[String],
    ) -> Result<Vec<RawEvent>, FeedError>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}
