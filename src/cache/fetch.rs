//! Upstream fetch strategies.
//!
//! The fallback chain is a plain ordered list: try every requested
//! market, then drop player props and retry with the core markets. Each
//! attempt is bounded by a timeout and reports success or failure as a
//! value.

use std::time::Duration;
use tracing::{info, warn};

use crate::data::{OddsSource, RawEvent};
use crate::types::{FeedError, MarketKind};

/// One way of asking upstream for odds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Every market the caller asked for.
    FullMarkets,
    /// Moneyline, spread and total only.
    CoreMarkets,
}

impl FetchStrategy {
    /// Market keys this strategy requests.
    pub fn markets(&self, requested: &[String]) -> Vec<String> {
        match self {
            FetchStrategy::FullMarkets => requested.to_vec(),
            FetchStrategy::CoreMarkets => requested
                .iter()
                .filter(|k| MarketKind::from_key(k).is_some_and(|kind| kind.is_core()))
                .cloned()
                .collect(),
        }
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone)]
pub enum FetchAttempt {
    Success {
        strategy: FetchStrategy,
        markets: Vec<String>,
        events: Vec<RawEvent>,
    },
    Failed {
        strategy: FetchStrategy,
        error: FeedError,
    },
}

impl FetchAttempt {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchAttempt::Success { .. })
    }
}

/// Ordered strategies for a market list. The core retry is only planned
/// when it would actually request something different.
pub fn plan(requested: &[String]) -> Vec<FetchStrategy> {
    let mut strategies = vec![FetchStrategy::FullMarkets];
    let core = FetchStrategy::CoreMarkets.markets(requested);
    if !core.is_empty() && core.len() != requested.len() {
        strategies.push(FetchStrategy::CoreMarkets);
    }
    strategies
}

/// Every attempt made for one fetch, in order. Stops at the first success.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    pub attempts: Vec<FetchAttempt>,
}

impl ChainOutcome {
    /// The successful attempt, if any.
    pub fn success(&self) -> Option<(&FetchStrategy, &[String], &[RawEvent])> {
        self.attempts.iter().find_map(|a| match a {
            FetchAttempt::Success { strategy, markets, events } => {
                Some((strategy, markets.as_slice(), events.as_slice()))
            }
            FetchAttempt::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &FeedError> {
        self.attempts.iter().filter_map(|a| match a {
            FetchAttempt::Failed { error, .. } => Some(error),
            FetchAttempt::Success { .. } => None,
        })
    }
}

/// Run one strategy under `timeout`.
pub async fn attempt(
    source: &dyn OddsSource,
    source_key: &str,
    requested: &[String],
    strategy: FetchStrategy,
    timeout: Duration,
) -> FetchAttempt {
    let markets = strategy.markets(requested);
    match tokio::time::timeout(timeout, source.fetch_odds(source_key, &markets)).await {
        Ok(Ok(events)) => FetchAttempt::Success { strategy, markets, events },
        Ok(Err(error)) => FetchAttempt::Failed { strategy, error },
        Err(_) => FetchAttempt::Failed {
            strategy,
            error: FeedError::Timeout {
                source_key: source_key.to_string(),
                secs: timeout.as_secs(),
            },
        },
    }
}

/// Walk `strategies` in order until one succeeds.
pub async fn run_chain(
    source: &dyn OddsSource,
    source_key: &str,
    requested: &[String],
    strategies: &[FetchStrategy],
    timeout: Duration,
) -> ChainOutcome {
    let mut outcome = ChainOutcome::default();
    for &strategy in strategies {
        let result = attempt(source, source_key, requested, strategy, timeout).await;
        match &result {
            FetchAttempt::Success { markets, events, .. } => {
                info!(
                    source_key,
                    strategy = ?strategy,
                    markets = %markets.join(","),
                    events = events.len(),
                    "Odds fetched"
                );
            }
            FetchAttempt::Failed { error, .. } => {
                warn!(source_key, strategy = ?strategy, error = %error, "Odds fetch attempt failed");
            }
        }
        let done = result.is_success();
        outcome.attempts.push(result);
        if done {
            break;
        }
    }
    outcome
}

/// Fetch the schedule for one source key under `timeout`.
pub async fn events(
    source: &dyn OddsSource,
    source_key: &str,
    timeout: Duration,
) -> Result<Vec<RawEvent>, FeedError> {
    match tokio::time::timeout(timeout, source.fetch_events(source_key)).await {
        Ok(result) => result,
        Err(_) => Err(FeedError::Timeout {
            source_key: source_key.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
