//! Scripted odds feed for integration testing.
//!
//! Provides a deterministic `OddsSource` whose schedules, prices,
//! latency and failures are all controllable from test code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sharpline::data::{OddsSource, RawBookmaker, RawEvent, RawMarket, RawOutcome};
use sharpline::types::FeedError;

#[derive(Default)]
struct State {
    events: HashMap<String, Vec<RawEvent>>,
    latency: Duration,
    /// If set, every call fails with this message.
    force_error: Option<String>,
    /// Reject any odds request that includes a player prop market.
    reject_props: bool,
    event_calls: usize,
    odds_requests: Vec<Vec<String>>,
}

/// In-memory feed. Clones share state, so a test can keep a handle
/// after giving one to the cache.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<State>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the events (with their books) served for a source key.
    pub fn set_events(&self, source_key: &str, events: Vec<RawEvent>) {
        self.state.lock().unwrap().events.insert(source_key.to_string(), events);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    pub fn set_error(&self, msg: &str) {
        self.state.lock().unwrap().force_error = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        self.state.lock().unwrap().force_error = None;
    }

    pub fn reject_props(&self) {
        self.state.lock().unwrap().reject_props = true;
    }

    pub fn event_calls(&self) -> usize {
        self.state.lock().unwrap().event_calls
    }

    /// Market lists of every odds request, in order.
    pub fn odds_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().odds_requests.clone()
    }

    async fn delay(&self) {
        let latency = self.state.lock().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl OddsSource for ScriptedSource {
    async fn fetch_events(&self, source_key: &str) -> Result<Vec<RawEvent>, FeedError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.event_calls += 1;
        if let Some(msg) = &state.force_error {
            return Err(FeedError::unavailable(source_key, msg.clone()));
        }
        let events = state.events.get(source_key).cloned().unwrap_or_default();
        Ok(events
            .into_iter()
            .map(|e| RawEvent { bookmakers: Vec::new(), ..e })
            .collect())
    }

    async fn fetch_odds(&self, source_key: &str, markets: &[String]) -> Result<Vec<RawEvent>, FeedError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.odds_requests.push(markets.to_vec());
        if let Some(msg) = &state.force_error {
            return Err(FeedError::unavailable(source_key, msg.clone()));
        }
        if state.reject_props && markets.iter().any(|m| m.starts_with("player_")) {
            return Err(FeedError::unavailable(source_key, "HTTP 422: unsupported market"));
        }
        let events = state.events.get(source_key).cloned().unwrap_or_default();
        Ok(events
            .into_iter()
            .map(|mut e| {
                for book in &mut e.bookmakers {
                    book.markets.retain(|m| {
                        m.key.as_ref().is_some_and(|k| markets.contains(k))
                    });
                }
                e
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

pub fn event(id: &str, source_key: &str, home: &str, away: &str, commence: DateTime<Utc>, books: Vec<RawBookmaker>) -> RawEvent {
    RawEvent {
        id: Some(id.to_string()),
        sport_key: Some(source_key.to_string()),
        commence_time: Some(commence.to_rfc3339()),
        home_team: Some(home.to_string()),
        away_team: Some(away.to_string()),
        bookmakers: books,
    }
}

pub fn book(key: &str, markets: Vec<RawMarket>) -> RawBookmaker {
    RawBookmaker {
        key: Some(key.to_string()),
        title: Some(key.to_string()),
        last_update: None,
        markets,
    }
}

pub fn market(key: &str, outcomes: Vec<RawOutcome>) -> RawMarket {
    RawMarket {
        key: Some(key.to_string()),
        last_update: None,
        outcomes,
    }
}

pub fn outcome(name: &str, price: f64, point: Option<f64>) -> RawOutcome {
    RawOutcome {
        name: Some(name.to_string()),
        description: None,
        price: Some(price),
        point,
    }
}

pub fn prop(player: &str, side: &str, price: f64, point: f64) -> RawOutcome {
    RawOutcome {
        name: Some(side.to_string()),
        description: Some(player.to_string()),
        price: Some(price),
        point: Some(point),
    }
}
