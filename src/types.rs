//! Shared types for SHARPLINE.
//!
//! These types form the validated data model used across all modules.
//! Raw upstream payloads are parsed into them at the cache boundary
//! (see `data::feed`), so downstream code never re-checks for missing
//! fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::odds;

// ---------------------------------------------------------------------------
// Market kind
// ---------------------------------------------------------------------------

/// Broad family of a betting market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
    PlayerProp,
}

impl MarketKind {
    /// Classify an upstream market key (`h2h`, `spreads`, `player_points`…).
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "h2h" | "h2h_3_way" | "moneyline" => Some(MarketKind::Moneyline),
            "spreads" | "alternate_spreads" | "spread" => Some(MarketKind::Spread),
            "totals" | "alternate_totals" | "total" => Some(MarketKind::Total),
            k if k.starts_with("player_") || k.starts_with("batter_") || k.starts_with("pitcher_") => {
                Some(MarketKind::PlayerProp)
            }
            _ => None,
        }
    }

    /// Moneyline, spread and total survive the reduced-market fallback.
    pub fn is_core(&self) -> bool {
        !matches!(self, MarketKind::PlayerProp)
    }

    /// Whether lines on this market can be middled.
    pub fn has_line(&self) -> bool {
        matches!(self, MarketKind::Spread | MarketKind::Total | MarketKind::PlayerProp)
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Moneyline => write!(f, "Moneyline"),
            MarketKind::Spread => write!(f, "Spread"),
            MarketKind::Total => write!(f, "Total"),
            MarketKind::PlayerProp => write!(f, "Player Prop"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome / market / book
// ---------------------------------------------------------------------------

/// A single priced selection inside a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Selection name: a team, "Over"/"Under", "Draw".
    pub name: String,
    /// Extra qualifier, e.g. the player on a prop market.
    pub description: Option<String>,
    /// Line value for spreads, totals and props.
    pub point: Option<f64>,
    /// Native American price as quoted.
    pub price: f64,
    /// Always > 1.0.
    pub decimal: f64,
    /// Always 1 / decimal.
    pub implied: f64,
}

impl Outcome {
    /// Build an outcome from a native American price. Derived fields go
    /// through the normaliser, so the decimal invariant always holds.
    pub fn from_american(
        name: impl Into<String>,
        description: Option<String>,
        point: Option<f64>,
        price: f64,
    ) -> Self {
        let decimal = odds::american_to_decimal(price);
        let price = if price.abs() < 100.0 || !price.is_finite() {
            odds::NEUTRAL_AMERICAN
        } else {
            price
        };
        Self {
            name: name.into(),
            description,
            point,
            price,
            decimal,
            implied: odds::implied_probability(decimal),
        }
    }

    pub fn is_over(&self) -> bool {
        self.name.eq_ignore_ascii_case("over")
    }

    pub fn is_under(&self) -> bool {
        self.name.eq_ignore_ascii_case("under")
    }

    pub fn is_draw(&self) -> bool {
        let n = self.name.to_ascii_lowercase();
        n == "draw" || n == "tie" || n == "x"
    }

    /// Key identifying "the same selection" across books and snapshots.
    pub fn selection_key(&self) -> String {
        let desc = self.description.as_deref().unwrap_or("");
        match self.point {
            Some(p) => format!("{}|{}|{:+.1}", self.name.to_lowercase(), desc.to_lowercase(), p),
            None => format!("{}|{}", self.name.to_lowercase(), desc.to_lowercase()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(desc) = &self.description {
            write!(f, "{desc} ")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(p) = self.point {
            write!(f, " {p:+}")?;
        }
        write!(f, " @ {:+.0} ({:.3})", self.price, self.decimal)
    }
}

/// One book's market for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMarket {
    /// Upstream market key as requested (`h2h`, `spreads`, …).
    pub key: String,
    pub kind: MarketKind,
    pub last_update: Option<DateTime<Utc>>,
    pub outcomes: Vec<Outcome>,
}

impl BookMarket {
    /// Sum of implied probabilities across all outcomes (1 + vig).
    pub fn overround(&self) -> f64 {
        self.outcomes.iter().map(|o| o.implied).sum()
    }

    /// The outcome on the other side of a two-way market, matched on line.
    pub fn opposing(&self, outcome: &Outcome) -> Option<&Outcome> {
        if self.outcomes.len() != 2 {
            return None;
        }
        self.outcomes.iter().find(|o| {
            if o.name == outcome.name && o.description == outcome.description {
                return false;
            }
            if o.description != outcome.description {
                return false;
            }
            match (self.kind, o.point, outcome.point) {
                (MarketKind::Spread, Some(a), Some(b)) => (a + b).abs() < 1e-6,
                (MarketKind::Total | MarketKind::PlayerProp, Some(a), Some(b)) => (a - b).abs() < 1e-6,
                (_, None, None) => true,
                _ => false,
            }
        })
    }
}

/// A sportsbook's prices for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub key: String,
    pub title: String,
    pub markets: Vec<BookMarket>,
}

impl Book {
    pub fn market(&self, key: &str) -> Option<&BookMarket> {
        self.markets.iter().find(|m| m.key == key)
    }
}

// ---------------------------------------------------------------------------
// Events and snapshots
// ---------------------------------------------------------------------------

/// A scheduled game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Upstream source key, e.g. `americanfootball_nfl`.
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {} ({})",
            self.sport_key,
            self.away_team,
            self.home_team,
            self.commence_time.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

/// Every book's prices for one event, tagged with its source key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOdds {
    pub event_id: String,
    pub source_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub books: Vec<Book>,
}

impl EventOdds {
    /// Whether this row belongs to a requested event (teams + source key).
    pub fn matches_event(&self, event: &Event) -> bool {
        self.source_key == event.sport_key
            && self.home_team.eq_ignore_ascii_case(&event.home_team)
            && self.away_team.eq_ignore_ascii_case(&event.away_team)
    }

    /// Human label used in logs and opportunity records.
    pub fn label(&self) -> String {
        format!("{} @ {}", self.away_team, self.home_team)
    }

    /// Market keys present on any book, in first-seen order.
    pub fn market_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for book in &self.books {
            for market in &book.markets {
                if !keys.contains(&market.key) {
                    keys.push(market.key.clone());
                }
            }
        }
        keys
    }
}

/// Immutable capture of odds rows at one point in time.
///
/// Stored behind `Arc` in the cache and replaced whole on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    /// Sport the snapshot was requested for (registry key or source key).
    pub sport: String,
    pub markets: Vec<String>,
    pub captured_at: DateTime<Utc>,
    pub events: Vec<EventOdds>,
}

impl OddsSnapshot {
    pub fn empty(sport: &str, markets: &[String], captured_at: DateTime<Utc>) -> Self {
        Self {
            sport: sport.to_string(),
            markets: markets.to_vec(),
            captured_at,
            events: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total number of priced outcomes across all rows.
    pub fn outcome_count(&self) -> usize {
        self.events
            .iter()
            .flat_map(|e| &e.books)
            .flat_map(|b| &b.markets)
            .map(|m| m.outcomes.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Which way a price moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    /// Payout grew (e.g. -120 → -105, +140 → +155).
    Lengthened,
    /// Payout shrank.
    Shortened,
}

impl fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementDirection::Lengthened => write!(f, "lengthened"),
            MovementDirection::Shortened => write!(f, "shortened"),
        }
    }
}

/// A significant price change between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub sport: String,
    pub event_id: String,
    pub event_label: String,
    pub book: String,
    pub market: String,
    pub selection: String,
    pub point: Option<f64>,
    pub previous_price: f64,
    pub current_price: f64,
    /// Absolute delta on the American cents scale.
    pub delta: f64,
    pub direction: MovementDirection,
    /// Change in decimal odds, percent.
    pub percent_change: f64,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}: {:+.0} → {:+.0} ({} {:.1}%)",
            self.event_label,
            self.book,
            self.market,
            self.selection,
            self.previous_price,
            self.current_price,
            self.direction,
            self.percent_change,
        )
    }
}

/// Accumulated pricing statistics for one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTrend {
    pub book: String,
    /// How many selections this book was compared on.
    pub comparisons: u64,
    /// How often it paid more than the cross-book average.
    pub times_beat_market: u64,
    /// Running mean of (book decimal / market average − 1).
    pub average_edge: f64,
}

impl BookTrend {
    pub fn new(book: &str) -> Self {
        Self {
            book: book.to_string(),
            comparisons: 0,
            times_beat_market: 0,
            average_edge: 0.0,
        }
    }

    pub fn beat_rate(&self) -> f64 {
        if self.comparisons == 0 {
            0.0
        } else {
            self.times_beat_market as f64 / self.comparisons as f64
        }
    }

    /// Fold one comparison into the running statistics.
    pub fn record(&mut self, book_decimal: f64, market_average: f64) {
        if market_average <= 1.0 {
            return;
        }
        self.comparisons += 1;
        if book_decimal > market_average + 1e-9 {
            self.times_beat_market += 1;
        }
        let edge = book_decimal / market_average - 1.0;
        self.average_edge += (edge - self.average_edge) / self.comparisons as f64;
    }
}

/// Per-sport trend report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub sport: String,
    pub snapshots_recorded: u64,
    /// Books ordered by beat rate, best first.
    pub books: Vec<BookTrend>,
    pub recent_movements: usize,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cache statistics
// ---------------------------------------------------------------------------

/// Point-in-time counters from the tiered cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub event_entries: usize,
    pub odds_entries: usize,
    pub event_hits: u64,
    pub event_misses: u64,
    pub odds_hits: u64,
    pub odds_misses: u64,
    pub upstream_calls: u64,
    pub upstream_failures: u64,
    pub stale_served: u64,
    pub coalesced_waits: u64,
    pub history_snapshots: usize,
    pub movements: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Combined hit rate over events and odds (0.0–1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.event_hits + self.odds_hits;
        let total = hits + self.event_misses + self.odds_misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events={} odds={} hit_rate={:.0}% upstream={} failures={} stale={} movements={}",
            self.event_entries,
            self.odds_entries,
            self.hit_rate() * 100.0,
            self.upstream_calls,
            self.upstream_failures,
            self.stale_served,
            self.movements,
        )
    }
}

// ---------------------------------------------------------------------------
// Lookup results
// ---------------------------------------------------------------------------

/// Why a request produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    /// Upstream had no scheduled events (typically out of season).
    NoEvents,
    /// Events exist but no book is pricing the requested markets.
    NoOdds,
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoDataReason::NoEvents => write!(f, "no scheduled events"),
            NoDataReason::NoOdds => write!(f, "no odds available"),
        }
    }
}

/// Result of a facade lookup: data, or an explicit "nothing to show".
///
/// Distinct from an error so callers can say "out of season" rather
/// than "failed".
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NoData { sport: String, reason: NoDataReason },
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(t) => Some(t),
            Lookup::NoData { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures at the upstream feed boundary.
///
/// None of these escape the cache: they are logged and absorbed into a
/// stale or empty result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    #[error("Upstream unavailable ({source_key}): {message}")]
    UpstreamUnavailable { source_key: String, message: String },

    #[error("Upstream timed out ({source_key}) after {secs}s")]
    Timeout { source_key: String, secs: u64 },

    #[error("Malformed data ({source_key}): {message}")]
    MalformedData { source_key: String, message: String },
}

impl FeedError {
    pub fn unavailable(source_key: &str, message: impl Into<String>) -> Self {
        FeedError::UpstreamUnavailable {
            source_key: source_key.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
