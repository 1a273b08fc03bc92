//! The public surface: cached lookups and detector runs per sport.
//!
//! Callers name a sport (`nfl`, `soccer_epl`, …); the registry maps it to
//! the upstream source key. Lookups that find nothing come back as
//! `Lookup::NoData` with a reason rather than as an error.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::cache::TieredCache;
use crate::sports::SportRegistry;
use crate::strategy::arbitrage::ArbitrageOpportunity;
use crate::strategy::ev::ScoredBet;
use crate::strategy::middles::MiddleOpportunity;
use crate::strategy::{Signals, StrategyOrchestrator};
use crate::types::{
    CacheStats, Event, Lookup, Movement, NoDataReason, OddsSnapshot, TrendSummary,
};

// ---------------------------------------------------------------------------
// Scan report
// ---------------------------------------------------------------------------

/// Result of a full scan for one sport.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub sport: String,
    pub source_key: String,
    pub markets: Vec<String>,
    pub events: usize,
    pub rows: usize,
    pub outcomes: usize,
    pub signals: Signals,
    /// Movements currently held for this sport.
    pub movements: usize,
    /// When the prices were fetched upstream, not when they were served.
    pub captured_at: DateTime<Utc>,
    pub scanned_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct OddsService {
    cache: Arc<TieredCache>,
    sports: Arc<SportRegistry>,
    strategy: StrategyOrchestrator,
}

impl OddsService {
    pub fn new(cache: Arc<TieredCache>, sports: Arc<SportRegistry>, strategy: StrategyOrchestrator) -> Self {
        Self { cache, sports, strategy }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn sports(&self) -> &SportRegistry {
        &self.sports
    }

    pub fn strategy(&self) -> &StrategyOrchestrator {
        &self.strategy
    }

    fn source_key(&self, sport: &str) -> String {
        self.sports.resolve(sport).source_key
    }

    /// Upcoming events for a sport.
    pub async fn get_cached_events(&self, sport: &str) -> Lookup<Vec<Event>> {
        let source_key = self.source_key(sport);
        let events = self.cache.get_events(&source_key).await;
        if events.is_empty() {
            debug!(sport, source_key = %source_key, "No scheduled events");
            return Lookup::NoData {
                sport: sport.to_string(),
                reason: NoDataReason::NoEvents,
            };
        }
        Lookup::Found(events)
    }

    /// Odds for every upcoming event of a sport, as one snapshot.
    pub async fn get_cached_odds(&self, sport: &str, markets: &[String]) -> Lookup<OddsSnapshot> {
        let events = match self.get_cached_events(sport).await {
            Lookup::Found(events) => events,
            Lookup::NoData { sport, reason } => return Lookup::NoData { sport, reason },
        };
        let source_key = self.source_key(sport);
        let served = self.cache.get_odds_rows(&events, markets).await;

        if served.rows.iter().all(|r| r.books.is_empty()) {
            debug!(sport, source_key = %source_key, events = events.len(), "No odds for scheduled events");
            return Lookup::NoData {
                sport: sport.to_string(),
                reason: NoDataReason::NoOdds,
            };
        }

        // Rows may come from cache or a stale entry; carry their capture time.
        Lookup::Found(OddsSnapshot {
            sport: source_key,
            markets: markets.to_vec(),
            captured_at: served.captured_at.unwrap_or_else(|| self.cache.now()),
            events: served.rows,
        })
    }

    pub fn find_positive_ev_bets(&self, snapshot: &OddsSnapshot, min_ev: f64) -> Vec<ScoredBet> {
        self.strategy.ev().find_positive_ev_bets(snapshot, min_ev)
    }

    pub fn find_arbitrage(&self, snapshot: &OddsSnapshot) -> Vec<ArbitrageOpportunity> {
        self.strategy.arbitrage().find_arbitrage(snapshot)
    }

    pub fn find_middles(&self, snapshot: &OddsSnapshot) -> Vec<MiddleOpportunity> {
        self.strategy.middles().find_middles(snapshot)
    }

    pub async fn get_trend_summary(&self, sport: &str) -> Option<TrendSummary> {
        self.cache.get_trends(&self.source_key(sport)).await
    }

    pub async fn get_movements(&self, sport: &str) -> Vec<Movement> {
        self.cache.movements(&self.source_key(sport)).await
    }

    pub async fn get_cache_statistics(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Fetch (or reuse) odds for a sport and run every detector over them.
    pub async fn scan(&self, sport: &str, markets: &[String]) -> Lookup<ScanReport> {
        let started = Instant::now();
        let snapshot = match self.get_cached_odds(sport, markets).await {
            Lookup::Found(snapshot) => snapshot,
            Lookup::NoData { sport, reason } => {
                info!(sport = %sport, reason = %reason, "Nothing to scan");
                return Lookup::NoData { sport, reason };
            }
        };

        let signals = self.strategy.analyze(&snapshot, None);
        let movements = self.cache.movements(&snapshot.sport).await.len();

        let report = ScanReport {
            sport: sport.to_string(),
            source_key: snapshot.sport.clone(),
            markets: markets.to_vec(),
            events: snapshot.events.len(),
            rows: snapshot.events.iter().map(|e| e.books.len()).sum(),
            outcomes: snapshot.outcome_count(),
            signals,
            movements,
            captured_at: snapshot.captured_at,
            scanned_at: self.cache.now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            sport = %report.sport,
            events = report.events,
            outcomes = report.outcomes,
            bets = report.signals.bets.len(),
            arbitrage = report.signals.arbitrage.len(),
            middles = report.signals.middles.len(),
            movements = report.movements,
            elapsed_ms = report.elapsed_ms,
            "Scan complete"
        );
        Lookup::Found(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
