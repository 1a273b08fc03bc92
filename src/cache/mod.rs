//! Tiered odds cache.
//!
//! Three maps sit behind async `RwLock`s: scheduled events per source
//! key, odds snapshots per (source key, market list), and rolling
//! history per source key. Misses go upstream through the fetch chain;
//! concurrent misses on one key share a single fetch. Upstream failures
//! never escape: the last entry is served stale if one is still held,
//! otherwise the result is empty.

pub mod fetch;
pub mod flight;
pub mod history;

use chrono::{DateTime, Duration, Utc};
use futures::future::{join_all, FutureExt};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::data::{feed, OddsSource};
use crate::types::{CacheStats, Event, EventOdds, Movement, OddsSnapshot, TrendSummary};
use flight::SingleFlight;
use history::SportHistory;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub event_ttl_secs: i64,
    pub odds_ttl_secs: i64,
    pub history_retention_hours: i64,
    /// Minimum move on the American cents scale to record.
    pub movement_threshold: f64,
    /// Per-map entry cap before the oldest entry is evicted.
    pub max_entries: usize,
    pub max_history_snapshots: usize,
    /// How long past TTL an entry is kept for stale serving.
    pub stale_grace_secs: i64,
    pub sweep_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub min_trend_snapshots: u64,
    pub near_window_days: i64,
    pub wide_window_days: i64,
    /// Fewer near-term events than this widens the window.
    pub min_near_events: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_ttl_secs: 3600,
            odds_ttl_secs: 300,
            history_retention_hours: 168,
            movement_threshold: 10.0,
            max_entries: 256,
            max_history_snapshots: 500,
            stale_grace_secs: 3600,
            sweep_interval_secs: 300,
            fetch_timeout_secs: 12,
            min_trend_snapshots: 2,
            near_window_days: 7,
            wide_window_days: 30,
            min_near_events: 7,
        }
    }
}

impl CacheConfig {
    fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }

    fn retention(&self) -> Duration {
        Duration::hours(self.history_retention_hours)
    }
}

// ---------------------------------------------------------------------------
// Entries and counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

impl<T> Entry<T> {
    fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        now - self.fetched_at < Duration::seconds(ttl_secs)
    }
}

#[derive(Debug, Default)]
struct Counters {
    event_hits: AtomicU64,
    event_misses: AtomicU64,
    odds_hits: AtomicU64,
    odds_misses: AtomicU64,
    upstream_calls: AtomicU64,
    upstream_failures: AtomicU64,
    stale_served: AtomicU64,
    coalesced_waits: AtomicU64,
    evictions: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Rows served for a set of events.
#[derive(Debug, Clone, Default)]
pub struct OddsRows {
    pub rows: Vec<EventOdds>,
    /// Oldest capture time among the snapshots that contributed rows.
    pub captured_at: Option<DateTime<Utc>>,
}

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub events_removed: usize,
    pub odds_removed: usize,
    pub history_pruned: usize,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct TieredCache {
    config: CacheConfig,
    source: Arc<dyn OddsSource>,
    clock: Arc<dyn Clock>,
    events: RwLock<HashMap<String, Entry<Arc<Vec<Event>>>>>,
    odds: RwLock<HashMap<String, Entry<Arc<OddsSnapshot>>>>,
    history: RwLock<HashMap<String, SportHistory>>,
    event_flight: SingleFlight<Arc<Vec<Event>>>,
    odds_flight: SingleFlight<Arc<OddsSnapshot>>,
    counters: Counters,
}

/// Cache key for an odds request: source key plus the sorted, de-duplicated
/// market list, so `[spreads, h2h]` and `[h2h, spreads]` share an entry.
pub fn odds_cache_key(source_key: &str, markets: &[String]) -> (String, Vec<String>) {
    let mut normalized: Vec<String> = markets
        .iter()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    (format!("{source_key}:{}", normalized.join(",")), normalized)
}

/// Keep events starting within the near window; widen when that leaves
/// too few, and fall back to everything when even the wide window is empty.
pub fn smart_window(events: Vec<Event>, now: DateTime<Utc>, config: &CacheConfig) -> Vec<Event> {
    let near_cutoff = now + Duration::days(config.near_window_days);
    let near = events.iter().filter(|e| e.commence_time <= near_cutoff).count();
    if near >= config.min_near_events {
        return events.into_iter().filter(|e| e.commence_time <= near_cutoff).collect();
    }

    let wide_cutoff = now + Duration::days(config.wide_window_days);
    let wide: Vec<Event> = events
        .iter()
        .filter(|e| e.commence_time <= wide_cutoff)
        .cloned()
        .collect();
    if wide.is_empty() {
        events
    } else {
        wide
    }
}

impl TieredCache {
    pub fn new(config: CacheConfig, source: Arc<dyn OddsSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            source,
            clock,
            events: RwLock::new(HashMap::new()),
            odds: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            event_flight: SingleFlight::new(),
            odds_flight: SingleFlight::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- Events -------------------------------------------------------------

    /// Scheduled events for a source key.
    pub async fn get_events(self: &Arc<Self>, source_key: &str) -> Vec<Event> {
        let now = self.clock.now();
        if let Some(entry) = self.events.read().await.get(source_key) {
            if entry.is_fresh(now, self.config.event_ttl_secs) {
                bump(&self.counters.event_hits);
                debug!(source_key, events = entry.value.len(), "Event cache hit");
                return entry.value.as_ref().clone();
            }
        }
        bump(&self.counters.event_misses);

        let this = Arc::clone(self);
        let key = source_key.to_string();
        let (events, joined) = self
            .event_flight
            .run(source_key, move || async move { this.refresh_events(&key).await }.boxed())
            .await;
        if joined {
            bump(&self.counters.coalesced_waits);
        }
        events.as_ref().clone()
    }

    async fn refresh_events(&self, source_key: &str) -> Arc<Vec<Event>> {
        // A flight that finished between our miss and this one may have
        // stored a fresh entry already.
        if let Some(entry) = self.events.read().await.get(source_key) {
            if entry.is_fresh(self.clock.now(), self.config.event_ttl_secs) {
                debug!(source_key, "Events refreshed by an earlier flight");
                return Arc::clone(&entry.value);
            }
        }
        bump(&self.counters.upstream_calls);
        match fetch::events(self.source.as_ref(), source_key, self.config.fetch_timeout()).await {
            Ok(raw) => {
                let now = self.clock.now();
                let parsed = feed::parse_events(source_key, &raw, now);
                let total = parsed.len();
                let events = Arc::new(smart_window(parsed, now, &self.config));
                info!(source_key, fetched = total, kept = events.len(), "Events cached");

                let mut map = self.events.write().await;
                self.insert_bounded(
                    &mut *map,
                    source_key.to_string(),
                    Entry {
                        value: Arc::clone(&events),
                        fetched_at: now,
                    },
                );
                events
            }
            Err(e) => {
                bump(&self.counters.upstream_failures);
                match self.events.read().await.get(source_key) {
                    Some(stale) => {
                        bump(&self.counters.stale_served);
                        warn!(source_key, error = %e, cached_at = %stale.fetched_at, "Event fetch failed, serving stale");
                        Arc::clone(&stale.value)
                    }
                    None => {
                        warn!(source_key, error = %e, "Event fetch failed, nothing cached");
                        Arc::new(Vec::new())
                    }
                }
            }
        }
    }

    // -- Odds ---------------------------------------------------------------

    /// Odds rows for the given events.
    pub async fn get_odds(self: &Arc<Self>, events: &[Event], markets: &[String]) -> Vec<EventOdds> {
        self.get_odds_rows(events, markets).await.rows
    }

    /// Odds rows for the given events, with the capture time of the
    /// oldest snapshot they came from.
    ///
    /// Events are grouped by source key and each group is served from its
    /// own snapshot; groups are fetched concurrently. The result only
    /// contains rows matching a requested event.
    pub async fn get_odds_rows(self: &Arc<Self>, events: &[Event], markets: &[String]) -> OddsRows {
        if events.is_empty() {
            return OddsRows::default();
        }
        let mut groups: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
        for event in events {
            groups.entry(event.sport_key.as_str()).or_default().push(event);
        }

        let snapshots = join_all(groups.keys().map(|source_key| self.get_snapshot(source_key, markets))).await;

        let mut result = OddsRows::default();
        for (snapshot, requested) in snapshots.iter().zip(groups.values()) {
            let before = result.rows.len();
            result.rows.extend(
                snapshot
                    .events
                    .iter()
                    .filter(|row| requested.iter().any(|e| row.matches_event(e)))
                    .cloned(),
            );
            if result.rows.len() > before {
                result.captured_at = Some(match result.captured_at {
                    Some(at) => at.min(snapshot.captured_at),
                    None => snapshot.captured_at,
                });
            }
        }
        result
    }

    /// The whole cached snapshot for one source key and market list.
    pub async fn get_snapshot(self: &Arc<Self>, source_key: &str, markets: &[String]) -> Arc<OddsSnapshot> {
        let (cache_key, markets) = odds_cache_key(source_key, markets);
        let now = self.clock.now();
        if let Some(entry) = self.odds.read().await.get(&cache_key) {
            if entry.is_fresh(now, self.config.odds_ttl_secs) {
                bump(&self.counters.odds_hits);
                debug!(cache_key = %cache_key, rows = entry.value.events.len(), "Odds cache hit");
                return Arc::clone(&entry.value);
            }
        }
        bump(&self.counters.odds_misses);

        let this = Arc::clone(self);
        let source_key = source_key.to_string();
        let key = cache_key.clone();
        let (snapshot, joined) = self
            .odds_flight
            .run(&cache_key, move || {
                async move { this.refresh_odds(&source_key, &key, &markets).await }.boxed()
            })
            .await;
        if joined {
            bump(&self.counters.coalesced_waits);
        }
        snapshot
    }

    async fn refresh_odds(&self, source_key: &str, cache_key: &str, markets: &[String]) -> Arc<OddsSnapshot> {
        if let Some(entry) = self.odds.read().await.get(cache_key) {
            if entry.is_fresh(self.clock.now(), self.config.odds_ttl_secs) {
                debug!(cache_key, "Odds refreshed by an earlier flight");
                return Arc::clone(&entry.value);
            }
        }
        let chain = fetch::run_chain(
            self.source.as_ref(),
            source_key,
            markets,
            &fetch::plan(markets),
            self.config.fetch_timeout(),
        )
        .await;
        self.counters
            .upstream_calls
            .fetch_add(chain.attempts.len() as u64, Ordering::Relaxed);
        self.counters
            .upstream_failures
            .fetch_add(chain.failures().count() as u64, Ordering::Relaxed);

        let Some((_, _, raw)) = chain.success() else {
            return self.stale_or_empty_odds(source_key, cache_key, markets).await;
        };

        let now = self.clock.now();
        let (rows, skipped) = feed::parse_odds(source_key, raw);
        let snapshot = Arc::new(OddsSnapshot {
            sport: source_key.to_string(),
            markets: markets.to_vec(),
            captured_at: now,
            events: rows,
        });

        let previous = {
            let mut map = self.odds.write().await;
            let previous = map.get(cache_key).map(|e| Arc::clone(&e.value));
            self.insert_bounded(
                &mut *map,
                cache_key.to_string(),
                Entry {
                    value: Arc::clone(&snapshot),
                    fetched_at: now,
                },
            );
            previous
        };

        let moved = {
            let mut history = self.history.write().await;
            let sport = history.entry(source_key.to_string()).or_default();
            let moved = sport.record(
                cache_key,
                previous.as_deref(),
                Arc::clone(&snapshot),
                self.config.movement_threshold,
                now,
            );
            sport.prune(now - self.config.retention(), self.config.max_history_snapshots);
            moved
        };

        info!(
            cache_key,
            rows = snapshot.events.len(),
            outcomes = snapshot.outcome_count(),
            skipped = skipped.total(),
            movements = moved,
            "Odds snapshot stored"
        );
        snapshot
    }

    async fn stale_or_empty_odds(&self, source_key: &str, cache_key: &str, markets: &[String]) -> Arc<OddsSnapshot> {
        match self.odds.read().await.get(cache_key) {
            Some(stale) => {
                bump(&self.counters.stale_served);
                warn!(
                    source_key,
                    markets = %markets.join(","),
                    cached_at = %stale.fetched_at,
                    "All odds fetch strategies failed, serving stale"
                );
                Arc::clone(&stale.value)
            }
            None => {
                warn!(source_key, markets = %markets.join(","), "All odds fetch strategies failed, nothing cached");
                Arc::new(OddsSnapshot::empty(source_key, markets, self.clock.now()))
            }
        }
    }

    // -- History ------------------------------------------------------------

    /// Book trends for a source key, once enough snapshots exist.
    pub async fn get_trends(&self, source_key: &str) -> Option<TrendSummary> {
        self.history
            .read()
            .await
            .get(source_key)
            .and_then(|h| h.summary(source_key, self.config.min_trend_snapshots))
    }

    /// Movements inside the retention window, largest first.
    pub async fn movements(&self, source_key: &str) -> Vec<Movement> {
        let cutoff = self.clock.now() - self.config.retention();
        let history = self.history.read().await;
        let mut out: Vec<Movement> = history
            .get(source_key)
            .map(|h| h.movements().filter(|m| m.detected_at >= cutoff).cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.delta.total_cmp(&a.delta));
        out
    }

    // -- Maintenance --------------------------------------------------------

    fn insert_bounded<T>(&self, map: &mut HashMap<String, Entry<T>>, key: String, entry: Entry<T>) {
        if !map.contains_key(&key) && map.len() >= self.config.max_entries.max(1) {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                map.remove(&oldest);
                bump(&self.counters.evictions);
                debug!(evicted = %oldest, "Cache at capacity, evicted oldest entry");
            }
        }
        map.insert(key, entry);
    }

    /// Drop entries past TTL plus the stale grace, and prune history
    /// beyond retention.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let grace = Duration::seconds(self.config.stale_grace_secs);
        let mut report = SweepReport::default();

        {
            let cutoff = now - Duration::seconds(self.config.event_ttl_secs) - grace;
            let mut map = self.events.write().await;
            let before = map.len();
            map.retain(|_, e| e.fetched_at >= cutoff);
            report.events_removed = before - map.len();
        }
        {
            let cutoff = now - Duration::seconds(self.config.odds_ttl_secs) - grace;
            let mut map = self.odds.write().await;
            let before = map.len();
            map.retain(|_, e| e.fetched_at >= cutoff);
            report.odds_removed = before - map.len();
        }
        {
            let cutoff = now - self.config.retention();
            let mut history = self.history.write().await;
            for h in history.values_mut() {
                report.history_pruned += h.prune(cutoff, self.config.max_history_snapshots);
            }
            history.retain(|_, h| !h.is_empty());
        }

        if report != SweepReport::default() {
            info!(
                events = report.events_removed,
                odds = report.odds_removed,
                history = report.history_pruned,
                "Cache sweep removed entries"
            );
        }
        report
    }

    pub async fn stats(&self) -> CacheStats {
        let c = &self.counters;
        let history = self.history.read().await;
        CacheStats {
            event_entries: self.events.read().await.len(),
            odds_entries: self.odds.read().await.len(),
            event_hits: c.event_hits.load(Ordering::Relaxed),
            event_misses: c.event_misses.load(Ordering::Relaxed),
            odds_hits: c.odds_hits.load(Ordering::Relaxed),
            odds_misses: c.odds_misses.load(Ordering::Relaxed),
            upstream_calls: c.upstream_calls.load(Ordering::Relaxed),
            upstream_failures: c.upstream_failures.load(Ordering::Relaxed),
            stale_served: c.stale_served.load(Ordering::Relaxed),
            coalesced_waits: c.coalesced_waits.load(Ordering::Relaxed),
            history_snapshots: history.values().map(|h| h.snapshot_count()).sum(),
            movements: history.values().map(|h| h.movement_count()).sum(),
            evictions: c.evictions.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
