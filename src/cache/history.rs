//! Rolling odds history: snapshots, line movements and book trends.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::odds;
use crate::types::{BookTrend, Movement, MovementDirection, OddsSnapshot, TrendSummary};

/// One stored capture.
#[derive(Debug, Clone)]
pub struct HistoricalSnapshot {
    pub cache_key: String,
    pub captured_at: DateTime<Utc>,
    pub snapshot: Arc<OddsSnapshot>,
}

/// Everything remembered for one sport.
#[derive(Debug, Default)]
pub struct SportHistory {
    snapshots: VecDeque<HistoricalSnapshot>,
    movements: VecDeque<Movement>,
    trends: HashMap<String, BookTrend>,
    snapshots_recorded: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl SportHistory {
    /// Record a new snapshot, comparing it against the one it replaced.
    /// Returns how many movements were detected.
    pub fn record(
        &mut self,
        cache_key: &str,
        previous: Option<&OddsSnapshot>,
        current: Arc<OddsSnapshot>,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> usize {
        let detected = match previous {
            Some(prev) => detect_movements(prev, &current, threshold, now),
            None => Vec::new(),
        };
        let count = detected.len();
        self.movements.extend(detected);

        update_trends(&mut self.trends, &current);
        self.snapshots.push_back(HistoricalSnapshot {
            cache_key: cache_key.to_string(),
            captured_at: current.captured_at,
            snapshot: current,
        });
        self.snapshots_recorded += 1;
        self.updated_at = Some(now);
        count
    }

    /// Drop everything older than `cutoff` and cap the snapshot count.
    pub fn prune(&mut self, cutoff: DateTime<Utc>, max_snapshots: usize) -> usize {
        let before = self.snapshots.len() + self.movements.len();
        self.snapshots.retain(|s| s.captured_at >= cutoff);
        self.movements.retain(|m| m.detected_at >= cutoff);
        while self.snapshots.len() > max_snapshots {
            self.snapshots.pop_front();
        }
        before - (self.snapshots.len() + self.movements.len())
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.movements.is_empty()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn movement_count(&self) -> usize {
        self.movements.len()
    }

    pub fn movements(&self) -> impl Iterator<Item = &Movement> {
        self.movements.iter()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &HistoricalSnapshot> {
        self.snapshots.iter()
    }

    /// Trend report, or `None` until enough snapshots have been seen.
    pub fn summary(&self, sport: &str, min_snapshots: u64) -> Option<TrendSummary> {
        if self.snapshots_recorded < min_snapshots || self.trends.is_empty() {
            return None;
        }
        let mut books: Vec<BookTrend> = self.trends.values().cloned().collect();
        books.sort_by(|a, b| {
            b.beat_rate()
                .total_cmp(&a.beat_rate())
                .then_with(|| b.average_edge.total_cmp(&a.average_edge))
                .then_with(|| a.book.cmp(&b.book))
        });
        Some(TrendSummary {
            sport: sport.to_string(),
            snapshots_recorded: self.snapshots_recorded,
            books,
            recent_movements: self.movements.len(),
            updated_at: self.updated_at?,
        })
    }
}

type OutcomeKey = (String, String, String, String);

fn index(snapshot: &OddsSnapshot) -> HashMap<OutcomeKey, (f64, f64, Option<f64>, String, String)> {
    let mut map = HashMap::new();
    for event in &snapshot.events {
        for book in &event.books {
            for market in &book.markets {
                for outcome in &market.outcomes {
                    map.insert(
                        (
                            event.event_id.clone(),
                            book.key.clone(),
                            market.key.clone(),
                            outcome.selection_key(),
                        ),
                        (outcome.price, outcome.decimal, outcome.point, outcome.name.clone(), event.label()),
                    );
                }
            }
        }
    }
    map
}

/// Compare two snapshots outcome by outcome.
///
/// Only outcomes present in both (same event, book, market, selection
/// and line) are compared; a delta at or above `threshold` cents emits a
/// movement.
pub fn detect_movements(
    previous: &OddsSnapshot,
    current: &OddsSnapshot,
    threshold: f64,
    now: DateTime<Utc>,
) -> Vec<Movement> {
    let before = index(previous);
    let mut movements = Vec::new();

    for ((event_id, book, market, selection_key), (price, decimal, point, name, label)) in index(current) {
        let key = (event_id, book, market, selection_key);
        let Some((prev_price, prev_decimal, _, _, _)) = before.get(&key) else {
            continue;
        };
        let delta = odds::price_delta(*prev_price, price);
        if delta < threshold {
            continue;
        }
        let (event_id, book, market, _) = key;
        let direction = if decimal > *prev_decimal {
            MovementDirection::Lengthened
        } else {
            MovementDirection::Shortened
        };
        debug!(event = %label, book = %book, market = %market, selection = %name, delta, "Line movement");
        movements.push(Movement {
            sport: current.sport.clone(),
            event_id,
            event_label: label,
            book,
            market,
            selection: name,
            point,
            previous_price: *prev_price,
            current_price: price,
            delta,
            direction,
            percent_change: (decimal - prev_decimal) / prev_decimal * 100.0,
            detected_at: now,
        });
    }

    movements.sort_by(|a, b| b.delta.total_cmp(&a.delta));
    movements
}

/// Fold a snapshot into per-book trend statistics.
///
/// For every selection quoted by two or more books, each book is
/// compared with the cross-book average decimal price.
pub fn update_trends(trends: &mut HashMap<String, BookTrend>, snapshot: &OddsSnapshot) {
    for event in &snapshot.events {
        let mut quotes: HashMap<(String, String), Vec<(&str, f64)>> = HashMap::new();
        for book in &event.books {
            for market in &book.markets {
                for outcome in &market.outcomes {
                    quotes
                        .entry((market.key.clone(), outcome.selection_key()))
                        .or_default()
                        .push((book.key.as_str(), outcome.decimal));
                }
            }
        }
        for prices in quotes.values() {
            if prices.len() < 2 {
                continue;
            }
            let average = prices.iter().map(|(_, d)| d).sum::<f64>() / prices.len() as f64;
            for (book, decimal) in prices {
                trends
                    .entry(book.to_string())
                    .or_insert_with(|| BookTrend::new(book))
                    .record(*decimal, average);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
