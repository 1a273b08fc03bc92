//! Middle detection on spreads and totals.
//!
//! A middle is two opposite-side bets at different books whose lines
//! leave a window where both win. The chance of landing inside the window
//! comes from the sport's key-number table; everything else inside gets a
//! flat default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::sports::{SportProfile, SportRegistry};
use crate::types::{Book, EventOdds, MarketKind, OddsSnapshot, Outcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MiddleConfig {
    /// Landing probability for a whole number that is not a key number.
    pub non_key_probability: f64,
    /// Ceiling on the summed hit probability.
    pub max_hit_probability: f64,
    /// Gaps must be strictly wider than this.
    pub min_gap: f64,
    pub max_gap: f64,
}

impl Default for MiddleConfig {
    fn default() -> Self {
        Self {
            non_key_probability: 0.03,
            max_hit_probability: 0.15,
            min_gap: 0.5,
            max_gap: 20.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddleLeg {
    pub book: String,
    pub selection: String,
    pub point: f64,
    pub american: f64,
    pub decimal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddleOpportunity {
    pub id: Uuid,
    pub sport: String,
    pub event_id: String,
    pub event_label: String,
    pub commence_time: DateTime<Utc>,
    pub market: String,
    pub kind: MarketKind,
    pub legs: Vec<MiddleLeg>,
    /// Both legs win for results strictly inside (low, high). For spreads
    /// the result is the first leg's team margin.
    pub window_low: f64,
    pub window_high: f64,
    pub gap: f64,
    pub key_numbers: Vec<i64>,
    pub hit_probability: f64,
    /// Per unit of total stake, equal stakes on both legs.
    pub expected_value: f64,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for MiddleOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} {:+} @ {} / {} {:+} @ {} window ({}, {}) hit {:.1}% EV {:+.2}%",
            self.event_label,
            self.market,
            self.legs[0].selection,
            self.legs[0].point,
            self.legs[0].book,
            self.legs[1].selection,
            self.legs[1].point,
            self.legs[1].book,
            self.window_low,
            self.window_high,
            self.hit_probability * 100.0,
            self.expected_value * 100.0,
        )
    }
}

/// Integers strictly inside `(low, high)`.
pub fn integers_inside(low: f64, high: f64) -> Vec<i64> {
    if !(low.is_finite() && high.is_finite()) || high <= low {
        return Vec::new();
    }
    let first = low.floor() as i64 + 1;
    let last = high.ceil() as i64 - 1;
    (first..=last).collect()
}

/// EV per unit of total stake with one unit on each leg.
///
/// On a hit both legs pay; on a miss one leg wins and the other loses,
/// and the worse of the two such outcomes is assumed.
pub fn middle_ev(hit: f64, decimal_a: f64, decimal_b: f64) -> f64 {
    let win_a = decimal_a - 1.0;
    let win_b = decimal_b - 1.0;
    let worst_miss = 1.0 - win_a.min(win_b);
    (hit * (win_a + win_b) - (1.0 - hit) * worst_miss) / 2.0
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct MiddleDetector {
    config: MiddleConfig,
    sports: Arc<SportRegistry>,
}

struct Pairing<'a> {
    first: (&'a Book, &'a Outcome),
    second: (&'a Book, &'a Outcome),
    low: f64,
    high: f64,
}

impl MiddleDetector {
    pub fn new(config: MiddleConfig, sports: Arc<SportRegistry>) -> Self {
        Self { config, sports }
    }

    pub fn config(&self) -> &MiddleConfig {
        &self.config
    }

    /// Probability that the result lands strictly inside the window.
    pub fn hit_probability(&self, profile: &SportProfile, kind: MarketKind, low: f64, high: f64) -> (f64, Vec<i64>) {
        let mut total = 0.0;
        let mut keys = Vec::new();
        for n in integers_inside(low, high) {
            let key = u32::try_from(n.unsigned_abs())
                .ok()
                .and_then(|v| profile.key_probability(kind, v));
            match key {
                Some(p) => {
                    total += p;
                    keys.push(n);
                }
                None => total += self.config.non_key_probability,
            }
        }
        (total.min(self.config.max_hit_probability), keys)
    }

    /// The winning window for two opposite-side outcomes, if they form one.
    fn window<'a>(&self, kind: MarketKind, a: (&'a Book, &'a Outcome), b: (&'a Book, &'a Outcome)) -> Option<Pairing<'a>> {
        let (pa, pb) = (a.1.point?, b.1.point?);
        match kind {
            MarketKind::Total => {
                let (over, under) = if a.1.is_over() && b.1.is_under() {
                    (a, b)
                } else if a.1.is_under() && b.1.is_over() {
                    (b, a)
                } else {
                    return None;
                };
                let (low, high) = (over.1.point?, under.1.point?);
                Some(Pairing { first: over, second: under, low, high })
            }
            MarketKind::Spread => {
                if a.1.name.eq_ignore_ascii_case(&b.1.name) {
                    return None;
                }
                // First team covers when margin > -pa, second when margin < pb.
                Some(Pairing { first: a, second: b, low: -pa, high: pb })
            }
            _ => None,
        }
    }

    /// Positive-EV middles in the snapshot, by EV then hit probability.
    pub fn find_middles(&self, snapshot: &OddsSnapshot) -> Vec<MiddleOpportunity> {
        let mut best: HashMap<String, MiddleOpportunity> = HashMap::new();

        for event in &snapshot.events {
            let profile = self.sports.resolve(&event.source_key);
            for key in event.market_keys() {
                let quotes: Vec<(&Book, &Outcome, MarketKind)> = event
                    .books
                    .iter()
                    .filter_map(|b| b.market(&key).map(|m| (b, m)))
                    .filter(|(_, m)| matches!(m.kind, MarketKind::Spread | MarketKind::Total))
                    .flat_map(|(b, m)| m.outcomes.iter().map(move |o| (b, o, m.kind)))
                    .collect();

                for (i, &(book_a, out_a, kind)) in quotes.iter().enumerate() {
                    for &(book_b, out_b, _) in &quotes[i + 1..] {
                        if book_a.key == book_b.key {
                            continue;
                        }
                        let Some(pair) = self.window(kind, (book_a, out_a), (book_b, out_b)) else {
                            continue;
                        };
                        let gap = pair.high - pair.low;
                        if gap <= self.config.min_gap || gap > self.config.max_gap {
                            continue;
                        }
                        if let Some(opp) = self.evaluate(snapshot, event, &key, kind, &profile, &pair) {
                            let slot = format!(
                                "{}|{}|{}{:+}|{}{:+}",
                                event.event_id,
                                key,
                                pair.first.1.name,
                                pair.low,
                                pair.second.1.name,
                                pair.high
                            );
                            match best.get(&slot) {
                                Some(existing) if existing.expected_value >= opp.expected_value => {}
                                _ => {
                                    best.insert(slot, opp);
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut middles: Vec<MiddleOpportunity> = best.into_values().collect();
        middles.sort_by(|a, b| {
            b.expected_value
                .total_cmp(&a.expected_value)
                .then_with(|| b.hit_probability.total_cmp(&a.hit_probability))
        });
        info!(sport = %snapshot.sport, found = middles.len(), "Middle scan complete");
        middles
    }

    fn evaluate(
        &self,
        snapshot: &OddsSnapshot,
        event: &EventOdds,
        market: &str,
        kind: MarketKind,
        profile: &SportProfile,
        pair: &Pairing<'_>,
    ) -> Option<MiddleOpportunity> {
        let (hit, keys) = self.hit_probability(profile, kind, pair.low, pair.high);
        let ev = middle_ev(hit, pair.first.1.decimal, pair.second.1.decimal);
        if ev <= 0.0 || !ev.is_finite() {
            return None;
        }
        let leg = |(book, outcome): (&Book, &Outcome)| MiddleLeg {
            book: book.key.clone(),
            selection: outcome.name.clone(),
            point: outcome.point.unwrap_or_default(),
            american: outcome.price,
            decimal: outcome.decimal,
        };
        Some(MiddleOpportunity {
            id: Uuid::new_v4(),
            sport: snapshot.sport.clone(),
            event_id: event.event_id.clone(),
            event_label: event.label(),
            commence_time: event.commence_time,
            market: market.to_string(),
            kind,
            legs: vec![leg(pair.first), leg(pair.second)],
            window_low: pair.low,
            window_high: pair.high,
            gap: pair.high - pair.low,
            key_numbers: keys,
            hit_probability: hit,
            expected_value: ev,
            detected_at: snapshot.captured_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
