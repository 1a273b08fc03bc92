//! Arbitrage detection.
//!
//! Every cross-book leg set goes through the same short-circuiting
//! validation chain: distinct books, realistic prices, complementary
//! selections, combined implied probability under `1 - buffer`, a sane
//! margin, and a push check on whole-number lines. Draw sports price the
//! moneyline as a three-way market; everywhere else draws are dropped
//! before pairing.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::odds;
use crate::sports::SportRegistry;
use crate::types::{Book, BookMarket, EventOdds, MarketKind, OddsSnapshot, Outcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    /// Combined implied probability must be below `1 - safety_buffer`.
    pub safety_buffer: f64,
    /// Margins above this (percent) are treated as bad data.
    pub max_profit_percent: f64,
    /// Decimal prices at or above this are treated as stale or suspended.
    pub max_decimal: f64,
    /// Tolerance when comparing lines.
    pub line_epsilon: f64,
    /// Total stake distributed across the legs.
    pub total_stake: Decimal,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            safety_buffer: 0.015,
            max_profit_percent: 10.0,
            max_decimal: 20.0,
            line_epsilon: 0.001,
            total_stake: dec!(100),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a leg set was not an arbitrage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    SameBook,
    UnrealisticOdds,
    NotComplementary,
    NoEdge,
    ImplausibleMargin,
    PushLoss,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::SameBook => write!(f, "legs share a book"),
            Rejection::UnrealisticOdds => write!(f, "price above realism ceiling"),
            Rejection::NotComplementary => write!(f, "selections are not complementary"),
            Rejection::NoEdge => write!(f, "combined implied probability too high"),
            Rejection::ImplausibleMargin => write!(f, "margin above sanity ceiling"),
            Rejection::PushLoss => write!(f, "loses money on a push"),
        }
    }
}

/// One priced selection at one book, as considered for a leg.
#[derive(Debug, Clone, Copy)]
pub struct Quote<'a> {
    pub book: &'a Book,
    pub outcome: &'a Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbLeg {
    pub book: String,
    pub selection: String,
    pub description: Option<String>,
    pub point: Option<f64>,
    pub american: f64,
    pub decimal: f64,
    pub implied_probability: f64,
    pub stake: Decimal,
    pub payout: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrageOpportunity {
    pub id: Uuid,
    pub sport: String,
    pub event_id: String,
    pub event_label: String,
    pub commence_time: DateTime<Utc>,
    pub market: String,
    pub kind: MarketKind,
    pub legs: Vec<ArbLeg>,
    /// Sum of the legs' implied probabilities.
    pub arbitrage_index: f64,
    /// `(1 - index) × 100`.
    pub profit_percent: f64,
    pub total_stake: Decimal,
    pub guaranteed_profit: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for ArbitrageOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {:.2}% ", self.event_label, self.market, self.profit_percent)?;
        for (i, leg) in self.legs.iter().enumerate() {
            if i > 0 {
                write!(f, " / ")?;
            }
            write!(f, "{} {:+.0} @ {} (${})", leg.selection, leg.american, leg.book, leg.stake)?;
        }
        write!(f, " → +${}", self.guaranteed_profit)
    }
}

fn to_money(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO).round_dp(2)
}

/// Two-leg stake split: `(T·d2/(d1+d2), T·d1/(d1+d2))`.
pub fn two_way_stakes(total: f64, d1: f64, d2: f64) -> (f64, f64) {
    let sum = d1 + d2;
    (total * d2 / sum, total * d1 / sum)
}

/// Three-way stakes: `T / (dᵢ · index)`.
pub fn three_way_stakes(total: f64, decimals: [f64; 3]) -> [f64; 3] {
    let index: f64 = decimals.iter().map(|d| 1.0 / d).sum();
    decimals.map(|d| total / (d * index))
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct ArbitrageDetector {
    config: ArbitrageConfig,
    sports: Arc<SportRegistry>,
}

impl ArbitrageDetector {
    pub fn new(config: ArbitrageConfig, sports: Arc<SportRegistry>) -> Self {
        Self { config, sports }
    }

    pub fn config(&self) -> &ArbitrageConfig {
        &self.config
    }

    /// Whether two outcomes cover each other on a market of `kind`.
    pub fn is_complementary(&self, kind: MarketKind, a: &Outcome, b: &Outcome) -> bool {
        if a.description != b.description {
            return false;
        }
        let eps = self.config.line_epsilon;
        match kind {
            MarketKind::Moneyline => !a.name.eq_ignore_ascii_case(&b.name),
            MarketKind::Spread => match (a.point, b.point) {
                // Same absolute line, opposite signs.
                (Some(pa), Some(pb)) => {
                    !a.name.eq_ignore_ascii_case(&b.name)
                        && (pa.abs() - pb.abs()).abs() <= eps
                        && (pa + pb).abs() <= eps
                }
                _ => false,
            },
            MarketKind::Total | MarketKind::PlayerProp => match (a.point, b.point) {
                (Some(pa), Some(pb)) => {
                    (pa - pb).abs() <= eps
                        && ((a.is_over() && b.is_under()) || (a.is_under() && b.is_over()))
                }
                _ => false,
            },
        }
    }

    /// Run the validation chain on a leg set. Returns the arbitrage index
    /// when every check passes.
    pub fn validate(&self, kind: MarketKind, legs: &[Quote<'_>]) -> Result<f64, Rejection> {
        for (i, a) in legs.iter().enumerate() {
            if legs[i + 1..].iter().any(|b| a.book.key == b.book.key) {
                return Err(Rejection::SameBook);
            }
        }

        if legs.iter().any(|l| l.outcome.decimal >= self.config.max_decimal) {
            return Err(Rejection::UnrealisticOdds);
        }

        match legs {
            [a, b] => {
                if !self.is_complementary(kind, a.outcome, b.outcome) {
                    return Err(Rejection::NotComplementary);
                }
            }
            [a, b, c] => {
                let same = |x: &Quote<'_>, y: &Quote<'_>| x.outcome.name.eq_ignore_ascii_case(&y.outcome.name);
                let distinct = !same(a, b) && !same(a, c) && !same(b, c);
                let draws = legs.iter().filter(|l| l.outcome.is_draw()).count();
                if kind != MarketKind::Moneyline || !distinct || draws != 1 {
                    return Err(Rejection::NotComplementary);
                }
            }
            _ => return Err(Rejection::NotComplementary),
        }

        let index: f64 = legs.iter().map(|l| l.outcome.implied).sum();
        if index >= 1.0 - self.config.safety_buffer {
            return Err(Rejection::NoEdge);
        }

        if (1.0 - index) * 100.0 > self.config.max_profit_percent {
            return Err(Rejection::ImplausibleMargin);
        }

        if kind.has_line() && !self.survives_push(legs, index) {
            return Err(Rejection::PushLoss);
        }

        Ok(index)
    }

    /// Worst case on a whole-number line: every leg sitting on the push
    /// value gets its stake back, every other leg loses.
    fn survives_push(&self, legs: &[Quote<'_>], index: f64) -> bool {
        let total = 1.0;
        let stakes: Vec<f64> = legs.iter().map(|l| total / (l.outcome.decimal * index)).collect();

        for leg in legs {
            let Some(point) = leg.outcome.point else { continue };
            if !odds::is_whole_line(point) {
                continue;
            }
            let push_value = point.abs();
            let net: f64 = legs
                .iter()
                .zip(&stakes)
                .map(|(l, stake)| match l.outcome.point {
                    Some(p) if (p.abs() - push_value).abs() < 1e-9 => 0.0,
                    _ => -stake,
                })
                .sum();
            if net < 0.0 {
                return false;
            }
        }
        true
    }

    fn build(
        &self,
        snapshot: &OddsSnapshot,
        event: &EventOdds,
        market: &BookMarket,
        legs: &[Quote<'_>],
        index: f64,
    ) -> ArbitrageOpportunity {
        let total = self.config.total_stake.to_f64().unwrap_or(100.0);
        let stakes: Vec<f64> = match legs {
            [a, b] => {
                let (s1, s2) = two_way_stakes(total, a.outcome.decimal, b.outcome.decimal);
                vec![s1, s2]
            }
            [a, b, c] => three_way_stakes(total, [a.outcome.decimal, b.outcome.decimal, c.outcome.decimal]).to_vec(),
            _ => legs.iter().map(|l| total / (l.outcome.decimal * index)).collect(),
        };

        let legs: Vec<ArbLeg> = legs
            .iter()
            .zip(stakes)
            .map(|(q, stake)| ArbLeg {
                book: q.book.key.clone(),
                selection: q.outcome.name.clone(),
                description: q.outcome.description.clone(),
                point: q.outcome.point,
                american: q.outcome.price,
                decimal: q.outcome.decimal,
                implied_probability: q.outcome.implied,
                stake: to_money(stake),
                payout: to_money(stake * q.outcome.decimal),
            })
            .collect();

        ArbitrageOpportunity {
            id: Uuid::new_v4(),
            sport: snapshot.sport.clone(),
            event_id: event.event_id.clone(),
            event_label: event.label(),
            commence_time: event.commence_time,
            market: market.key.clone(),
            kind: market.kind,
            legs,
            arbitrage_index: index,
            profit_percent: (1.0 - index) * 100.0,
            total_stake: self.config.total_stake,
            guaranteed_profit: to_money(total / index - total),
            detected_at: snapshot.captured_at,
        }
    }

    /// Every validated arbitrage in the snapshot, best margin first.
    ///
    /// For each event, market and leg combination only the best-priced
    /// book pairing is kept.
    pub fn find_arbitrage(&self, snapshot: &OddsSnapshot) -> Vec<ArbitrageOpportunity> {
        let mut found: HashMap<String, ArbitrageOpportunity> = HashMap::new();
        let mut rejected: HashMap<Rejection, usize> = HashMap::new();

        for event in &snapshot.events {
            let draws = self.sports.has_draws(&event.source_key);

            let mut keys: Vec<&str> = Vec::new();
            for book in &event.books {
                for m in &book.markets {
                    if !keys.contains(&m.key.as_str()) {
                        keys.push(m.key.as_str());
                    }
                }
            }

            for key in keys {
                let quotes: Vec<(Quote<'_>, &BookMarket)> = event
                    .books
                    .iter()
                    .filter_map(|b| b.market(key).map(|m| (b, m)))
                    .flat_map(|(book, m)| m.outcomes.iter().map(move |outcome| (Quote { book, outcome }, m)))
                    .collect();
                let Some((_, market)) = quotes.first().copied() else {
                    continue;
                };

                let mut consider = |legs: Vec<Quote<'_>>| match self.validate(market.kind, &legs) {
                    Ok(index) => {
                        let opp = self.build(snapshot, event, market, &legs, index);
                        let mut selections: Vec<String> = legs
                            .iter()
                            .map(|l| format!("{}{:?}", l.outcome.name, l.outcome.point))
                            .collect();
                        selections.sort();
                        let slot = format!("{}|{}|{}", event.event_id, key, selections.join("|"));
                        match found.get(&slot) {
                            Some(existing) if existing.profit_percent >= opp.profit_percent => {}
                            _ => {
                                found.insert(slot, opp);
                            }
                        }
                    }
                    Err(reason) => *rejected.entry(reason).or_default() += 1,
                };

                if market.kind == MarketKind::Moneyline && draws {
                    let (draw_quotes, side_quotes): (Vec<_>, Vec<_>) =
                        quotes.iter().map(|(q, _)| *q).partition(|q| q.outcome.is_draw());
                    for (i, a) in side_quotes.iter().enumerate() {
                        for b in &side_quotes[i + 1..] {
                            if a.outcome.name.eq_ignore_ascii_case(&b.outcome.name) {
                                continue;
                            }
                            for d in &draw_quotes {
                                consider(vec![*a, *b, *d]);
                            }
                        }
                    }
                    continue;
                }

                let pool: Vec<Quote<'_>> = quotes
                    .iter()
                    .map(|(q, _)| *q)
                    .filter(|q| !q.outcome.is_draw())
                    .collect();
                for (i, a) in pool.iter().enumerate() {
                    for b in &pool[i + 1..] {
                        consider(vec![*a, *b]);
                    }
                }
            }
        }

        let mut opportunities: Vec<ArbitrageOpportunity> = found.into_values().collect();
        opportunities.sort_by(|a, b| b.profit_percent.total_cmp(&a.profit_percent));

        debug!(sport = %snapshot.sport, rejected = ?rejected, "Arbitrage rejections");
        info!(sport = %snapshot.sport, found = opportunities.len(), "Arbitrage scan complete");
        opportunities
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
