//! No-vig expected-value engine.
//!
//! Two passes. `quick_estimate` runs over every priced outcome in a
//! snapshot: it strips the vig, averages the fair probability across
//! every book quoting the same selection, nudges it for well-known public
//! biases and computes EV. Survivors go through `precise_estimate`, which
//! adds a confidence score, an edge classification, a Kelly fraction and
//! the advanced market metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::kelly::KellyCalculator;
use crate::odds;
use crate::sports::SportRegistry;
use crate::types::{Book, BookMarket, EventOdds, MarketKind, OddsSnapshot, Outcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvConfig {
    /// Assumed vig when the opposing side is not quoted.
    pub vig_moneyline: f64,
    pub vig_spread: f64,
    pub vig_total: f64,
    pub vig_player_prop: f64,
    /// Probability nudge applied for each public-bias heuristic.
    pub bias_adjustment: f64,
    /// Decimal odds below this count as a heavy favourite.
    pub heavy_favorite_decimal: f64,
    /// Minimum quick EV for a bet to be considered.
    pub min_ev: f64,
    /// Stop after this many positive results.
    pub max_results: usize,
    pub base_confidence: f64,
    /// |American| at or below this earns the moderate-odds bonus.
    pub moderate_american: f64,
    /// |American| at or above this takes the extreme-odds penalty.
    pub extreme_american: f64,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            vig_moneyline: 0.025,
            vig_spread: 0.022,
            vig_total: 0.024,
            vig_player_prop: 0.045,
            bias_adjustment: 0.01,
            heavy_favorite_decimal: 1.5,
            min_ev: 0.02,
            max_results: 20,
            base_confidence: 0.7,
            moderate_american: 200.0,
            extreme_american: 500.0,
        }
    }
}

impl EvConfig {
    pub fn vig_for(&self, kind: MarketKind) -> f64 {
        match kind {
            MarketKind::Moneyline => self.vig_moneyline,
            MarketKind::Spread => self.vig_spread,
            MarketKind::Total => self.vig_total,
            MarketKind::PlayerProp => self.vig_player_prop,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What kind of mispricing a bet is exploiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    UnderdogValueSpot,
    FavoriteOvervaluation,
    PickEmMispricing,
    SpreadValue,
    TotalValue,
    PropValue,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeType::UnderdogValueSpot => "underdog_value_spot",
            EdgeType::FavoriteOvervaluation => "favorite_overvaluation",
            EdgeType::PickEmMispricing => "pick_em_mispricing",
            EdgeType::SpreadValue => "spread_value",
            EdgeType::TotalValue => "total_value",
            EdgeType::PropValue => "prop_value",
        };
        write!(f, "{s}")
    }
}

/// First-pass estimate for one priced outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub sport: String,
    pub event_id: String,
    pub event_label: String,
    pub commence_time: DateTime<Utc>,
    pub book: String,
    pub market: String,
    pub kind: MarketKind,
    pub outcome: Outcome,
    /// Same book's opposing side, when quoted.
    pub opposing_implied: Option<f64>,
    /// This book's fair probability with its own vig removed.
    pub no_vig_probability: f64,
    /// Consensus fair probability after bias adjustments.
    pub true_probability: f64,
    /// Books contributing to the consensus.
    pub consensus_books: usize,
    pub quick_ev: f64,
    pub major_league: bool,
}

/// Derived market-quality numbers for a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedMetrics {
    pub vig_percent: f64,
    pub implied_probability: f64,
    pub no_vig_probability: f64,
    pub no_vig_decimal: f64,
    pub no_vig_american: f64,
    pub true_probability: f64,
    /// 0–100; higher means harder to beat.
    pub market_efficiency: f64,
    /// True minus no-vig probability, in percentage points.
    pub probability_edge: f64,
}

/// A candidate after full scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredBet {
    pub candidate: Candidate,
    pub ev: f64,
    pub confidence: f64,
    pub edge_type: EdgeType,
    pub kelly_fraction: f64,
    pub metrics: AdvancedMetrics,
}

impl fmt::Display for ScoredBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} {} {} | EV {:+.1}% conf {:.2} kelly {:.1}% [{}]",
            self.candidate.event_label,
            self.candidate.book,
            self.candidate.market,
            self.candidate.outcome,
            self.ev * 100.0,
            self.confidence,
            self.kelly_fraction * 100.0,
            self.edge_type,
        )
    }
}

// ---------------------------------------------------------------------------
// Probability helpers
// ---------------------------------------------------------------------------

/// Proportional vig removal for a two-way market. The pair sums to 1.
pub fn no_vig_pair(implied_a: f64, implied_b: f64) -> (f64, f64) {
    let total = implied_a + implied_b;
    if total <= 0.0 || !total.is_finite() {
        return (0.5, 0.5);
    }
    (implied_a / total, implied_b / total)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct EvEngine {
    config: EvConfig,
    kelly: KellyCalculator,
    sports: Arc<SportRegistry>,
}

impl EvEngine {
    pub fn new(config: EvConfig, kelly: KellyCalculator, sports: Arc<SportRegistry>) -> Self {
        Self { config, kelly, sports }
    }

    pub fn config(&self) -> &EvConfig {
        &self.config
    }

    pub fn kelly(&self) -> &KellyCalculator {
        &self.kelly
    }

    /// Fair probability of `outcome` at one book, vig removed.
    fn fair_probability(&self, market: &BookMarket, outcome: &Outcome) -> f64 {
        if let Some(opposing) = market.opposing(outcome) {
            return no_vig_pair(outcome.implied, opposing.implied).0;
        }
        if market.outcomes.len() >= 3 {
            let overround = market.overround();
            if overround > 0.0 {
                return outcome.implied / overround;
            }
        }
        outcome.implied / (1.0 + self.config.vig_for(market.kind))
    }

    /// Cheap first-pass EV for one outcome.
    ///
    /// `event` is the market view: every book quoting the same selection
    /// on the same line contributes its fair probability to the consensus.
    pub fn quick_estimate(
        &self,
        event: &EventOdds,
        book: &Book,
        market: &BookMarket,
        outcome: &Outcome,
    ) -> Candidate {
        let own_fair = self.fair_probability(market, outcome);
        let selection = outcome.selection_key();

        let mut fair_sum = 0.0;
        let mut books = 0usize;
        for other in &event.books {
            let Some(other_market) = other.market(&market.key) else {
                continue;
            };
            if let Some(o) = other_market.outcomes.iter().find(|o| o.selection_key() == selection) {
                fair_sum += self.fair_probability(other_market, o);
                books += 1;
            }
        }
        let consensus = if books > 0 { fair_sum / books as f64 } else { own_fair };

        let true_probability = self.apply_bias(consensus, event, market.kind, outcome).clamp(0.01, 0.99);
        let quick_ev = true_probability * outcome.decimal - 1.0;

        Candidate {
            sport: event.source_key.clone(),
            event_id: event.event_id.clone(),
            event_label: event.label(),
            commence_time: event.commence_time,
            book: book.key.clone(),
            market: market.key.clone(),
            kind: market.kind,
            outcome: outcome.clone(),
            opposing_implied: market.opposing(outcome).map(|o| o.implied),
            no_vig_probability: own_fair,
            true_probability,
            consensus_books: books.max(1),
            quick_ev,
            major_league: self.sports.is_major(&event.source_key),
        }
    }

    /// Public-bias correction: the crowd overbets favourites and overs.
    fn apply_bias(&self, p: f64, event: &EventOdds, kind: MarketKind, outcome: &Outcome) -> f64 {
        let step = self.config.bias_adjustment;
        let mut p = p;
        if outcome.decimal < self.config.heavy_favorite_decimal {
            p -= step;
        }
        if outcome.is_over() {
            p -= step;
        }
        if outcome.is_under() {
            p += step;
        }
        let road_dog = kind == MarketKind::Moneyline
            && outcome.name.eq_ignore_ascii_case(&event.away_team)
            && outcome.decimal > odds::NEUTRAL_DECIMAL;
        if road_dog {
            p += step;
        }
        p
    }

    /// Full scoring of a pre-filtered candidate.
    pub fn precise_estimate(&self, candidate: &Candidate) -> ScoredBet {
        let magnitude = candidate.outcome.price.abs();
        let mut confidence = self.config.base_confidence;
        if magnitude <= self.config.moderate_american {
            confidence += 0.1;
        }
        if magnitude >= self.config.extreme_american {
            confidence -= 0.2;
        }
        let confidence = confidence.clamp(0.0, 1.0);
        let ev = candidate.quick_ev;

        ScoredBet {
            candidate: candidate.clone(),
            ev,
            confidence,
            edge_type: classify(candidate),
            kelly_fraction: self.kelly.fraction(ev, confidence),
            metrics: self.advanced_metrics(candidate),
        }
    }

    /// Vig, fair odds and a market-efficiency score for a candidate.
    pub fn advanced_metrics(&self, candidate: &Candidate) -> AdvancedMetrics {
        let implied = candidate.outcome.implied;
        let vig = self.config.vig_for(candidate.kind);
        let opposing = candidate
            .opposing_implied
            .unwrap_or(1.0 + vig - implied)
            .max(0.01);
        let overround = implied + opposing;
        let vig_percent = (overround - 1.0) * 100.0;
        let (no_vig_probability, _) = no_vig_pair(implied, opposing);
        let no_vig_decimal = odds::probability_to_decimal(no_vig_probability);
        let gap = candidate.true_probability - no_vig_probability;

        let mut efficiency = 100.0 - vig_percent.max(0.0) * 5.0 - gap.abs() * 200.0;
        if candidate.kind == MarketKind::PlayerProp {
            efficiency -= 15.0;
        }
        if !candidate.major_league {
            efficiency -= 10.0;
        }

        AdvancedMetrics {
            vig_percent,
            implied_probability: implied,
            no_vig_probability,
            no_vig_decimal,
            no_vig_american: odds::decimal_to_american(no_vig_decimal),
            true_probability: candidate.true_probability,
            market_efficiency: efficiency.clamp(0.0, 100.0),
            probability_edge: gap * 100.0,
        }
    }

    /// Every outcome in the snapshot through the quick pass.
    pub fn candidates(&self, snapshot: &OddsSnapshot) -> Vec<Candidate> {
        let mut out = Vec::with_capacity(snapshot.outcome_count());
        for event in &snapshot.events {
            for book in &event.books {
                for market in &book.markets {
                    for outcome in &market.outcomes {
                        out.push(self.quick_estimate(event, book, market, outcome));
                    }
                }
            }
        }
        out
    }

    /// Positive-EV bets in the snapshot, best first.
    ///
    /// Candidates at or above `min_ev` are scored in descending quick-EV
    /// order; scoring stops once `max_results` positive bets are found.
    pub fn find_positive_ev_bets(&self, snapshot: &OddsSnapshot, min_ev: f64) -> Vec<ScoredBet> {
        let mut candidates: Vec<Candidate> = self
            .candidates(snapshot)
            .into_iter()
            .filter(|c| c.quick_ev >= min_ev)
            .collect();
        let screened = candidates.len();
        candidates.sort_by(|a, b| b.quick_ev.total_cmp(&a.quick_ev));

        let mut results = Vec::new();
        for candidate in &candidates {
            let scored = self.precise_estimate(candidate);
            if scored.ev <= 0.0 {
                continue;
            }
            debug!(
                event = %candidate.event_label,
                book = %candidate.book,
                selection = %candidate.outcome.name,
                ev = scored.ev,
                confidence = scored.confidence,
                "Positive EV"
            );
            results.push(scored);
            if results.len() >= self.config.max_results {
                break;
            }
        }

        results.sort_by(|a, b| b.ev.total_cmp(&a.ev));
        info!(
            sport = %snapshot.sport,
            outcomes = snapshot.outcome_count(),
            screened,
            found = results.len(),
            "EV scan complete"
        );
        results
    }
}

fn classify(candidate: &Candidate) -> EdgeType {
    match candidate.kind {
        MarketKind::PlayerProp => EdgeType::PropValue,
        MarketKind::Spread => EdgeType::SpreadValue,
        MarketKind::Total => EdgeType::TotalValue,
        MarketKind::Moneyline => {
            let price = candidate.outcome.price;
            if price >= 150.0 {
                EdgeType::UnderdogValueSpot
            } else if price <= -200.0 {
                EdgeType::FavoriteOvervaluation
            } else {
                EdgeType::PickEmMispricing
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn make_engine() -> EvEngine {
        EvEngine::new(
            EvConfig::default(),
            KellyCalculator::default(),
            Arc::new(SportRegistry::default()),
        )
    }

    fn moneyline(book: &str, home: f64, away: f64) -> Book {
        Book {
            key: book.into(),
            title: book.into(),
            markets: vec![BookMarket {
                key: "h2h".into(),
                kind: MarketKind::Moneyline,
                last_update: None,
                outcomes: vec![
                    Outcome::from_american("Celtics", None, None, home),
                    Outcome::from_american("Knicks", None, None, away),
                ],
            }],
        }
    }

    pub(crate) fn make_event(books: Vec<Book>) -> EventOdds {
        EventOdds {
            event_id: "nba-1".into(),
            source_key: "basketball_nba".into(),
            home_team: "Celtics".into(),
            away_team: "Knicks".into(),
            commence_time: Utc.with_ymd_and_hms(2026, 10, 21, 23, 30, 0).unwrap(),
            books,
        }
    }

    pub(crate) fn make_snapshot(books: Vec<Book>) -> OddsSnapshot {
        OddsSnapshot {
            sport: "basketball_nba".into(),
            markets: vec!["h2h".into()],
            captured_at: Utc.with_ymd_and_hms(2026, 10, 21, 12, 0, 0).unwrap(),
            events: vec![make_event(books)],
        }
    }

    pub(crate) fn make_scored(kelly_fraction: f64) -> ScoredBet {
        let engine = make_engine();
        let event = make_event(vec![moneyline("fanduel", -110.0, -110.0)]);
        let book = &event.books[0];
        let market = &book.markets[0];
        let candidate = engine.quick_estimate(&event, book, market, &market.outcomes[0]);
        let mut bet = engine.precise_estimate(&candidate);
        bet.kelly_fraction = kelly_fraction;
        bet
    }

    #[test]
    fn test_no_vig_pair_sums_to_one() {
        for (a, b) in [(0.5238, 0.5238), (0.6, 0.45), (0.8, 0.25), (0.01, 0.99)] {
            let (x, y) = no_vig_pair(a, b);
            assert!((x + y - 1.0).abs() < 1e-12);
        }
        assert_eq!(no_vig_pair(0.0, 0.0), (0.5, 0.5));
    }

    #[test]
    fn test_single_book_has_no_edge() {
        let engine = make_engine();
        let event = make_event(vec![moneyline("fanduel", -110.0, -110.0)]);
        let book = &event.books[0];
        let market = &book.markets[0];
        let c = engine.quick_estimate(&event, book, market, &market.outcomes[0]);
        assert!((c.no_vig_probability - 0.5).abs() < 1e-9);
        assert!(c.quick_ev < 0.0);
        assert_eq!(c.opposing_implied, Some(market.outcomes[1].implied));
    }

    #[test]
    fn test_missing_opposing_side_uses_fixed_vig() {
        let engine = make_engine();
        let mut book = moneyline("fanduel", 120.0, -140.0);
        book.markets[0].outcomes.truncate(1);
        let event = make_event(vec![book]);
        let book = &event.books[0];
        let market = &book.markets[0];
        let c = engine.quick_estimate(&event, book, market, &market.outcomes[0]);
        let implied = 100.0 / 220.0;
        assert!((c.no_vig_probability - implied / 1.025).abs() < 1e-9);
        assert!(c.opposing_implied.is_none());
    }

    #[test]
    fn test_outlier_price_is_positive_ev() {
        let engine = make_engine();
        // Three books agree the Knicks are a modest dog; one hangs +150.
        let snapshot = make_snapshot(vec![
            moneyline("fanduel", -130.0, 110.0),
            moneyline("draftkings", -135.0, 115.0),
            moneyline("betmgm", -130.0, 110.0),
            moneyline("pointsbet", -175.0, 150.0),
        ]);
        let bets = engine.find_positive_ev_bets(&snapshot, 0.0);
        assert!(!bets.is_empty());
        let best = &bets[0];
        assert_eq!(best.candidate.book, "pointsbet");
        assert_eq!(best.candidate.outcome.name, "Knicks");
        assert_eq!(best.candidate.consensus_books, 4);
        assert_eq!(best.edge_type, EdgeType::UnderdogValueSpot);
        assert!(best.kelly_fraction > 0.0 && best.kelly_fraction <= 0.05);
        assert!(bets.windows(2).all(|w| w[0].ev >= w[1].ev));
    }

    #[test]
    fn test_probability_clamped() {
        let engine = make_engine();
        let event = make_event(vec![moneyline("fanduel", -100000.0, 5000.0)]);
        let book = &event.books[0];
        let market = &book.markets[0];
        let fav = engine.quick_estimate(&event, book, market, &market.outcomes[0]);
        let dog = engine.quick_estimate(&event, book, market, &market.outcomes[1]);
        assert!(fav.true_probability <= 0.99);
        assert!(dog.true_probability >= 0.01);
    }

    #[test]
    fn test_bias_adjustments() {
        let engine = make_engine();
        let total = |name: &str| Outcome::from_american(name, None, Some(221.5), -110.0);
        let book = Book {
            key: "fanduel".into(),
            title: "FanDuel".into(),
            markets: vec![BookMarket {
                key: "totals".into(),
                kind: MarketKind::Total,
                last_update: None,
                outcomes: vec![total("Over"), total("Under")],
            }],
        };
        let event = make_event(vec![book]);
        let book = &event.books[0];
        let market = &book.markets[0];
        let over = engine.quick_estimate(&event, book, market, &market.outcomes[0]);
        let under = engine.quick_estimate(&event, book, market, &market.outcomes[1]);
        assert!((over.true_probability - 0.49).abs() < 1e-9);
        assert!((under.true_probability - 0.51).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_by_odds_magnitude() {
        let engine = make_engine();
        let event = make_event(vec![moneyline("fanduel", -600.0, 450.0)]);
        let book = &event.books[0];
        let market = &book.markets[0];
        let fav = engine.precise_estimate(&engine.quick_estimate(&event, book, market, &market.outcomes[0]));
        let dog = engine.precise_estimate(&engine.quick_estimate(&event, book, market, &market.outcomes[1]));
        assert!((fav.confidence - 0.5).abs() < 1e-9);
        assert!((dog.confidence - 0.7).abs() < 1e-9);
        assert_eq!(fav.edge_type, EdgeType::FavoriteOvervaluation);

        let even = make_scored(0.0);
        assert!((even.confidence - 0.8).abs() < 1e-9);
        assert_eq!(even.edge_type, EdgeType::PickEmMispricing);
    }

    #[test]
    fn test_advanced_metrics() {
        let engine = make_engine();
        let bet = make_scored(0.0);
        let m = &bet.metrics;
        assert!((m.no_vig_probability - 0.5).abs() < 1e-9);
        assert!((m.no_vig_decimal - 2.0).abs() < 1e-9);
        assert!((m.vig_percent - 4.7619).abs() < 1e-3);
        assert!(m.market_efficiency > 0.0 && m.market_efficiency < 100.0);

        // Props in a minor league score lower than a major-league moneyline.
        let mut prop = bet.candidate.clone();
        prop.kind = MarketKind::PlayerProp;
        prop.major_league = false;
        assert!(engine.advanced_metrics(&prop).market_efficiency < m.market_efficiency);
    }

    #[test]
    fn test_early_termination() {
        let engine = EvEngine::new(
            EvConfig { max_results: 1, ..Default::default() },
            KellyCalculator::default(),
            Arc::new(SportRegistry::default()),
        );
        let snapshot = make_snapshot(vec![
            moneyline("fanduel", -130.0, 110.0),
            moneyline("draftkings", -130.0, 110.0),
            moneyline("pointsbet", -175.0, 150.0),
            moneyline("caesars", 105.0, -125.0),
        ]);
        assert_eq!(engine.find_positive_ev_bets(&snapshot, 0.0).len(), 1);
    }

    #[test]
    fn test_zero_price_does_not_panic() {
        let engine = make_engine();
        let snapshot = make_snapshot(vec![moneyline("fanduel", 0.0, 0.0)]);
        for c in engine.candidates(&snapshot) {
            assert!(c.quick_ev.is_finite());
        }
    }
}
