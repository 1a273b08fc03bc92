//! Signal engine: no-vig EV, Kelly sizing, arbitrage and middles.
//!
//! All three detectors read the same immutable snapshot independently;
//! nothing here touches the network or the cache.

pub mod arbitrage;
pub mod ev;
pub mod kelly;
pub mod middles;

use std::sync::Arc;
use tracing::info;

use crate::sports::SportRegistry;
use crate::types::OddsSnapshot;
use arbitrage::{ArbitrageConfig, ArbitrageDetector, ArbitrageOpportunity};
use ev::{EvConfig, EvEngine, ScoredBet};
use kelly::{KellyCalculator, KellyConfig};
use middles::{MiddleConfig, MiddleDetector, MiddleOpportunity};

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Everything the detectors found in one snapshot.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub bets: Vec<ScoredBet>,
    pub arbitrage: Vec<ArbitrageOpportunity>,
    pub middles: Vec<MiddleOpportunity>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty() && self.arbitrage.is_empty() && self.middles.is_empty()
    }

    pub fn total(&self) -> usize {
        self.bets.len() + self.arbitrage.len() + self.middles.len()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the three detectors and runs them over a snapshot.
pub struct StrategyOrchestrator {
    ev: EvEngine,
    arbitrage: ArbitrageDetector,
    middles: MiddleDetector,
}

impl StrategyOrchestrator {
    pub fn new(ev: EvEngine, arbitrage: ArbitrageDetector, middles: MiddleDetector) -> Self {
        Self { ev, arbitrage, middles }
    }

    /// Build every detector from its config section over one sport registry.
    pub fn from_config(
        ev: EvConfig,
        kelly: KellyConfig,
        arbitrage: ArbitrageConfig,
        middles: MiddleConfig,
        sports: Arc<SportRegistry>,
    ) -> Self {
        Self::new(
            EvEngine::new(ev, KellyCalculator::new(kelly), Arc::clone(&sports)),
            ArbitrageDetector::new(arbitrage, Arc::clone(&sports)),
            MiddleDetector::new(middles, sports),
        )
    }

    pub fn ev(&self) -> &EvEngine {
        &self.ev
    }

    pub fn arbitrage(&self) -> &ArbitrageDetector {
        &self.arbitrage
    }

    pub fn middles(&self) -> &MiddleDetector {
        &self.middles
    }

    /// Run all three detectors. `min_ev` falls back to the configured
    /// threshold when `None`.
    pub fn analyze(&self, snapshot: &OddsSnapshot, min_ev: Option<f64>) -> Signals {
        let min_ev = min_ev.unwrap_or(self.ev.config().min_ev);
        let signals = Signals {
            bets: self.ev.find_positive_ev_bets(snapshot, min_ev),
            arbitrage: self.arbitrage.find_arbitrage(snapshot),
            middles: self.middles.find_middles(snapshot),
        };
        info!(
            sport = %snapshot.sport,
            events = snapshot.events.len(),
            bets = signals.bets.len(),
            arbitrage = signals.arbitrage.len(),
            middles = signals.middles.len(),
            "Snapshot analyzed"
        );
        signals
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
