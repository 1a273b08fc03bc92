//! Kelly stake sizing.
//!
//! The engine's fraction is a simplified Kelly: expected value scaled by
//! confidence, clamped to a hard cap of the bankroll. Stakes come out as
//! `Decimal` rounded to cents.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use super::ev::ScoredBet;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Maximum bet as a fraction of bankroll.
    pub max_fraction: f64,
    /// Minimum stake in dollars (below this, don't bother).
    pub min_stake: Decimal,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            max_fraction: 0.05, // Max 5% of bankroll per bet
            min_stake: dec!(1.00),
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly calculator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KellyCalculator {
    config: KellyConfig,
}

impl Default for KellyCalculator {
    fn default() -> Self {
        Self::new(KellyConfig::default())
    }
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Fraction of bankroll to stake: `ev × confidence`, clamped to
    /// `[0, max_fraction]`. Non-finite inputs size to zero.
    pub fn fraction(&self, ev: f64, confidence: f64) -> f64 {
        let raw = ev * confidence;
        if !raw.is_finite() {
            return 0.0;
        }
        raw.clamp(0.0, self.config.max_fraction)
    }

    /// Dollar stake for a scored bet, or `None` when it rounds below the
    /// minimum.
    pub fn stake(&self, bet: &ScoredBet, bankroll: Decimal) -> Option<Decimal> {
        if bankroll <= Decimal::ZERO || bet.kelly_fraction <= 0.0 {
            return None;
        }
        let fraction = Decimal::from_f64(bet.kelly_fraction)?;
        let stake = (bankroll * fraction).round_dp(2);

        if stake < self.config.min_stake {
            debug!(
                selection = %bet.candidate.outcome.name,
                %stake,
                min = %self.config.min_stake,
                "Stake below minimum"
            );
            return None;
        }
        Some(stake)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ev::tests::make_scored;

    #[test]
    fn test_fraction_is_ev_times_confidence() {
        let calc = KellyCalculator::default();
        assert!((calc.fraction(0.04, 0.8) - 0.032).abs() < 1e-12);
    }

    #[test]
    fn test_fraction_capped_at_max() {
        let calc = KellyCalculator::default();
        assert_eq!(calc.fraction(0.50, 0.9), 0.05);
    }

    #[test]
    fn test_negative_ev_sizes_to_zero() {
        let calc = KellyCalculator::default();
        assert_eq!(calc.fraction(-0.10, 0.8), 0.0);
        assert_eq!(calc.fraction(f64::NAN, 0.8), 0.0);
    }

    #[test]
    fn test_stake_rounded_to_cents() {
        let calc = KellyCalculator::default();
        let bet = make_scored(0.0333);
        assert_eq!(calc.stake(&bet, dec!(1000)), Some(dec!(33.30)));
    }

    #[test]
    fn test_stake_below_minimum() {
        let calc = KellyCalculator::new(KellyConfig {
            min_stake: dec!(5.00),
            ..Default::default()
        });
        let bet = make_scored(0.02);
        assert_eq!(calc.stake(&bet, dec!(100)), None);
    }

    #[test]
    fn test_zero_bankroll() {
        let calc = KellyCalculator::default();
        assert_eq!(calc.stake(&make_scored(0.03), Decimal::ZERO), None);
    }
}
