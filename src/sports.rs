//! Sport registry.
//!
//! Maps the short sport names callers use (`nfl`, `epl`) onto upstream
//! source keys, and carries the per-sport facts the detectors need:
//! whether draws exist, whether the league is a major (efficient) one,
//! and the key-number tables used to price middles.

use serde::Deserialize;

use crate::types::MarketKind;

/// A final margin/total that lands disproportionately often.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct KeyNumber {
    pub value: u32,
    /// Probability the result lands exactly on this number.
    pub probability: f64,
}

const fn key(value: u32, probability: f64) -> KeyNumber {
    KeyNumber { value, probability }
}

/// Everything the engine knows about one sport.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SportProfile {
    /// Short name used by callers, e.g. `nfl`.
    pub key: String,
    /// Upstream feed key, e.g. `americanfootball_nfl`.
    pub source_key: String,
    #[serde(default)]
    pub has_draws: bool,
    #[serde(default)]
    pub major: bool,
    #[serde(default)]
    pub spread_key_numbers: Vec<KeyNumber>,
    #[serde(default)]
    pub total_key_numbers: Vec<KeyNumber>,
}

impl SportProfile {
    /// Profile for a source key nobody registered. Soccer feeds carry draws.
    pub fn fallback(source_key: &str) -> Self {
        Self {
            key: source_key.to_string(),
            source_key: source_key.to_string(),
            has_draws: source_key.starts_with("soccer"),
            major: false,
            spread_key_numbers: Vec::new(),
            total_key_numbers: Vec::new(),
        }
    }

    /// Key-number table for a market kind (empty for moneyline).
    pub fn key_numbers(&self, kind: MarketKind) -> &[KeyNumber] {
        match kind {
            MarketKind::Spread => &self.spread_key_numbers,
            MarketKind::Total => &self.total_key_numbers,
            _ => &[],
        }
    }

    /// Exact-landing probability for `value`, if it is a key number.
    pub fn key_probability(&self, kind: MarketKind, value: u32) -> Option<f64> {
        self.key_numbers(kind)
            .iter()
            .find(|k| k.value == value)
            .map(|k| k.probability)
    }
}

/// Lookup over the configured sport profiles.
#[derive(Debug, Clone)]
pub struct SportRegistry {
    profiles: Vec<SportProfile>,
}

impl Default for SportRegistry {
    fn default() -> Self {
        Self::new(default_profiles())
    }
}

impl SportRegistry {
    pub fn new(profiles: Vec<SportProfile>) -> Self {
        Self { profiles }
    }

    /// Resolve a caller-facing name or a source key.
    pub fn resolve(&self, sport: &str) -> SportProfile {
        let needle = sport.to_ascii_lowercase();
        self.profiles
            .iter()
            .find(|p| p.key == needle || p.source_key == needle)
            .cloned()
            .unwrap_or_else(|| SportProfile::fallback(&needle))
    }

    /// Profile for a source key without cloning when registered.
    pub fn by_source_key(&self, source_key: &str) -> Option<&SportProfile> {
        self.profiles.iter().find(|p| p.source_key == source_key)
    }

    pub fn has_draws(&self, source_key: &str) -> bool {
        self.by_source_key(source_key)
            .map(|p| p.has_draws)
            .unwrap_or_else(|| source_key.starts_with("soccer"))
    }

    pub fn is_major(&self, source_key: &str) -> bool {
        self.by_source_key(source_key).map(|p| p.major).unwrap_or(false)
    }

    pub fn profiles(&self) -> &[SportProfile] {
        &self.profiles
    }
}

/// Built-in profiles. Hit probabilities are empirical tuning defaults.
pub fn default_profiles() -> Vec<SportProfile> {
    let football_spreads = vec![
        key(3, 0.09),
        key(7, 0.075),
        key(10, 0.06),
        key(14, 0.06),
        key(6, 0.06),
        key(4, 0.06),
    ];
    let football_totals = vec![
        key(37, 0.06),
        key(41, 0.06),
        key(43, 0.06),
        key(44, 0.06),
        key(47, 0.06),
        key(51, 0.06),
    ];

    vec![
        SportProfile {
            key: "nfl".into(),
            source_key: "americanfootball_nfl".into(),
            has_draws: false,
            major: true,
            spread_key_numbers: football_spreads.clone(),
            total_key_numbers: football_totals.clone(),
        },
        SportProfile {
            key: "ncaaf".into(),
            source_key: "americanfootball_ncaaf".into(),
            has_draws: false,
            major: false,
            spread_key_numbers: football_spreads,
            total_key_numbers: football_totals,
        },
        SportProfile {
            key: "nba".into(),
            source_key: "basketball_nba".into(),
            has_draws: false,
            major: true,
            spread_key_numbers: vec![key(5, 0.06), key(7, 0.06), key(3, 0.06)],
            total_key_numbers: Vec::new(),
        },
        SportProfile {
            key: "ncaab".into(),
            source_key: "basketball_ncaab".into(),
            has_draws: false,
            major: false,
            spread_key_numbers: vec![key(5, 0.06), key(7, 0.06)],
            total_key_numbers: Vec::new(),
        },
        SportProfile {
            key: "mlb".into(),
            source_key: "baseball_mlb".into(),
            has_draws: false,
            major: true,
            spread_key_numbers: vec![key(1, 0.08), key(2, 0.07)],
            total_key_numbers: vec![key(7, 0.09), key(8, 0.08), key(9, 0.07)],
        },
        SportProfile {
            key: "nhl".into(),
            source_key: "icehockey_nhl".into(),
            has_draws: false,
            major: true,
            spread_key_numbers: vec![key(1, 0.09), key(2, 0.07)],
            total_key_numbers: vec![key(5, 0.09), key(6, 0.08), key(7, 0.07)],
        },
        SportProfile {
            key: "epl".into(),
            source_key: "soccer_epl".into(),
            has_draws: true,
            major: true,
            spread_key_numbers: vec![key(1, 0.09)],
            total_key_numbers: vec![key(2, 0.09), key(3, 0.08)],
        },
        SportProfile {
            key: "mls".into(),
            source_key: "soccer_usa_mls".into(),
            has_draws: true,
            major: false,
            spread_key_numbers: vec![key(1, 0.09)],
            total_key_numbers: vec![key(2, 0.09), key(3, 0.08)],
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
