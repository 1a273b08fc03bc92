//! Configuration loading from TOML with environment variable resolution.
//!
//! Every section is optional and falls back to its defaults, so an empty
//! file is a valid config. The upstream API key is referenced by env-var
//! name and resolved at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::cache::CacheConfig;
use crate::sports::{SportProfile, SportRegistry};
use crate::strategy::arbitrage::ArbitrageConfig;
use crate::strategy::ev::EvConfig;
use crate::strategy::kelly::KellyConfig;
use crate::strategy::middles::MiddleConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub scan: ScanConfig,
    pub cache: CacheConfig,
    pub ev: EvConfig,
    pub kelly: KellyConfig,
    pub arbitrage: ArbitrageConfig,
    pub middles: MiddleConfig,
    /// Sport profiles. Empty means the built-in set.
    pub sports: Vec<SportProfile>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub api_key_env: String,
    pub base_url: Option<String>,
    /// Bookmaker regions, comma separated (`us`, `us,uk`).
    pub regions: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_key_env: "ODDS_API_KEY".to_string(),
            base_url: None,
            regions: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub sports: Vec<String>,
    pub markets: Vec<String>,
    pub interval_secs: u64,
    /// Used to size Kelly stakes in the scan log. Stakes are skipped when absent.
    pub bankroll: Option<f64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sports: vec!["nfl".to_string(), "nba".to_string()],
            markets: vec!["h2h".to_string(), "spreads".to_string(), "totals".to_string()],
            interval_secs: 300,
            bankroll: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The configured sport profiles, or the built-in set when none are given.
    pub fn registry(&self) -> SportRegistry {
        if self.sports.is_empty() {
            SportRegistry::default()
        } else {
            SportRegistry::new(self.sports.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = assert_ok!(AppConfig::parse(""));
        assert_eq!(cfg.source.api_key_env, "ODDS_API_KEY");
        assert_eq!(cfg.scan.interval_secs, 300);
        assert_eq!(cfg.cache.event_ttl_secs, 3600);
        assert_eq!(cfg.cache.odds_ttl_secs, 300);
        assert!(cfg.sports.is_empty());
        assert!(cfg.registry().resolve("nfl").major);
    }

    #[test]
    fn test_partial_sections() {
        let cfg = AppConfig::parse(
            r#"
            [scan]
            sports = ["epl"]
            markets = ["h2h"]
            bankroll = 500.0

            [cache]
            odds_ttl_secs = 120

            [arbitrage]
            safety_buffer = 0.02
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scan.sports, vec!["epl"]);
        assert_eq!(cfg.scan.bankroll, Some(500.0));
        assert_eq!(cfg.cache.odds_ttl_secs, 120);
        assert_eq!(cfg.cache.event_ttl_secs, 3600);
        assert!((cfg.arbitrage.safety_buffer - 0.02).abs() < 1e-12);
        assert!((cfg.ev.min_ev - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_custom_sport_profiles() {
        let cfg = AppConfig::parse(
            r#"
            [[sports]]
            key = "cfl"
            source_key = "americanfootball_cfl"
            has_draws = false
            major = false
            spread_key_numbers = [{ value = 3, probability = 0.08 }]
            total_key_numbers = []
            "#,
        )
        .unwrap();
        let registry = cfg.registry();
        let cfl = registry.resolve("cfl");
        assert_eq!(cfl.source_key, "americanfootball_cfl");
        assert_eq!(cfl.spread_key_numbers.len(), 1);
        assert!(registry.by_source_key("americanfootball_nfl").is_none());
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert_err!(AppConfig::parse("[scan\nsports = 3"));
    }

    #[test]
    fn test_missing_env_is_an_error() {
        assert_err!(AppConfig::resolve_env("SHARPLINE_TEST_DEFINITELY_UNSET"));
    }
}
