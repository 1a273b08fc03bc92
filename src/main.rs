//! SHARPLINE: sportsbook odds cache and signal engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the odds feed into the tiered cache, and scans every configured
//! sport on an interval until Ctrl+C.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sharpline::cache::TieredCache;
use sharpline::clock::SystemClock;
use sharpline::config;
use sharpline::data::odds_api::OddsApiClient;
use sharpline::engine::{spawn_sweeper, OddsService, ScanReport};
use sharpline::strategy::kelly::KellyCalculator;
use sharpline::strategy::StrategyOrchestrator;
use sharpline::types::Lookup;

const BANNER: &str = r#"
 ____  _   _    _    ____  ____  _     ___ _   _ _____
/ ___|| | | |  / \  |  _ \|  _ \| |   |_ _| \ | | ____|
\___ \| |_| | / _ \ | |_) | |_) | |    | ||  \| |  _|
 ___) |  _  |/ ___ \|  _ <|  __/| |___ | || |\  | |___
|____/|_| |_/_/   \_\_| \_\_|   |_____|___|_| \_|_____|

  Odds cache, no-vig EV, arbitrage and middles
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        sports = ?cfg.scan.sports,
        markets = ?cfg.scan.markets,
        interval_secs = cfg.scan.interval_secs,
        "SHARPLINE starting up"
    );

    // -- Initialise components -------------------------------------------

    let api_key = config::AppConfig::resolve_env(&cfg.source.api_key_env)
        .context("The odds feed needs an API key")?;
    let source = OddsApiClient::new(
        SecretString::new(api_key),
        cfg.source.base_url.clone(),
        cfg.source.regions.clone(),
        Duration::from_secs(cfg.cache.fetch_timeout_secs),
    )?;

    let sports = Arc::new(cfg.registry());
    let cache = Arc::new(TieredCache::new(
        cfg.cache.clone(),
        Arc::new(source),
        Arc::new(SystemClock),
    ));
    let strategy = StrategyOrchestrator::from_config(
        cfg.ev.clone(),
        cfg.kelly.clone(),
        cfg.arbitrage.clone(),
        cfg.middles.clone(),
        Arc::clone(&sports),
    );
    let service = OddsService::new(Arc::clone(&cache), sports, strategy);

    let sweeper = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(cfg.cache.sweep_interval_secs));
    let bankroll = cfg.scan.bankroll.and_then(Decimal::from_f64_retain);

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.scan.interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scan.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for sport in &cfg.scan.sports {
                    match service.scan(sport, &cfg.scan.markets).await {
                        Lookup::Found(report) => {
                            log_scan_report(&report, service.strategy().ev().kelly(), bankroll);
                        }
                        Lookup::NoData { sport, reason } => {
                            warn!(sport = %sport, reason = %reason, "No data for sport");
                        }
                    }
                }
                info!(stats = %service.get_cache_statistics().await, "Cycle complete");
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    sweeper.abort();
    info!(stats = %service.get_cache_statistics().await, "SHARPLINE shut down cleanly.");
    Ok(())
}

/// Log every signal in a scan report.
fn log_scan_report(report: &ScanReport, kelly: &KellyCalculator, bankroll: Option<Decimal>) {
    for bet in &report.signals.bets {
        let stake = bankroll.and_then(|b| kelly.stake(bet, b));
        info!(sport = %report.sport, stake = ?stake, "+EV {bet}");
    }
    for arb in &report.signals.arbitrage {
        info!(sport = %report.sport, profit = %arb.guaranteed_profit, "ARB {arb}");
    }
    for middle in &report.signals.middles {
        info!(sport = %report.sport, "MIDDLE {middle}");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharpline=info"));

    let json_logging = std::env::var("SHARPLINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
