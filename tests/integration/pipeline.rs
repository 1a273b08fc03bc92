//! Full pipeline: feed → tiered cache → detectors, through `OddsService`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;
use std::sync::Arc;

use sharpline::cache::{CacheConfig, TieredCache};
use sharpline::clock::ManualClock;
use sharpline::engine::OddsService;
use sharpline::sports::SportRegistry;
use sharpline::strategy::arbitrage::ArbitrageConfig;
use sharpline::strategy::ev::EvConfig;
use sharpline::strategy::kelly::KellyConfig;
use sharpline::strategy::middles::MiddleConfig;
use sharpline::strategy::StrategyOrchestrator;
use sharpline::types::{Lookup, MarketKind, NoDataReason};

use crate::mock_source::{book, event, market, outcome, prop, ScriptedSource};

const NFL: &str = "americanfootball_nfl";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
}

fn markets(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

struct Harness {
    source: ScriptedSource,
    clock: Arc<ManualClock>,
    cache: Arc<TieredCache>,
    service: OddsService,
}

fn make_harness() -> Harness {
    let source = ScriptedSource::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let sports = Arc::new(SportRegistry::default());
    let cache = Arc::new(TieredCache::new(
        CacheConfig::default(),
        Arc::new(source.clone()),
        clock.clone(),
    ));
    let strategy = StrategyOrchestrator::from_config(
        EvConfig::default(),
        KellyConfig::default(),
        ArbitrageConfig::default(),
        MiddleConfig::default(),
        Arc::clone(&sports),
    );
    let service = OddsService::new(Arc::clone(&cache), sports, strategy);
    Harness { source, clock, cache, service }
}

/// Chiefs vs Bills with a cross-book moneyline arbitrage and a spread
/// middle around the key number 3.
fn chiefs_bills(chiefs_ml_a: f64) -> Vec<sharpline::data::RawEvent> {
    vec![event(
        "kc-buf",
        NFL,
        "Chiefs",
        "Bills",
        t0() + Duration::days(2),
        vec![
            book(
                "fanduel",
                vec![
                    market("h2h", vec![outcome("Chiefs", chiefs_ml_a, None), outcome("Bills", 120.0, None)]),
                    market(
                        "spreads",
                        vec![outcome("Chiefs", -110.0, Some(-2.5)), outcome("Bills", -110.0, Some(2.5))],
                    ),
                    market(
                        "player_pass_yds",
                        vec![
                            prop("Patrick Mahomes", "Over", -115.0, 265.5),
                            prop("Patrick Mahomes", "Under", -105.0, 265.5),
                        ],
                    ),
                ],
            ),
            book(
                "draftkings",
                vec![
                    market("h2h", vec![outcome("Chiefs", 115.0, None), outcome("Bills", -135.0, None)]),
                    market(
                        "spreads",
                        vec![outcome("Chiefs", -110.0, Some(-3.5)), outcome("Bills", -110.0, Some(3.5))],
                    ),
                ],
            ),
        ],
    )]
}

#[tokio::test]
async fn test_scan_finds_arbitrage_and_middle() {
    let h = make_harness();
    h.source.set_events(NFL, chiefs_bills(-110.0));

    let report = h
        .service
        .scan("nfl", &markets(&["h2h", "spreads"]))
        .await
        .found()
        .expect("scan should find odds");

    assert_eq!(report.source_key, NFL);
    assert_eq!(report.events, 1);
    assert_eq!(report.rows, 2);

    assert_eq!(report.signals.arbitrage.len(), 1);
    let arb = &report.signals.arbitrage[0];
    assert_eq!(arb.kind, MarketKind::Moneyline);
    assert!(arb.arbitrage_index < 1.0);
    let books: Vec<&str> = arb.legs.iter().map(|l| l.book.as_str()).collect();
    assert!(books.contains(&"fanduel") && books.contains(&"draftkings"));

    assert_eq!(report.signals.middles.len(), 1);
    let middle = &report.signals.middles[0];
    assert_eq!(middle.kind, MarketKind::Spread);
    assert_eq!(middle.key_numbers, vec![3]);
    assert!((middle.window_low - 2.5).abs() < 1e-9);
    assert!((middle.window_high - 3.5).abs() < 1e-9);
    assert!(middle.expected_value > 0.0);
}

#[tokio::test]
async fn test_unknown_sport_reports_no_events() {
    let h = make_harness();
    let result = h.service.get_cached_events("cricket_ipl").await;
    assert_eq!(
        result,
        Lookup::NoData { sport: "cricket_ipl".into(), reason: NoDataReason::NoEvents }
    );
}

#[tokio::test]
async fn test_concurrent_misses_share_one_upstream_call() {
    let h = make_harness();
    h.source.set_events(NFL, chiefs_bills(-110.0));
    h.source.set_latency(std::time::Duration::from_millis(50));

    let results = join_all((0..8).map(|_| h.cache.get_events(NFL))).await;

    assert_eq!(h.source.event_calls(), 1);
    assert!(results.iter().all(|events| events.len() == 1));
    let stats = h.cache.stats().await;
    assert_eq!(stats.event_misses, 8);
    assert_eq!(stats.coalesced_waits, 7);
}

#[tokio::test]
async fn test_rejected_props_fall_back_to_core_markets() {
    let h = make_harness();
    h.source.set_events(NFL, chiefs_bills(-110.0));
    h.source.reject_props();

    let snapshot = h
        .service
        .get_cached_odds("nfl", &markets(&["h2h", "player_pass_yds"]))
        .await
        .found()
        .expect("core markets should still be served");

    assert_eq!(
        h.source.odds_requests(),
        vec![markets(&["h2h", "player_pass_yds"]), markets(&["h2h"])]
    );
    let keys = snapshot.events[0].market_keys();
    assert_eq!(keys, vec!["h2h".to_string()]);
}

#[tokio::test]
async fn test_failed_refresh_serves_stale_odds() {
    let h = make_harness();
    h.source.set_events(NFL, chiefs_bills(-110.0));
    let first = h.service.get_cached_odds("nfl", &markets(&["h2h"])).await.found().unwrap();

    h.source.set_error("HTTP 503");
    h.clock.advance(Duration::minutes(10));

    let second = h.service.get_cached_odds("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(second.events, first.events);

    let stats = h.service.get_cache_statistics().await;
    assert_eq!(stats.stale_served, 1);
    assert_eq!(stats.upstream_failures, 1);

    h.source.clear_error();
    h.clock.advance(Duration::minutes(10));
    h.service.get_cached_odds("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(h.service.get_cache_statistics().await.stale_served, 1);
}

#[tokio::test]
async fn test_served_odds_keep_their_capture_time() {
    let h = make_harness();
    h.source.set_events(NFL, chiefs_bills(-110.0));
    let first = h.service.get_cached_odds("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(first.captured_at, t0());

    // Cache hit inside the TTL.
    h.clock.advance(Duration::minutes(3));
    let cached = h.service.get_cached_odds("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(cached.captured_at, t0());

    // Stale serve after a failed refresh.
    h.source.set_error("HTTP 503");
    h.clock.advance(Duration::minutes(47));
    let report = h.service.scan("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(report.captured_at, t0());
    assert_eq!(report.scanned_at, t0() + Duration::minutes(50));
    assert_eq!(report.signals.arbitrage.len(), 1);
    assert_eq!(report.signals.arbitrage[0].detected_at, t0());
    assert_eq!(h.service.get_cache_statistics().await.stale_served, 1);

    // A successful refresh moves the capture time forward.
    h.source.clear_error();
    h.clock.advance(Duration::minutes(1));
    let fresh = h.service.get_cached_odds("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(fresh.captured_at, t0() + Duration::minutes(51));
}

#[tokio::test]
async fn test_price_changes_are_tracked_as_movements() {
    let h = make_harness();
    h.source.set_events(NFL, chiefs_bills(-110.0));
    h.service.scan("nfl", &markets(&["h2h"])).await;
    assert!(h.service.get_movements("nfl").await.is_empty());
    assert!(h.service.get_trend_summary("nfl").await.is_none());

    h.source.set_events(NFL, chiefs_bills(-130.0));
    h.clock.advance(Duration::minutes(6));
    let report = h.service.scan("nfl", &markets(&["h2h"])).await.found().unwrap();
    assert_eq!(report.movements, 1);

    let movements = h.service.get_movements("nfl").await;
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].book, "fanduel");
    assert_eq!(movements[0].selection, "Chiefs");

    let trends = h.service.get_trend_summary("nfl").await.expect("two snapshots recorded");
    assert_eq!(trends.snapshots_recorded, 2);
    assert!(!trends.books.is_empty());
}
