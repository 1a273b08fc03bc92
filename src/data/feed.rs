//! Validation of raw feed payloads.
//!
//! Anything missing a field we depend on is dropped here, one unit at a
//! time (event, book, market, outcome), and the rest carries on.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{RawBookmaker, RawEvent, RawMarket, RawOutcome};
use crate::types::{Book, BookMarket, Event, EventOdds, MarketKind, Outcome};

/// Count of units dropped while parsing one payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Skipped {
    pub events: usize,
    pub books: usize,
    pub markets: usize,
    pub outcomes: usize,
}

impl Skipped {
    pub fn total(&self) -> usize {
        self.events + self.books + self.markets + self.outcomes
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

struct EventHeader<'a> {
    id: &'a str,
    home: &'a str,
    away: &'a str,
    commence: DateTime<Utc>,
}

fn event_header(raw: &RawEvent) -> Option<EventHeader<'_>> {
    Some(EventHeader {
        id: non_empty(&raw.id)?,
        home: non_empty(&raw.home_team)?,
        away: non_empty(&raw.away_team)?,
        commence: parse_time(raw.commence_time.as_deref())?,
    })
}

/// Parse a schedule payload into events.
pub fn parse_events(source_key: &str, raw: &[RawEvent], cached_at: DateTime<Utc>) -> Vec<Event> {
    let mut skipped = 0usize;
    let events: Vec<Event> = raw
        .iter()
        .filter_map(|r| match event_header(r) {
            Some(h) => Some(Event {
                id: h.id.to_string(),
                sport_key: non_empty(&r.sport_key).unwrap_or(source_key).to_string(),
                home_team: h.home.to_string(),
                away_team: h.away.to_string(),
                commence_time: h.commence,
                cached_at,
            }),
            None => {
                skipped += 1;
                debug!(source_key, id = ?r.id, "Skipping event with missing fields");
                None
            }
        })
        .collect();

    if skipped > 0 {
        warn!(source_key, skipped, kept = events.len(), "Malformed events dropped");
    }
    events
}

/// Parse an odds payload into rows tagged with `source_key`.
///
/// Rows are tagged with the key they were fetched under, not the
/// event's own `sport_key`, so they can be re-filtered later.
pub fn parse_odds(source_key: &str, raw: &[RawEvent]) -> (Vec<EventOdds>, Skipped) {
    let mut skipped = Skipped::default();
    let mut rows = Vec::with_capacity(raw.len());

    for r in raw {
        let Some(h) = event_header(r) else {
            skipped.events += 1;
            debug!(source_key, id = ?r.id, "Skipping odds row with missing fields");
            continue;
        };
        let books = r
            .bookmakers
            .iter()
            .filter_map(|b| parse_book(b, &mut skipped))
            .collect();
        rows.push(EventOdds {
            event_id: h.id.to_string(),
            source_key: source_key.to_string(),
            home_team: h.home.to_string(),
            away_team: h.away.to_string(),
            commence_time: h.commence,
            books,
        });
    }

    if skipped.total() > 0 {
        warn!(
            source_key,
            events = skipped.events,
            books = skipped.books,
            markets = skipped.markets,
            outcomes = skipped.outcomes,
            "Malformed odds units dropped"
        );
    }
    (rows, skipped)
}

fn parse_book(raw: &RawBookmaker, skipped: &mut Skipped) -> Option<Book> {
    let Some(key) = non_empty(&raw.key) else {
        skipped.books += 1;
        return None;
    };
    let markets: Vec<BookMarket> = raw
        .markets
        .iter()
        .filter_map(|m| parse_market(m, parse_time(raw.last_update.as_deref()), skipped))
        .collect();
    if markets.is_empty() {
        skipped.books += 1;
        debug!(book = key, "Skipping book with no usable markets");
        return None;
    }
    Some(Book {
        key: key.to_string(),
        title: non_empty(&raw.title).unwrap_or(key).to_string(),
        markets,
    })
}

fn parse_market(
    raw: &RawMarket,
    book_update: Option<DateTime<Utc>>,
    skipped: &mut Skipped,
) -> Option<BookMarket> {
    let key = non_empty(&raw.key);
    let Some((key, kind)) = key.and_then(|k| MarketKind::from_key(k).map(|kind| (k, kind))) else {
        skipped.markets += 1;
        debug!(market = ?raw.key, "Skipping unknown market");
        return None;
    };
    let outcomes: Vec<Outcome> = raw
        .outcomes
        .iter()
        .filter_map(|o| {
            let parsed = parse_outcome(o, kind);
            if parsed.is_none() {
                skipped.outcomes += 1;
            }
            parsed
        })
        .collect();
    if outcomes.is_empty() {
        skipped.markets += 1;
        return None;
    }
    Some(BookMarket {
        key: key.to_string(),
        kind,
        last_update: parse_time(raw.last_update.as_deref()).or(book_update),
        outcomes,
    })
}

fn parse_outcome(raw: &RawOutcome, kind: MarketKind) -> Option<Outcome> {
    let name = non_empty(&raw.name)?;
    let price = raw.price.filter(|p| p.is_finite())?;
    if kind.has_line() && raw.point.is_none() {
        return None;
    }
    let description = non_empty(&raw.description).map(str::to_string);
    Some(Outcome::from_american(name, description, raw.point, price))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, price: Option<f64>, point: Option<f64>) -> RawOutcome {
        RawOutcome {
            name: Some(name.into()),
            description: None,
            price,
            point,
        }
    }

    fn raw_event() -> RawEvent {
        RawEvent {
            id: Some("evt-1".into()),
            sport_key: Some("americanfootball_nfl".into()),
            commence_time: Some("2026-10-25T17:00:00Z".into()),
            home_team: Some("Buffalo Bills".into()),
            away_team: Some("Miami Dolphins".into()),
            bookmakers: vec![RawBookmaker {
                key: Some("draftkings".into()),
                title: Some("DraftKings".into()),
                last_update: Some("2026-10-20T12:00:00Z".into()),
                markets: vec![
                    RawMarket {
                        key: Some("h2h".into()),
                        last_update: None,
                        outcomes: vec![
                            outcome("Buffalo Bills", Some(-180.0), None),
                            outcome("Miami Dolphins", Some(155.0), None),
                        ],
                    },
                    RawMarket {
                        key: Some("spreads".into()),
                        last_update: None,
                        outcomes: vec![
                            outcome("Buffalo Bills", Some(-110.0), Some(-3.5)),
                            // spread without a line is unusable
                            outcome("Miami Dolphins", Some(-110.0), None),
                        ],
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_parse_events_skips_incomplete() {
        let mut bad = raw_event();
        bad.home_team = None;
        let now = Utc::now();
        let events = parse_events("americanfootball_nfl", &[raw_event(), bad], now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].home_team, "Buffalo Bills");
        assert_eq!(events[0].cached_at, now);
    }

    #[test]
    fn test_parse_events_bad_timestamp() {
        let mut bad = raw_event();
        bad.commence_time = Some("next sunday".into());
        assert!(parse_events("x", &[bad], Utc::now()).is_empty());
    }

    #[test]
    fn test_parse_odds_tags_source_key() {
        let (rows, _) = parse_odds("americanfootball_nfl", &[raw_event()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_key, "americanfootball_nfl");
        let book = &rows[0].books[0];
        assert_eq!(book.title, "DraftKings");
        assert!(book.markets[0].last_update.is_some());
    }

    #[test]
    fn test_parse_odds_drops_malformed_units() {
        let mut ev = raw_event();
        ev.bookmakers[0].markets.push(RawMarket {
            key: Some("outrights".into()),
            last_update: None,
            outcomes: vec![outcome("Bills", Some(500.0), None)],
        });
        ev.bookmakers[0].markets[0].outcomes.push(outcome("Tie", None, None));
        ev.bookmakers.push(RawBookmaker::default());

        let (rows, skipped) = parse_odds("americanfootball_nfl", &[ev]);
        let book = &rows[0].books[0];
        assert_eq!(book.markets.len(), 2);
        assert_eq!(book.markets[0].outcomes.len(), 2);
        assert_eq!(book.markets[1].outcomes.len(), 1);
        assert_eq!(skipped.markets, 1);
        assert_eq!(skipped.outcomes, 2);
        assert_eq!(skipped.books, 1);
    }

    #[test]
    fn test_zero_price_survives_as_neutral() {
        let mut ev = raw_event();
        ev.bookmakers[0].markets[0].outcomes[0].price = Some(0.0);
        let (rows, _) = parse_odds("americanfootball_nfl", &[ev]);
        let o = &rows[0].books[0].markets[0].outcomes[0];
        assert_eq!(o.decimal, 2.0);
    }
}
