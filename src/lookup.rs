//! External corporate-action reference data
//!
//! Split/reverse-split factors and the per-share prices of subscription-type
//! credits are not always present in the B3 export, so the engine asks an
//! injected [`EventInfoProvider`]. `None` always means "unavailable", never
//! an error; the ledger degrades to a zero-cost credit or drops the event.
//!
//! [`StaticEventInfoProvider`] ships a small table extracted from
//! statusinvest.com.br. The data is static and may become outdated; manual
//! updates are required.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::events::EventKind;

/// Days searched around the requested date when no exact entry exists.
/// Portal and reference-site announcement dates routinely disagree by a
/// few days.
const SEARCH_WINDOW_DAYS: i64 = 20;

/// Injected capability answering the two reference queries the ledger needs.
pub trait EventInfoProvider {
    /// Corporate-action multiplier for a split/reverse-split.
    fn event_factor(&self, ticker: &str, kind: &EventKind, date: NaiveDate) -> Option<f64>;

    /// Cost basis per share for adjustment/subscription-type credits.
    fn special_event_average_price(
        &self,
        ticker: &str,
        kind: &EventKind,
        date: NaiveDate,
    ) -> Option<f64>;
}

/// Provider that knows nothing. Useful in tests and for assets with no
/// corporate actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventInfoProvider;

impl EventInfoProvider for NullEventInfoProvider {
    fn event_factor(&self, _ticker: &str, _kind: &EventKind, _date: NaiveDate) -> Option<f64> {
        None
    }

    fn special_event_average_price(
        &self,
        _ticker: &str,
        _kind: &EventKind,
        _date: NaiveDate,
    ) -> Option<f64> {
        None
    }
}

/// A user-supplied reference row for [`StaticEventInfoProvider`].
#[derive(Debug, Clone)]
pub struct EventInfoEntry {
    pub ticker: String,
    pub kind: EventKind,
    pub date: NaiveDate,
    pub factor: Option<f64>,
    pub average_price: Option<f64>,
}

fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Key format: TICKERLETTERS-event-kind-YYYYMMDD. Digits are dropped from
/// the ticker so ITSA3/ITSA4/ITSA2 rights all resolve to the same company.
fn normalize_key(ticker: &str, kind: &EventKind, date: NaiveDate) -> String {
    let ticker_letters: String = ticker
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    let kind_slug = strip_accents(kind.label())
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    format!("{}-{}-{}", ticker_letters, kind_slug, date.format("%Y%m%d"))
}

// Factors extracted from https://statusinvest.com.br/carteira/configuracao
// (grupamentos / desdobramentos). Dates already shifted to the B3 portal's
// movement dates.
static SEED_FACTORS: Lazy<Vec<(&str, EventKind, NaiveDate, f64)>> = Lazy::new(|| {
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).expect("seed date");
    vec![
        ("WEGE3", EventKind::Split, d(2021, 4, 29), 2.0),
        ("VINO11", EventKind::Split, d(2023, 8, 8), 5.0),
        ("GGRC11", EventKind::Split, d(2024, 3, 7), 10.0),
        ("BCFF11", EventKind::Split, d(2023, 11, 30), 8.0),
        ("BBAS3", EventKind::Split, d(2024, 4, 17), 2.0),
    ]
});

// Per-share prices for subscription-type credits, keyed the same way.
// A zero price is a deliberate entry: the event only renamed the asset.
static SEED_AVERAGE_PRICES: Lazy<Vec<(&str, EventKind, NaiveDate, f64)>> = Lazy::new(|| {
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).expect("seed date");
    let cession = EventKind::CessionRequested;
    vec![
        ("BTHF11", EventKind::Adjustment, d(2024, 12, 13), 10.75165746),
        ("BCFF11", EventKind::Adjustment, d(2024, 12, 13), 0.0),
        ("ISAE4", EventKind::Adjustment, d(2024, 11, 19), 0.0),
        ("TRBL11", EventKind::Adjustment, d(2023, 7, 5), 0.0),
        ("HFOF12", cession.clone(), d(2025, 1, 21), 70.13),
        ("GGRC12", cession.clone(), d(2024, 10, 3), 11.31),
        ("MXRF12", cession.clone(), d(2024, 6, 27), 10.07),
        ("HSML12", cession.clone(), d(2024, 6, 4), 97.76),
        ("GGRC12", cession.clone(), d(2024, 4, 25), 11.25),
        ("HSML12", cession.clone(), d(2024, 1, 18), 94.34),
        ("MXRF12", cession.clone(), d(2023, 12, 12), 10.29),
        ("VISC12", cession.clone(), d(2023, 11, 29), 117.47),
        ("TRBL12", cession.clone(), d(2023, 11, 24), 97.84),
        ("GGRC12", cession.clone(), d(2023, 9, 1), 115.50),
        ("HFOF12", cession.clone(), d(2023, 8, 31), 83.91),
        ("MXRF12", cession.clone(), d(2023, 7, 11), 10.36),
        ("HFOF12", cession.clone(), d(2023, 5, 8), 75.33),
        ("GGRC12", cession.clone(), d(2022, 12, 1), 114.50),
        ("HFOF12", cession.clone(), d(2022, 11, 1), 86.97),
        ("VISC12", cession.clone(), d(2022, 10, 19), 115.76),
        ("VINO12", cession.clone(), d(2022, 1, 14), 55.14),
        ("GGRC12", cession.clone(), d(2021, 10, 28), 110.00),
        ("BCFF12", cession, d(2021, 3, 31), 84.39),
    ]
});

/// In-memory provider backed by normalized-key maps with a dated-window
/// search.
#[derive(Debug, Clone)]
pub struct StaticEventInfoProvider {
    factors: HashMap<String, f64>,
    average_prices: HashMap<String, f64>,
}

impl StaticEventInfoProvider {
    /// Provider seeded with the bundled reference table.
    pub fn new() -> Self {
        let factors = SEED_FACTORS
            .iter()
            .map(|(ticker, kind, date, factor)| (normalize_key(ticker, kind, *date), *factor))
            .collect();
        let average_prices = SEED_AVERAGE_PRICES
            .iter()
            .map(|(ticker, kind, date, price)| (normalize_key(ticker, kind, *date), *price))
            .collect();

        Self {
            factors,
            average_prices,
        }
    }

    /// Seeded provider extended with caller-supplied rows. Caller rows win
    /// on key collision.
    pub fn with_entries(entries: impl IntoIterator<Item = EventInfoEntry>) -> Self {
        let mut provider = Self::new();
        for entry in entries {
            let key = normalize_key(&entry.ticker, &entry.kind, entry.date);
            if let Some(factor) = entry.factor {
                provider.factors.insert(key.clone(), factor);
            }
            if let Some(price) = entry.average_price {
                provider.average_prices.insert(key, price);
            }
        }
        provider
    }

    /// Exact date first, then nearest-first within the window: +1, -1, +2,
    /// -2, ... days.
    fn search(
        map: &HashMap<String, f64>,
        ticker: &str,
        kind: &EventKind,
        date: NaiveDate,
    ) -> Option<f64> {
        if let Some(hit) = map.get(&normalize_key(ticker, kind, date)) {
            return Some(*hit);
        }

        for offset in 1..=SEARCH_WINDOW_DAYS {
            let after = date + Duration::days(offset);
            if let Some(hit) = map.get(&normalize_key(ticker, kind, after)) {
                return Some(*hit);
            }
            let before = date - Duration::days(offset);
            if let Some(hit) = map.get(&normalize_key(ticker, kind, before)) {
                return Some(*hit);
            }
        }

        None
    }
}

impl Default for StaticEventInfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EventInfoProvider for StaticEventInfoProvider {
    fn event_factor(&self, ticker: &str, kind: &EventKind, date: NaiveDate) -> Option<f64> {
        Self::search(&self.factors, ticker, kind, date)
    }

    fn special_event_average_price(
        &self,
        ticker: &str,
        kind: &EventKind,
        date: NaiveDate,
    ) -> Option<f64> {
        Self::search(&self.average_prices, ticker, kind, date)
    }
}
