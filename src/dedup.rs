//! Duplicate corporate-action suppression
//!
//! The B3 portal is known to emit the same adjustment or subscription event
//! twice, days apart, in different exports. Repeats of the same
//! (asset, kind, quantity) inside a day-window are dropped before the
//! ledger. State is owned by the suppressor instance, one per engine run.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::events::{EventKind, NormalizedEvent};

/// Default suppression window, inclusive.
pub const DEFAULT_WINDOW_DAYS: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventKey {
    asset_code: String,
    kind: EventKind,
    // Bit pattern of the quantity; duplicates repeat the exact value, so
    // exact equality is the right match.
    quantity_bits: u64,
}

impl EventKey {
    fn of(event: &NormalizedEvent) -> Self {
        Self {
            asset_code: event.asset_code.clone().unwrap_or_default(),
            kind: event.kind.clone(),
            quantity_bits: event.quantity.to_bits(),
        }
    }
}

/// Tracks the last date each duplicate-prone key was seen.
#[derive(Debug)]
pub struct DuplicateSuppressor {
    window_days: i64,
    last_seen: HashMap<EventKey, NaiveDate>,
}

impl DuplicateSuppressor {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days,
            last_seen: HashMap::new(),
        }
    }

    fn is_duplicate_prone(kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::Adjustment
                | EventKind::SubscriptionExercised
                | EventKind::CessionRequested
        )
    }

    /// Decide whether an event survives. Expects events in sequencer order.
    ///
    /// The last-seen date is updated for every matching event, accepted or
    /// suppressed, so a chain of near-duplicates collapses onto its head
    /// instead of each link comparing only to the original.
    pub fn admit(&mut self, event: &NormalizedEvent) -> bool {
        if !Self::is_duplicate_prone(&event.kind) {
            return true;
        }

        let key = EventKey::of(event);
        let suppressed = self
            .last_seen
            .get(&key)
            .is_some_and(|last| (event.date - *last).num_days() <= self.window_days);
        self.last_seen.insert(key, event.date);

        if suppressed {
            debug!(
                "suppressing duplicate {} of {} x{} on {}",
                event.kind.label(),
                event.asset_code.as_deref().unwrap_or("?"),
                event.quantity,
                event.date
            );
        }

        !suppressed
    }
}

impl Default for DuplicateSuppressor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSource;

    fn adjustment(day: u32, month: u32, quantity: f64) -> NormalizedEvent {
        NormalizedEvent {
            date: NaiveDate::from_ymd_opt(2024, month, day).unwrap(),
            kind: EventKind::Adjustment,
            asset_code: Some("ITSA".to_string()),
            quantity,
            factor: None,
            value: None,
            price: None,
            direction: None,
            source: EventSource::Movement,
        }
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let mut suppressor = DuplicateSuppressor::default();
        assert!(suppressor.admit(&adjustment(10, 1, 100.0)));
        assert!(!suppressor.admit(&adjustment(20, 1, 100.0))); // 10 days later
    }

    #[test]
    fn test_repeat_beyond_window_is_admitted() {
        let mut suppressor = DuplicateSuppressor::default();
        assert!(suppressor.admit(&adjustment(10, 1, 100.0)));
        assert!(suppressor.admit(&adjustment(4, 2, 100.0))); // 25 days later
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut suppressor = DuplicateSuppressor::default();
        assert!(suppressor.admit(&adjustment(10, 1, 100.0)));
        assert!(!suppressor.admit(&adjustment(30, 1, 100.0))); // exactly 20 days
        assert!(suppressor.admit(&adjustment(10, 3, 100.0)));
    }

    #[test]
    fn test_chain_of_near_duplicates_collapses() {
        let mut suppressor = DuplicateSuppressor::default();
        assert!(suppressor.admit(&adjustment(1, 1, 100.0)));
        assert!(!suppressor.admit(&adjustment(16, 1, 100.0))); // 15 days after head
        // 30 days after head but only 15 after the previous repeat
        assert!(!suppressor.admit(&adjustment(31, 1, 100.0)));
    }

    #[test]
    fn test_different_quantity_is_a_different_key() {
        let mut suppressor = DuplicateSuppressor::default();
        assert!(suppressor.admit(&adjustment(10, 1, 100.0)));
        assert!(suppressor.admit(&adjustment(12, 1, 50.0)));
    }

    #[test]
    fn test_non_prone_kinds_always_pass() {
        let mut suppressor = DuplicateSuppressor::default();
        let mut buy = adjustment(10, 1, 100.0);
        buy.kind = EventKind::Buy;
        assert!(suppressor.admit(&buy));
        assert!(suppressor.admit(&buy));
    }

    #[test]
    fn test_custom_window() {
        let mut suppressor = DuplicateSuppressor::new(5);
        assert!(suppressor.admit(&adjustment(10, 1, 100.0)));
        assert!(suppressor.admit(&adjustment(20, 1, 100.0))); // outside 5-day window
    }
}
