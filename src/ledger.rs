//! Position state machine
//!
//! Replays the deduplicated, ordered event stream and mutates the running
//! (quantity, total invested) pair with type-specific transitions, taking a
//! year-end snapshot after every event. Bad data never aborts a replay:
//! unprocessable events are ignored and over-debits clamp the position to
//! zero, both with a diagnostic.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::events::{EventKind, NormalizedEvent};
use crate::lookup::EventInfoProvider;

/// Tolerance for quantity and cost comparisons. Reverse-splits and fraction
/// settlements leave genuine sub-share residues well above this.
pub const EPSILON: f64 = 1e-4;

/// Running position for one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub quantity: f64,
    pub total_invested: f64,
}

impl Position {
    pub fn average_price(&self) -> f64 {
        if self.quantity > EPSILON {
            self.total_invested / self.quantity
        } else {
            0.0
        }
    }
}

/// Year-end view of the position: the state after the last processed event
/// in that calendar year, or a gap-filled copy of an earlier year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualSnapshot {
    pub year: i32,
    pub final_quantity: f64,
    pub average_price: f64,
    pub total_invested: f64,
}

/// Event replay over one asset's stream.
pub struct PositionLedger<'a> {
    provider: &'a dyn EventInfoProvider,
    position: Position,
    snapshots: BTreeMap<i32, AnnualSnapshot>,
}

impl<'a> PositionLedger<'a> {
    pub fn new(provider: &'a dyn EventInfoProvider) -> Self {
        Self {
            provider,
            position: Position::default(),
            snapshots: BTreeMap::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Consume the ledger, yielding one snapshot per touched year.
    pub fn into_snapshots(self) -> BTreeMap<i32, AnnualSnapshot> {
        self.snapshots
    }

    /// Apply one event. Events that turn out to be unprocessable leave both
    /// the position and the year's snapshot untouched.
    pub fn apply(&mut self, event: &NormalizedEvent) {
        let asset = event.asset_code.as_deref().unwrap_or("?");

        match &event.kind {
            EventKind::Buy => {
                let Some(value) = event.value.filter(|v| *v >= 0.0) else {
                    warn!(
                        "[{}] ignoring buy of {} on {}: missing or negative total value",
                        asset, event.quantity, event.date
                    );
                    return;
                };
                self.position.quantity += event.quantity;
                self.position.total_invested += value;
            }

            EventKind::Sell | EventKind::Fraction => {
                let q = event.quantity;
                if self.position.quantity >= q - EPSILON {
                    let cost_removed = q * self.position.average_price();
                    self.position.total_invested -= cost_removed;
                    self.position.quantity -= q;
                } else {
                    warn!(
                        "[{}] debit of {} on {} exceeds held quantity {:.4}; clamping position to zero",
                        asset, q, event.date, self.position.quantity
                    );
                    self.position = Position::default();
                }
            }

            EventKind::Bonus => {
                // Cost basis unchanged; average price dilutes.
                self.position.quantity += event.quantity;
            }

            EventKind::Split => match event.factor {
                Some(factor) if factor > 1.0 => self.position.quantity *= factor,
                _ => {
                    warn!(
                        "[{}] ignoring split on {} with factor {:?}",
                        asset, event.date, event.factor
                    );
                    return;
                }
            },

            EventKind::ReverseSplit => match event.factor {
                Some(factor) if factor > 1.0 => self.position.quantity /= factor,
                _ => {
                    warn!(
                        "[{}] ignoring reverse-split on {} with factor {:?}",
                        asset, event.date, event.factor
                    );
                    return;
                }
            },

            EventKind::Adjustment
            | EventKind::SubscriptionExercised
            | EventKind::CessionRequested => {
                let price = event.asset_code.as_deref().and_then(|code| {
                    self.provider
                        .special_event_average_price(code, &event.kind, event.date)
                });

                self.position.quantity += event.quantity;
                match price.filter(|p| *p > 0.0) {
                    Some(price) => {
                        self.position.total_invested += event.quantity * price;
                    }
                    None => {
                        debug!(
                            "[{}] no reference price for {} on {}; crediting {} at zero cost",
                            asset,
                            event.kind.label(),
                            event.date,
                            event.quantity
                        );
                    }
                }
            }

            EventKind::Other(label) => {
                debug!("[{}] ignoring unrecognized event '{}' on {}", asset, label, event.date);
                return;
            }
        }

        self.settle(asset, event.date);
    }

    /// Post-transition invariant maintenance plus the year snapshot.
    fn settle(&mut self, asset: &str, date: NaiveDate) {
        if self.position.total_invested < 0.0 {
            if self.position.total_invested > -EPSILON {
                // Float drift on an exhausted cost basis.
                self.position.total_invested = 0.0;
            } else {
                // Data inconsistency; flagged but not rewritten.
                warn!(
                    "[{}] total invested drifted to {:.4} on {}; not corrected",
                    asset, self.position.total_invested, date
                );
            }
        }

        if self.position.quantity < EPSILON {
            self.position = Position::default();
        }

        let year = date.year();
        self.snapshots.insert(
            year,
            AnnualSnapshot {
                year,
                final_quantity: self.position.quantity,
                average_price: self.position.average_price(),
                total_invested: self.position.total_invested,
            },
        );
    }
}
