//! Event model and normalization
//!
//! Raw trade and movement rows are mapped into one tagged event shape here,
//! so all string matching against portal vocabulary stays in this module.
//! Downstream components (suppressor, ledger) only ever see [`EventKind`].

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::lookup::EventInfoProvider;
use crate::parse;
use crate::records::{RawMovementRecord, RawTradeRecord};

/// Every event shape the ledger understands, plus a passthrough for trade
/// labels it does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Buy,
    Sell,
    /// Bonificação em Ativos: shares credited without cost.
    Bonus,
    /// Fração em Ativos: debit of a fractional leftover share.
    Fraction,
    /// Desdobramento/Desdobro.
    Split,
    /// Grupamento.
    ReverseSplit,
    /// Atualização: quantity credit whose cost depends on reference data.
    Adjustment,
    /// Direitos de Subscrição - Exercido.
    SubscriptionExercised,
    /// Cessão de Direitos - Solicitada.
    CessionRequested,
    Other(String),
}

impl EventKind {
    /// Canonical portal label, used for reference-data lookups and logs.
    pub fn label(&self) -> &str {
        match self {
            EventKind::Buy => "Compra",
            EventKind::Sell => "Venda",
            EventKind::Bonus => "Bonificação em Ativos",
            EventKind::Fraction => "Fração em Ativos",
            EventKind::Split => "Desdobro",
            EventKind::ReverseSplit => "Grupamento",
            EventKind::Adjustment => "Atualização",
            EventKind::SubscriptionExercised => "Direitos de Subscrição - Exercido",
            EventKind::CessionRequested => "Cessão de Direitos - Solicitada",
            EventKind::Other(label) => label,
        }
    }
}

/// How a movement label relates to the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementClass {
    /// Affects cash only (dividends, income, auction proceeds, loans,
    /// unexercised or ceded rights). Dropped before the ledger.
    CashOnly,
    /// Changes quantity and/or cost basis.
    Position(EventKind),
}

/// Classify a movement label into exactly one of the two disjoint sets.
///
/// Returns `None` for vocabulary this build has never reviewed; callers
/// skip those with a warning rather than guessing a side.
pub fn classify_movement(label: &str) -> Option<MovementClass> {
    match label {
        "Dividendo"
        | "Juros sobre Capital Próprio"
        | "Rendimento"
        | "Leilão"
        | "Leilão de Fração"
        | "Empréstimo"
        | "Cessão de Direitos"
        | "Cessão de Direitos - Não Exercido"
        | "Direito de Subscrição"
        | "Direitos de Subscrição"
        | "Direito de Subscrição - Não Exercido"
        | "Direitos de Subscrição - Não Exercido" => Some(MovementClass::CashOnly),

        "Bonificação em Ativos" | "Bonificação em ações" => {
            Some(MovementClass::Position(EventKind::Bonus))
        }
        "Fração em Ativos" => Some(MovementClass::Position(EventKind::Fraction)),
        "Desdobramento" | "Desdobro" => Some(MovementClass::Position(EventKind::Split)),
        "Grupamento" => Some(MovementClass::Position(EventKind::ReverseSplit)),
        "Atualização" => Some(MovementClass::Position(EventKind::Adjustment)),
        "Direito de Subscrição - Exercido" | "Direitos de Subscrição - Exercido" => {
            Some(MovementClass::Position(EventKind::SubscriptionExercised))
        }
        "Cessão de Direitos - Solicitada" => {
            Some(MovementClass::Position(EventKind::CessionRequested))
        }

        _ => None,
    }
}

/// Which export a normalized event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Trade,
    Movement,
}

/// The unit the engine operates on. Always carries a valid date and a
/// positive quantity; a factor is present whenever the kind requires one.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub date: NaiveDate,
    pub kind: EventKind,
    /// Base ticker, letters only.
    pub asset_code: Option<String>,
    pub quantity: f64,
    /// Multiplier, only for split/reverse-split kinds.
    pub factor: Option<f64>,
    /// Total cash amount, only for trade-sourced events.
    pub value: Option<f64>,
    /// Unit price, informational.
    pub price: Option<f64>,
    /// Credit/debit hint from movement data; informational only. The
    /// ledger determines effect from `kind`.
    pub direction: Option<String>,
    pub source: EventSource,
}

/// Normalize negotiation rows. Rows without a parseable date or a positive
/// quantity are skipped; a negative total value is a malformed row.
pub fn normalize_trades(records: &[RawTradeRecord]) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();

    for record in records {
        let Some(date) = parse::parse_date(&record.trade_date) else {
            warn!(
                "skipping trade with unparseable date '{}' for '{}'",
                record.trade_date, record.ticker
            );
            continue;
        };

        let quantity = parse::parse_quantity(&record.quantity);
        if quantity <= 0 {
            debug!("skipping trade without positive quantity for '{}'", record.ticker);
            continue;
        }

        let value = parse::parse_amount(&record.value);
        if value < 0.0 {
            warn!(
                "skipping trade with negative total value {} for '{}'",
                value, record.ticker
            );
            continue;
        }

        let kind = match record.movement_type.trim() {
            "Compra" => EventKind::Buy,
            "Venda" => EventKind::Sell,
            other => EventKind::Other(other.to_string()),
        };

        events.push(NormalizedEvent {
            date,
            kind,
            asset_code: parse::base_ticker(&record.ticker),
            quantity: quantity as f64,
            factor: None,
            value: Some(value),
            price: Some(parse::parse_amount(&record.price)),
            direction: None,
            source: EventSource::Trade,
        });
    }

    events
}

/// Normalize movement rows for one base ticker. Cash-only movements are
/// dropped silently; unreviewed labels are dropped loudly. Splits and
/// reverse-splits must resolve a positive factor from the row or the
/// provider, or the event is unprocessable.
pub fn normalize_movements(
    records: &[RawMovementRecord],
    target: &str,
    provider: &dyn EventInfoProvider,
) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();

    for record in records {
        let Some(code) = parse::movement_code(&record.product) else {
            continue;
        };
        if !code.starts_with(target) {
            continue;
        }

        let label = record.movement_type.trim();
        let kind = match classify_movement(label) {
            Some(MovementClass::Position(kind)) => kind,
            Some(MovementClass::CashOnly) => continue,
            None => {
                warn!("skipping unreviewed movement type '{}' for {}", label, code);
                continue;
            }
        };

        let Some(date) = parse::parse_date(&record.date) else {
            warn!("skipping {} with unparseable date '{}' for {}", label, record.date, code);
            continue;
        };

        // Fractional quantities are legitimate here, unlike trades.
        let quantity = parse::parse_amount(&record.quantity);
        if quantity <= 0.0 {
            debug!("skipping {} without positive quantity for {}", label, code);
            continue;
        }

        let factor = match kind {
            EventKind::Split | EventKind::ReverseSplit => {
                let inline = parse::parse_amount(&record.factor);
                let resolved = if inline > 0.0 {
                    Some(inline)
                } else {
                    provider.event_factor(target, &kind, date)
                };
                match resolved.filter(|f| *f > 0.0) {
                    Some(factor) => Some(factor),
                    None => {
                        warn!(
                            "dropping {} for {} on {}: no usable factor from row or provider",
                            label, code, date
                        );
                        continue;
                    }
                }
            }
            _ => None,
        };

        events.push(NormalizedEvent {
            date,
            kind,
            asset_code: Some(target.to_string()),
            quantity,
            factor,
            value: None,
            price: Some(parse::parse_amount(&record.unit_price)),
            direction: Some(record.direction.clone()),
            source: EventSource::Movement,
        });
    }

    events
}

/// Same-day ordering: debits run against the pre-existing position before
/// credits, and quantity multipliers run last so they act on the already
/// updated balance.
pub fn kind_priority(kind: &EventKind) -> u8 {
    match kind {
        EventKind::Sell => 1,
        EventKind::Fraction | EventKind::CessionRequested => 2,
        EventKind::Buy => 3,
        EventKind::Bonus | EventKind::Adjustment | EventKind::SubscriptionExercised => 4,
        EventKind::Split | EventKind::ReverseSplit => 5,
        EventKind::Other(_) => 99,
    }
}

/// Sort ascending by date, same-day ties by [`kind_priority`]. The sort is
/// stable, so equal-priority events keep input order.
pub fn sort_events(events: &mut [NormalizedEvent]) {
    events.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| kind_priority(&a.kind).cmp(&kind_priority(&b.kind)))
    });
}
