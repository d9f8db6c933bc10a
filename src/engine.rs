//! Engine orchestration
//!
//! Wires the pipeline together for one asset: normalize raw rows, sequence,
//! suppress duplicates, replay through the ledger, then gap-fill the yearly
//! snapshots. Everything is computed fresh per call; the injected
//! [`EventInfoProvider`] is the only collaborator that outlives a run.

use std::collections::BTreeMap;

use chrono::{Datelike, Local};
use tracing::{debug, warn};

use crate::dedup::{DuplicateSuppressor, DEFAULT_WINDOW_DAYS};
use crate::error::{LedgerError, Result};
use crate::events::{self, EventKind};
use crate::gapfill;
use crate::ledger::{AnnualSnapshot, Position, PositionLedger, EPSILON};
use crate::lookup::EventInfoProvider;
use crate::parse;
use crate::records::{RawMovementRecord, RawTradeRecord};

/// Tunables for one engine run.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Inclusive day-window for duplicate corporate-action suppression.
    pub duplicate_window_days: i64,
    /// Year gap-filling extends through. Defaults to the current calendar
    /// year; pin it for reproducible historical runs.
    pub reference_year: Option<i32>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            duplicate_window_days: DEFAULT_WINDOW_DAYS,
            reference_year: None,
        }
    }
}

/// Cost-basis calculation for one asset at a time.
pub struct LedgerEngine<'a> {
    provider: &'a dyn EventInfoProvider,
    options: EngineOptions,
}

impl<'a> LedgerEngine<'a> {
    pub fn new(provider: &'a dyn EventInfoProvider) -> Self {
        Self {
            provider,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Yearly position snapshots for `target`, from its trades and
    /// corporate-action movements.
    pub fn annual_summary(
        &self,
        trades: &[RawTradeRecord],
        movements: &[RawMovementRecord],
        target: &str,
    ) -> Result<Vec<AnnualSnapshot>> {
        let target = base_ticker_of(target)?;

        let asset_trades: Vec<RawTradeRecord> = trades
            .iter()
            .filter(|trade| parse::base_ticker(&trade.ticker).as_deref() == Some(target.as_str()))
            .cloned()
            .collect();

        let mut stream = events::normalize_trades(&asset_trades);
        stream.extend(events::normalize_movements(movements, &target, self.provider));
        events::sort_events(&mut stream);

        let mut suppressor = DuplicateSuppressor::new(self.options.duplicate_window_days);
        let mut ledger = PositionLedger::new(self.provider);
        let mut applied = 0usize;
        for event in &stream {
            if !suppressor.admit(event) {
                continue;
            }
            ledger.apply(event);
            applied += 1;
        }
        debug!(
            "[{}] replayed {} of {} normalized events",
            target,
            applied,
            stream.len()
        );

        let mut snapshots = ledger.into_snapshots();
        gapfill::fill_gaps(&mut snapshots, self.reference_year());
        Ok(snapshots.into_values().collect())
    }

    /// Simplified variant ignoring movements entirely, for assets with no
    /// corporate actions. Unlike the full ledger, an over-sell here fills
    /// partially against the held quantity instead of clamping to zero.
    pub fn trade_only_summary(
        &self,
        trades: &[RawTradeRecord],
        target: &str,
    ) -> Result<Vec<AnnualSnapshot>> {
        let target = base_ticker_of(target)?;

        let asset_trades: Vec<RawTradeRecord> = trades
            .iter()
            .filter(|trade| parse::base_ticker(&trade.ticker).as_deref() == Some(target.as_str()))
            .cloned()
            .collect();

        let mut stream = events::normalize_trades(&asset_trades);
        stream.sort_by_key(|event| event.date);

        let mut position = Position::default();
        let mut snapshots: BTreeMap<i32, AnnualSnapshot> = BTreeMap::new();

        for event in &stream {
            match &event.kind {
                EventKind::Buy => {
                    position.quantity += event.quantity;
                    position.total_invested += event.value.unwrap_or(0.0);
                }
                EventKind::Sell => {
                    let sold = event.quantity.min(position.quantity);
                    if sold < event.quantity {
                        warn!(
                            "[{}] sale of {} on {} exceeds held quantity {:.4}; filling partially",
                            target, event.quantity, event.date, position.quantity
                        );
                    }
                    position.total_invested -= sold * position.average_price();
                    position.quantity -= sold;
                    if position.quantity < EPSILON {
                        position = Position::default();
                    }
                }
                _ => continue,
            }

            let year = event.date.year();
            snapshots.insert(
                year,
                AnnualSnapshot {
                    year,
                    final_quantity: position.quantity,
                    average_price: position.average_price(),
                    total_invested: position.total_invested,
                },
            );
        }

        gapfill::fill_gaps(&mut snapshots, self.reference_year());
        Ok(snapshots.into_values().collect())
    }

    fn reference_year(&self) -> i32 {
        self.options
            .reference_year
            .unwrap_or_else(|| Local::now().year())
    }
}

fn base_ticker_of(target: &str) -> Result<String> {
    parse::base_ticker(target).ok_or_else(|| {
        LedgerError::ValidationError(format!("cannot derive a base ticker from '{}'", target))
            .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{EventInfoEntry, NullEventInfoProvider, StaticEventInfoProvider};
    use chrono::NaiveDate;
    use serde_json::json;

    fn trade(date: &str, movement_type: &str, ticker: &str, qty: i64, value: f64) -> RawTradeRecord {
        RawTradeRecord {
            trade_date: date.to_string(),
            movement_type: movement_type.to_string(),
            ticker: ticker.to_string(),
            quantity: json!(qty),
            price: json!(0),
            value: json!(value),
        }
    }

    fn movement(date: &str, movement_type: &str, product: &str, qty: f64) -> RawMovementRecord {
        RawMovementRecord {
            direction: "Credito".to_string(),
            date: date.to_string(),
            movement_type: movement_type.to_string(),
            product: product.to_string(),
            quantity: json!(qty),
            factor: json!(null),
            unit_price: json!(0),
            operation_value: json!(0),
        }
    }

    /// Route warn/debug diagnostics to the test harness; filter with
    /// RUST_LOG as usual.
    fn init_diagnostics() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn options_for(year: i32) -> EngineOptions {
        EngineOptions {
            reference_year: Some(year),
            ..Default::default()
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_simple_buy_then_sell() {
        let trades = vec![
            trade("10/01/2024", "Compra", "ITSA4", 100, 1000.0),
            trade("01/06/2024", "Venda", "ITSA4", 40, 480.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&trades, &[], "ITSA4").unwrap();

        assert_eq!(snapshots.len(), 1);
        let s = &snapshots[0];
        assert_eq!(s.year, 2024);
        assert!(close(s.final_quantity, 60.0));
        assert!(close(s.total_invested, 600.0));
        assert!(close(s.average_price, 10.0));
    }

    #[test]
    fn test_bonus_then_split() {
        let trades = vec![trade("10/01/2024", "Compra", "ITSA4", 100, 1000.0)];
        let mut split = movement("01/03/2024", "Desdobro", "ITSA4 - ITAUSA S/A", 110.0);
        split.factor = json!(2);
        let movements = vec![
            movement("01/02/2024", "Bonificação em Ativos", "ITSA4 - ITAUSA S/A", 10.0),
            split,
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&trades, &movements, "ITSA4").unwrap();

        let s = &snapshots[0];
        assert!(close(s.final_quantity, 220.0));
        assert!(close(s.total_invested, 1000.0));
        assert!((s.average_price - 4.545454).abs() < 1e-4);
    }

    #[test]
    fn test_oversell_clamps_without_error() {
        init_diagnostics();
        let trades = vec![
            trade("10/01/2024", "Compra", "ITSA4", 50, 500.0),
            trade("01/06/2024", "Venda", "ITSA4", 80, 900.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&trades, &[], "ITSA4").unwrap();

        let s = &snapshots[0];
        assert_eq!(s.final_quantity, 0.0);
        assert_eq!(s.total_invested, 0.0);
    }

    #[test]
    fn test_missing_split_factor_drops_the_event() {
        let trades = vec![trade("10/01/2024", "Compra", "ITSA4", 100, 1000.0)];
        let movements = vec![movement("01/03/2024", "Desdobro", "ITSA4 - ITAUSA S/A", 100.0)];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&trades, &movements, "ITSA4").unwrap();

        let s = &snapshots[0];
        assert!(close(s.final_quantity, 100.0));
        assert!(close(s.total_invested, 1000.0));
    }

    #[test]
    fn test_gap_fill_carries_position_forward() {
        let trades = vec![
            trade("10/01/2020", "Compra", "ITSA4", 50, 500.0),
            trade("10/01/2023", "Compra", "ITSA4", 30, 600.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2023));
        let snapshots = engine.annual_summary(&trades, &[], "ITSA4").unwrap();

        let years: Vec<i32> = snapshots.iter().map(|s| s.year).collect();
        assert_eq!(years, vec![2020, 2021, 2022, 2023]);
        assert!(close(snapshots[1].final_quantity, 50.0));
        assert!(close(snapshots[2].final_quantity, 50.0));
        assert!(close(snapshots[3].final_quantity, 80.0));
    }

    #[test]
    fn test_closed_position_is_not_revived_in_gap_years() {
        let trades = vec![
            trade("10/01/2020", "Compra", "ITSA4", 50, 500.0),
            trade("10/06/2021", "Venda", "ITSA4", 50, 700.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&trades, &[], "ITSA4").unwrap();

        let years: Vec<i32> = snapshots.iter().map(|s| s.year).collect();
        assert_eq!(years, vec![2020, 2021]);
        assert_eq!(snapshots[1].final_quantity, 0.0);
    }

    #[test]
    fn test_duplicate_adjustments_within_window_apply_once() {
        let movements = vec![
            movement("10/01/2024", "Atualização", "ITSA4 - ITAUSA S/A", 100.0),
            movement("20/01/2024", "Atualização", "ITSA4 - ITAUSA S/A", 100.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&[], &movements, "ITSA4").unwrap();
        assert!(close(snapshots[0].final_quantity, 100.0));
    }

    #[test]
    fn test_duplicate_adjustments_beyond_window_apply_twice() {
        let movements = vec![
            movement("10/01/2024", "Atualização", "ITSA4 - ITAUSA S/A", 100.0),
            movement("04/02/2024", "Atualização", "ITSA4 - ITAUSA S/A", 100.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&[], &movements, "ITSA4").unwrap();
        assert!(close(snapshots[0].final_quantity, 200.0));
    }

    #[test]
    fn test_subscription_credit_uses_reference_price() {
        let provider = StaticEventInfoProvider::with_entries(vec![EventInfoEntry {
            ticker: "ITSA2".to_string(),
            kind: EventKind::CessionRequested,
            date: NaiveDate::from_ymd_opt(2024, 6, 27).unwrap(),
            factor: None,
            average_price: Some(10.0),
        }]);

        let movements = vec![movement(
            "27/06/2024",
            "Cessão de Direitos - Solicitada",
            "ITSA2 - ITAUSA S/A",
            50.0,
        )];

        let engine = LedgerEngine::new(&provider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&[], &movements, "ITSA4").unwrap();

        let s = &snapshots[0];
        assert!(close(s.final_quantity, 50.0));
        assert!(close(s.total_invested, 500.0));
    }

    #[test]
    fn test_rerun_and_input_order_are_deterministic() {
        let trades = vec![
            trade("10/01/2024", "Compra", "ITSA4", 100, 1000.0),
            trade("15/03/2024", "Compra", "ITSA4", 50, 700.0),
            trade("01/06/2024", "Venda", "ITSA4", 40, 480.0),
        ];
        let movements = vec![movement(
            "01/02/2024",
            "Bonificação em Ativos",
            "ITSA4 - ITAUSA S/A",
            10.0,
        )];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let first = engine.annual_summary(&trades, &movements, "ITSA4").unwrap();
        let second = engine.annual_summary(&trades, &movements, "ITSA4").unwrap();
        assert_eq!(first, second);

        let reversed_trades: Vec<RawTradeRecord> = trades.iter().rev().cloned().collect();
        let reordered = engine
            .annual_summary(&reversed_trades, &movements, "ITSA4")
            .unwrap();
        assert_eq!(first, reordered);
    }

    #[test]
    fn test_snapshot_invariants_hold() {
        let trades = vec![
            trade("10/01/2023", "Compra", "ITSA4", 100, 1234.56),
            trade("05/05/2023", "Venda", "ITSA4", 33, 500.0),
            trade("09/09/2024", "Venda", "ITSA4", 67, 900.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2025));
        let snapshots = engine.annual_summary(&trades, &[], "ITSA4").unwrap();

        for s in &snapshots {
            assert!(s.final_quantity >= 0.0);
            assert!(s.total_invested >= 0.0);
            if s.final_quantity <= EPSILON {
                assert_eq!(s.total_invested, 0.0);
                assert_eq!(s.average_price, 0.0);
            } else {
                assert!(close(s.average_price, s.total_invested / s.final_quantity));
            }
        }
    }

    #[test]
    fn test_mixed_ticker_classes_share_one_position() {
        // ITSA3 and ITSA4 both fragment to ITSA.
        let trades = vec![
            trade("10/01/2024", "Compra", "ITSA4", 100, 1000.0),
            trade("11/01/2024", "Compra", "ITSA3", 50, 600.0),
            trade("10/01/2024", "Compra", "WEGE3", 10, 400.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.annual_summary(&trades, &[], "ITSA4").unwrap();
        assert!(close(snapshots[0].final_quantity, 150.0));
        assert!(close(snapshots[0].total_invested, 1600.0));
    }

    #[test]
    fn test_trade_only_summary_partial_fill_on_oversell() {
        init_diagnostics();
        let trades = vec![
            trade("10/01/2024", "Compra", "ITSA4", 50, 500.0),
            trade("01/06/2024", "Venda", "ITSA4", 80, 900.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.trade_only_summary(&trades, "ITSA4").unwrap();

        // Fills 50 of the 80 and ends flat, rather than clamping mid-event.
        let s = &snapshots[0];
        assert_eq!(s.final_quantity, 0.0);
        assert_eq!(s.total_invested, 0.0);
    }

    #[test]
    fn test_trade_only_summary_ignores_movement_vocabulary() {
        let trades = vec![
            trade("10/01/2024", "Compra", "ITSA4", 100, 1000.0),
            trade("12/01/2024", "Liquidação Termo", "ITSA4", 10, 100.0),
        ];

        let engine = LedgerEngine::new(&NullEventInfoProvider).with_options(options_for(2024));
        let snapshots = engine.trade_only_summary(&trades, "ITSA4").unwrap();
        assert!(close(snapshots[0].final_quantity, 100.0));
        assert!(close(snapshots[0].total_invested, 1000.0));
    }

    #[test]
    fn test_invalid_target_is_a_validation_error() {
        let engine = LedgerEngine::new(&NullEventInfoProvider);
        assert!(engine.annual_summary(&[], &[], "1234").is_err());
    }
}
