//! Raw B3 export records
//!
//! The negotiation ("Negociação") and movement ("Movimentação") exports are
//! consumed as JSON rows keyed by the portal's Portuguese column names.
//! Numeric-ish cells arrive as either JSON numbers or formatted strings, so
//! they are kept as [`serde_json::Value`] and parsed defensively downstream.

use std::collections::HashMap;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::parse;

/// One row of the B3 negotiation export (a buy or sell trade).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTradeRecord {
    #[serde(rename = "Data do Negócio", default)]
    pub trade_date: String,

    #[serde(rename = "Tipo de Movimentação", default)]
    pub movement_type: String,

    #[serde(rename = "Código de Negociação", default)]
    pub ticker: String,

    #[serde(rename = "Quantidade", default)]
    pub quantity: Value,

    #[serde(rename = "Preço", default)]
    pub price: Value,

    #[serde(rename = "Valor", default)]
    pub value: Value,
}

/// One row of the B3 movement export (trades, corporate actions, income).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMovementRecord {
    #[serde(rename = "Entrada/Saída", default)]
    pub direction: String,

    #[serde(rename = "Data", default)]
    pub date: String,

    #[serde(rename = "Movimentação", default)]
    pub movement_type: String,

    #[serde(rename = "Produto", default)]
    pub product: String,

    #[serde(rename = "Quantidade", default)]
    pub quantity: Value,

    #[serde(rename = "Fator", default)]
    pub factor: Value,

    #[serde(rename = "Preço unitário", default)]
    pub unit_price: Value,

    #[serde(rename = "Valor da Operação", default)]
    pub operation_value: Value,
}

/// Trade and movement rows belonging to one base ticker.
#[derive(Debug, Clone, Default)]
pub struct AssetRecords {
    pub trades: Vec<RawTradeRecord>,
    pub movements: Vec<RawMovementRecord>,
}

/// Deserialize a JSON array of trade rows.
pub fn trades_from_json(json: &str) -> Result<Vec<RawTradeRecord>> {
    serde_json::from_str(json)
        .map_err(|e| LedgerError::RecordError(e.to_string()))
        .context("failed to deserialize trade records")
}

/// Deserialize a JSON array of movement rows.
pub fn movements_from_json(json: &str) -> Result<Vec<RawMovementRecord>> {
    serde_json::from_str(json)
        .map_err(|e| LedgerError::RecordError(e.to_string()))
        .context("failed to deserialize movement records")
}

/// Group raw records by base ticker so each asset can be processed in
/// isolation. Rows whose ticker cannot be derived are dropped; a made-up
/// bucket would pollute every downstream total.
pub fn fragment_by_ticker(
    trades: &[RawTradeRecord],
    movements: &[RawMovementRecord],
) -> HashMap<String, AssetRecords> {
    let mut grouped: HashMap<String, AssetRecords> = HashMap::new();

    for trade in trades {
        match parse::base_ticker(&trade.ticker) {
            Some(ticker) => grouped.entry(ticker).or_default().trades.push(trade.clone()),
            None => debug!("dropping trade with underivable ticker: '{}'", trade.ticker),
        }
    }

    for movement in movements {
        match parse::base_ticker(&movement.product) {
            Some(ticker) => grouped
                .entry(ticker)
                .or_default()
                .movements
                .push(movement.clone()),
            None => debug!(
                "dropping movement with underivable ticker: '{}'",
                movement.product
            ),
        }
    }

    grouped
}
