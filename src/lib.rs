//! Posicao - B3 position cost-basis ledger
//!
//! This library reconstructs share quantity and weighted average acquisition
//! cost for a single B3 security from buy/sell trades and corporate-action
//! movements, producing per-year closing snapshots and per-month realized
//! sale totals for the annual IRPF declaration.

pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod gapfill;
pub mod ledger;
pub mod lookup;
pub mod parse;
pub mod records;
pub mod sales;
