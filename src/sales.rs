//! Monthly sale aggregation
//!
//! Sums sale proceeds per month for a target year, straight from the raw
//! negotiation rows. Runs independently of the position ledger; realized
//! gain reporting needs the gross monthly totals regardless of cost basis.

use chrono::Datelike;
use itertools::Itertools;
use serde::Serialize;

use crate::parse;
use crate::records::RawTradeRecord;

/// Gross sale proceeds for one month of the target year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySaleSummary {
    pub month: u32,
    pub total_proceeds: f64,
}

/// Total the `Valor` of sale trades per month of `year`. Months without a
/// qualifying sale are omitted. Returned sorted by month for convenience;
/// ordering is not part of the contract.
pub fn monthly_sales(trades: &[RawTradeRecord], year: i32) -> Vec<MonthlySaleSummary> {
    let mut summaries: Vec<MonthlySaleSummary> = trades
        .iter()
        .filter(|trade| trade.movement_type.trim() == "Venda")
        .filter_map(|trade| {
            let date = parse::parse_date(&trade.trade_date)?;
            (date.year() == year).then(|| (date.month(), parse::parse_amount(&trade.value)))
        })
        .into_group_map()
        .into_iter()
        .map(|(month, values)| MonthlySaleSummary {
            month,
            total_proceeds: values.iter().sum(),
        })
        .collect();

    summaries.sort_by_key(|summary| summary.month);
    summaries
}
