//! Annual snapshot gap filling
//!
//! A year with no events still has to appear in the declaration when a
//! position was being held through it. The filler carries the last
//! positive-quantity snapshot forward through missing years, up to the
//! reference year. A recorded zero-quantity year clears the carry: a
//! closed-out position is never silently revived in a later gap.

use std::collections::BTreeMap;

use crate::ledger::{AnnualSnapshot, EPSILON};

/// Extend `snapshots` in place through `reference_year` (or the latest
/// recorded year, whichever is later). Synthesized snapshots are copies of
/// the carry candidate with the year replaced.
pub fn fill_gaps(snapshots: &mut BTreeMap<i32, AnnualSnapshot>, reference_year: i32) {
    let Some(first) = snapshots.keys().next().copied() else {
        return;
    };
    let last = snapshots.keys().next_back().copied().unwrap_or(first);
    let end = reference_year.max(last);

    let mut carry: Option<AnnualSnapshot> = None;
    for year in first..=end {
        match snapshots.get(&year) {
            Some(snapshot) => {
                carry = (snapshot.final_quantity > EPSILON).then(|| snapshot.clone());
            }
            None => {
                if let Some(candidate) = &carry {
                    let mut synthesized = candidate.clone();
                    synthesized.year = year;
                    snapshots.insert(year, synthesized);
                }
            }
        }
    }
}
