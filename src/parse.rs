//! Locale-tolerant parsers for B3 export cells
//!
//! B3 exports mix typed JSON numbers with Brazilian-formatted strings
//! ("R$ 1.234,56"), blanks, and bare dashes. Every parser here returns a
//! safe default instead of failing, so one bad cell never aborts a run.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static MOVEMENT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{4}\d+").expect("movement code regex"));

/// Parse a `DD/MM/YYYY` date, rejecting calendar-invalid combinations.
///
/// Returns `None` on wrong shape, non-numeric parts, out-of-range fields,
/// or years outside [1000, 3000].
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;

    if !(1..=31).contains(&day) || !(1..=12).contains(&month) || !(1000..=3000).contains(&year) {
        return None;
    }

    // Rejects 31/02 and friends
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a monetary or fractional amount from an untyped JSON cell.
///
/// Numbers pass through. Strings are stripped of the currency marker and
/// whitespace; decimal-comma form drops `.` thousands separators and
/// converts `,` to `.`. Returns 0.0 on anything unparsable.
pub fn parse_amount(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_amount_str(s),
        _ => 0.0,
    }
}

fn parse_amount_str(s: &str) -> f64 {
    let cleaned = s.replace("R$", "");
    let cleaned = cleaned.trim();

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.to_string()
    };

    normalized.parse::<f64>().unwrap_or(0.0)
}

/// Parse a whole-share quantity. Blank cells and bare dashes mean zero.
pub fn parse_quantity(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "-" {
                return 0;
            }
            trimmed.parse::<i64>().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Canonical negotiation-code fragment from a movement product description.
///
/// Takes the text before a `" - "` separator, uppercases it, and extracts
/// the leading four letters plus digits shape (e.g. "ITSA4 - ITAUSA S/A"
/// yields "ITSA4"). Used to match movements against a target asset.
pub fn movement_code(product: &str) -> Option<String> {
    let head = product.split(" - ").next().unwrap_or(product);
    let upper = head.trim().to_uppercase();
    MOVEMENT_CODE_RE
        .find(&upper)
        .map(|m| m.as_str().to_string())
}

/// Base ticker for cross-year grouping: the leading alphabetic run only,
/// digits and class suffix dropped ("ITSA4" and "ITSA3" both yield "ITSA").
///
/// `None` means the ticker could not be derived; callers must exclude the
/// record rather than invent a bucket for it.
pub fn base_ticker(raw: &str) -> Option<String> {
    let head = raw.split(" - ").next().unwrap_or(raw);
    let upper = head.trim().to_uppercase();
    let letters: String = upper.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        None
    } else {
        Some(letters)
    }
}
