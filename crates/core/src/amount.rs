use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Glyphs stripped from a raw amount before separator resolution.
const CURRENCY_GLYPHS: [char; 3] = ['$', '€', '£'];

/// Largest figure accepted as an invoice total.
const MAX_PLAUSIBLE_TOTAL: u32 = 999_999_999;

/// How much an amount is trusted after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Only values in the plausible total range `[1, 999_999_999]` survive.
    Strict,
    /// Any non-negative value survives (tax lines, subtotals).
    Lenient,
}

/// Normalize a raw numeral string as printed on an invoice into a decimal.
///
/// `.` and `,` are disambiguated as decimal point or thousands separator:
/// - both present: the rightmost one is the decimal point, the other is grouping;
/// - one kind present and every group after the first has exactly 3 digits
///   (`3.000`, `1.250.000`, `3,000`): grouping;
/// - otherwise the separator is the decimal point.
///
/// Returns `None` when the string is not a number or fails the strictness check.
pub fn normalize_amount(raw: &str, strictness: Strictness) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_GLYPHS.contains(c))
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ',']);
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let canonical = canonicalize_separators(cleaned);
    let value = Decimal::from_str(&canonical).ok()?;

    match strictness {
        Strictness::Strict if !is_plausible_total(value) => None,
        _ => Some(value),
    }
}

/// Whether `value` falls inside the range a grand total can reasonably take.
pub fn is_plausible_total(value: Decimal) -> bool {
    value >= Decimal::ONE && value <= Decimal::from(MAX_PLAUSIBLE_TOTAL)
}

fn canonicalize_separators(s: &str) -> String {
    match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (decimal, grouping) = if dot > comma { ('.', ',') } else { (',', '.') };
            s.chars()
                .filter(|&c| c != grouping)
                .map(|c| if c == decimal { '.' } else { c })
                .collect()
        }
        (Some(_), None) => resolve_single_separator(s, '.'),
        (None, Some(_)) => resolve_single_separator(s, ','),
        (None, None) => s.to_string(),
    }
}

fn resolve_single_separator(s: &str, sep: char) -> String {
    let groups: Vec<&str> = s.split(sep).collect();
    let grouping = !groups[0].is_empty() && groups[1..].iter().all(|g| g.len() == 3);
    if grouping {
        groups.concat()
    } else {
        s.replace(sep, ".")
    }
}
