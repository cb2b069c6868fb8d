use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::warn;

use crate::extract::{field_text, RawRecord};

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*)(?:\.(\d+))?").unwrap());

/// Marker for "×10,000" used by Chinese storefronts ("2.5万+").
const WAN: char = '万';
const WAN_FACTOR: u64 = 10_000;

/// Strip every non-digit and parse what is left. Empty or overflowing input yields 0.
///
/// A 0 means "unknown or zero"; callers should not read it as a real observation.
pub fn parse_count(text: &str) -> u64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(0)
}

/// Leading integer or decimal token, scaled by 10,000 when the text carries `万`.
///
/// Thousands separators inside the token are ignored and the result is truncated,
/// so `"1.2万"` is 12000, `"1,234"` is 1234 and `"3.9"` is 3.
pub fn parse_count_with_unit(text: &str) -> u64 {
    let Some(caps) = LEADING_NUMBER_RE.captures(text) else {
        return 0;
    };
    let whole: u64 = caps[1].replace(',', "").parse().unwrap_or(0);
    let fraction = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    if !text.contains(WAN) {
        return whole;
    }

    // Scale the fraction with integer math so "1.15万" is exactly 11500.
    let mut scaled_fraction = 0u64;
    let mut place = WAN_FACTOR / 10;
    for d in fraction.chars().filter_map(|c| c.to_digit(10)) {
        if place == 0 {
            break;
        }
        scaled_fraction += u64::from(d) * place;
        place /= 10;
    }
    whole
        .saturating_mul(WAN_FACTOR)
        .saturating_add(scaled_fraction)
}

/// Keep digits, signs and decimal points, then parse as a float.
///
/// Unparsable input logs a warning and yields 0.0.
pub fn parse_percent(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            if !text.trim().is_empty() {
                warn!(text, "could not parse percent value");
            }
            0.0
        }
    }
}

/// Drop currency symbols and thousands separators. Display only, never a sort key.
pub fn parse_currency(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect()
}

/// How a source's ranking field turns into a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyParser {
    Count,
    CountWithUnit,
    /// Every record with the field present gets the same key; order is the adapter's.
    Presence,
}

#[derive(Debug, Clone)]
pub struct SortKeyRule {
    pub field: String,
    pub parser: KeyParser,
}

impl SortKeyRule {
    pub fn new(field: impl Into<String>, parser: KeyParser) -> Self {
        SortKeyRule {
            field: field.into(),
            parser,
        }
    }

    /// `None` when the ranking field is absent or blank; such records are not rankable.
    pub fn key_for(&self, record: &RawRecord) -> Option<u64> {
        let text = field_text(record, &self.field)?;
        Some(match self.parser {
            KeyParser::Count => parse_count(text),
            KeyParser::CountWithUnit => parse_count_with_unit(text),
            KeyParser::Presence => 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub fields: RawRecord,
    pub sort_key: Option<u64>,
}

/// Derive sort keys for a batch. Output order matches input order.
pub fn normalize(records: Vec<RawRecord>, rule: &SortKeyRule) -> Vec<NormalizedRecord> {
    records
        .into_par_iter()
        .map(|fields| {
            let sort_key = rule.key_for(&fields);
            NormalizedRecord { fields, sort_key }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Option<&str>)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn count_strips_noise() {
        assert_eq!(parse_count("1,234 sold"), 1234);
        assert_eq!(parse_count("▲ 87 points"), 87);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("N/A"), 0);
        assert_eq!(parse_count("$$$"), 0);
    }

    #[test]
    fn count_overflow_degrades_to_zero() {
        assert_eq!(parse_count("99999999999999999999999999"), 0);
    }

    #[test]
    fn count_with_unit() {
        assert_eq!(parse_count_with_unit("2.5万+"), 25_000);
        assert_eq!(parse_count_with_unit("1.2万"), 12_000);
        assert_eq!(parse_count_with_unit("1.15万"), 11_500);
        assert_eq!(parse_count_with_unit("成交3万+件"), 30_000);
        assert_eq!(parse_count_with_unit("1,234"), 1234);
        assert_eq!(parse_count_with_unit("已售 500 件"), 500);
        assert_eq!(parse_count_with_unit("3.9"), 3);
        assert_eq!(parse_count_with_unit(""), 0);
        assert_eq!(parse_count_with_unit("万"), 0);
    }

    #[test]
    fn percent_values() {
        assert_eq!(parse_percent("+1.25%"), 1.25);
        assert_eq!(parse_percent("-3.4%"), -3.4);
        assert_eq!(parse_percent("0.00%"), 0.0);
        assert_eq!(parse_percent(""), 0.0);
        assert_eq!(parse_percent("--"), 0.0);
        assert_eq!(parse_percent("n/a"), 0.0);
        assert_eq!(parse_percent("1.2.3%"), 0.0);
    }

    #[test]
    fn currency_display() {
        assert_eq!(parse_currency("$1,234.56"), "1234.56");
        assert_eq!(parse_currency("¥12.5"), "12.5");
        assert_eq!(parse_currency("-$3.10"), "-3.10");
        assert_eq!(parse_currency(""), "");
    }

    #[test]
    fn missing_field_has_no_key() {
        let rule = SortKeyRule::new("sales", KeyParser::CountWithUnit);
        assert_eq!(rule.key_for(&record(&[("sales", None)])), None);
        assert_eq!(rule.key_for(&record(&[("sales", Some("  "))])), None);
        assert_eq!(rule.key_for(&record(&[("title", Some("x"))])), None);
        assert_eq!(rule.key_for(&record(&[("sales", Some("abc"))])), Some(0));
    }

    #[test]
    fn presence_keys_are_flat() {
        let rule = SortKeyRule::new("stock_symbol", KeyParser::Presence);
        assert_eq!(rule.key_for(&record(&[("stock_symbol", Some("AAPL"))])), Some(0));
    }

    #[test]
    fn normalize_keeps_order() {
        let rule = SortKeyRule::new("score", KeyParser::Count);
        let input: Vec<RawRecord> = (0..50)
            .map(|i| record(&[("score", Some(i.to_string().as_str()))]))
            .collect();
        let out = normalize(input, &rule);
        let keys: Vec<u64> = out.iter().filter_map(|r| r.sort_key).collect();
        assert_eq!(keys, (0..50).collect::<Vec<u64>>());
    }
}
