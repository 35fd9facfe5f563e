//! Locale-aware parsing of captured amounts, share counts, rates and dates.
//!
//! Statements format numbers differently per institution ("1.234,56" vs
//! "1,234.56" vs "1'234.56"). Parsing always takes an explicit
//! [`NumberLocale`]. Guessing a locale from a sample is a separate step,
//! [`infer_locale`], so formats that are unambiguous never depend on it.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::money::RoundingPolicy;

lazy_static! {
    static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})$"
    ).unwrap();

    static ref DATE_YMD: Regex = Regex::new(
        r"^(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})$"
    ).unwrap();

    static ref DATE_LONG: Regex = Regex::new(
        r"^(\d{1,2})\.?[\s\-]*(\p{L}+)\.?[\s\-]+(\d{4}|\d{2})$"
    ).unwrap();

    static ref DATE_MONTH_FIRST: Regex = Regex::new(
        r"^(\p{L}+)\.?\s+(\d{1,2}),\s*(\d{4})$"
    ).unwrap();

    static ref TIME: Regex = Regex::new(
        r"^(\d{1,2})[:.](\d{2})(?:[:.](\d{2}))?$"
    ).unwrap();
}

/// Decimal and grouping separators of a number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberLocale {
    pub decimal: char,
    pub grouping: char,
}

impl NumberLocale {
    /// 1.234,56
    pub const GERMAN: NumberLocale = NumberLocale {
        decimal: ',',
        grouping: '.',
    };

    /// 1,234.56
    pub const ENGLISH: NumberLocale = NumberLocale {
        decimal: '.',
        grouping: ',',
    };

    /// 1'234.56
    pub const SWISS: NumberLocale = NumberLocale {
        decimal: '.',
        grouping: '\'',
    };

    /// 1 234,56
    pub const FRENCH: NumberLocale = NumberLocale {
        decimal: ',',
        grouping: ' ',
    };
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self::GERMAN
    }
}

/// Parse a captured number into a non-negative decimal.
///
/// Whitespace is removed before parsing, so "1 234,56" parses under the
/// German locale as well. Leading or trailing sign characters are ignored;
/// the sign of an amount is decided by the rule table, never by the text.
pub fn parse_decimal(value: &str, locale: NumberLocale) -> Option<Decimal> {
    let mut cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00a0}')
        .collect();

    cleaned = cleaned
        .trim_start_matches(['+', '-'])
        .trim_end_matches(['+', '-'])
        .to_string();

    if locale.grouping == '\'' {
        cleaned = cleaned.replace('\u{2019}', "'");
    }

    if !locale.grouping.is_whitespace() {
        cleaned = cleaned.replace(locale.grouping, "");
    }

    let normalized = cleaned.replace(locale.decimal, ".");

    if normalized.is_empty()
        || normalized.matches('.').count() > 1
        || !normalized.chars().all(|c| c.is_ascii_digit() || c == '.')
        || !normalized.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }

    let normalized = normalized.trim_end_matches('.');
    let normalized = if normalized.starts_with('.') {
        format!("0{}", normalized)
    } else {
        normalized.to_string()
    };

    Decimal::from_str(&normalized).ok()
}

/// Parse a captured number into an integer with `scale` implied decimals.
///
/// `parse_scaled("107,26", GERMAN, 2)` is `10726`. Digits beyond the scale
/// are rounded half up.
pub fn parse_scaled(value: &str, locale: NumberLocale, scale: u32) -> Option<i64> {
    let decimal = parse_decimal(value, locale)?;
    let factor = Decimal::from(10i64.checked_pow(scale)?);
    RoundingPolicy::HalfUp.round_minor(decimal.checked_mul(factor)?)
}

/// Guess the locale of a number from the order of its separators.
///
/// Returns `None` when the sample does not decide it, e.g. "1.234" which is
/// one thousand in German and one point two in English.
pub fn infer_locale(sample: &str) -> Option<NumberLocale> {
    let sample = sample.trim();

    if sample.contains('\'') || sample.contains('\u{2019}') {
        return Some(NumberLocale::SWISS);
    }

    let last_comma = sample.rfind(',');
    let last_dot = sample.rfind('.');

    match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => Some(NumberLocale::GERMAN),
        (Some(_), Some(_)) => Some(NumberLocale::ENGLISH),
        (Some(c), None) => single_separator_locale(sample, ',', c),
        (None, Some(d)) => single_separator_locale(sample, '.', d),
        (None, None) => None,
    }
}

fn single_separator_locale(sample: &str, separator: char, position: usize) -> Option<NumberLocale> {
    let as_decimal = if separator == ',' {
        NumberLocale::GERMAN
    } else {
        NumberLocale::ENGLISH
    };
    let as_grouping = if separator == ',' {
        NumberLocale::ENGLISH
    } else {
        NumberLocale::GERMAN
    };

    if sample.matches(separator).count() > 1 {
        return Some(as_grouping);
    }

    let digits_after = sample[position + separator.len_utf8()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .count();

    if digits_after == 3 {
        None
    } else {
        Some(as_decimal)
    }
}

/// Parse a number using the inferred locale, or `fallback` when ambiguous.
pub fn parse_decimal_inferred(value: &str, fallback: NumberLocale) -> Option<Decimal> {
    parse_decimal(value, infer_locale(value).unwrap_or(fallback))
}

/// How a format decides the locale of its captured numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocaleMode {
    /// Every number uses this locale.
    Fixed(NumberLocale),
    /// The locale is inferred per value, `fallback` when ambiguous.
    Inferred { fallback: NumberLocale },
}

impl LocaleMode {
    /// Locale applied to one captured value.
    pub fn resolve(&self, value: &str) -> NumberLocale {
        match self {
            LocaleMode::Fixed(locale) => *locale,
            LocaleMode::Inferred { fallback } => infer_locale(value).unwrap_or(*fallback),
        }
    }

    pub fn parse(&self, value: &str) -> Option<Decimal> {
        parse_decimal(value, self.resolve(value))
    }

    pub fn parse_scaled(&self, value: &str, scale: u32) -> Option<i64> {
        parse_scaled(value, self.resolve(value), scale)
    }
}

impl Default for LocaleMode {
    fn default() -> Self {
        LocaleMode::Fixed(NumberLocale::GERMAN)
    }
}

/// Parse a captured date in the common statement formats.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Some(caps) = DATE_DMY.captures(value) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = parse_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_YMD.captures(value) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_LONG.captures(value) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_to_number(&caps[2])?;
        let year = parse_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_MONTH_FIRST.captures(value) {
        let month = month_to_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Parse a captured time of day (`13:45`, `13:45:18`, `13.45.18`).
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let caps = TIME.captures(value.trim())?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second: u32 = match caps.get(3) {
        Some(s) => s.as_str().parse().ok()?,
        None => 0,
    };
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Parse a date with an optional time; missing time means midnight.
pub fn parse_date_time(date: &str, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = parse_date(date)?;
    let time = match time {
        Some(t) => parse_time(t)?,
        None => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    if year < 100 { Some(2000 + year) } else { Some(year) }
}

fn month_to_number(month: &str) -> Option<u32> {
    let month = month.to_lowercase();
    let prefix: String = month.chars().take(3).collect();
    match prefix.as_str() {
        "jan" | "jän" => Some(1),
        "feb" => Some(2),
        "mär" | "mrz" | "mar" => Some(3),
        "apr" => Some(4),
        "mai" | "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "okt" | "oct" => Some(10),
        "nov" => Some(11),
        "dez" | "dec" => Some(12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_decimal_locales() {
        assert_eq!(parse_decimal("1.234,56", NumberLocale::GERMAN), Some(dec("1234.56")));
        assert_eq!(parse_decimal("1,234.56", NumberLocale::ENGLISH), Some(dec("1234.56")));
        assert_eq!(parse_decimal("1'234.56", NumberLocale::SWISS), Some(dec("1234.56")));
        assert_eq!(parse_decimal("1 234,56", NumberLocale::FRENCH), Some(dec("1234.56")));
        assert_eq!(parse_decimal("1 234,56", NumberLocale::GERMAN), Some(dec("1234.56")));
        assert_eq!(parse_decimal("1.800", NumberLocale::GERMAN), Some(dec("1800")));
    }

    #[test]
    fn test_parse_decimal_ignores_signs() {
        assert_eq!(parse_decimal("-107,26", NumberLocale::GERMAN), Some(dec("107.26")));
        assert_eq!(parse_decimal("1,34-", NumberLocale::GERMAN), Some(dec("1.34")));
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert_eq!(parse_decimal("", NumberLocale::GERMAN), None);
        assert_eq!(parse_decimal("abc", NumberLocale::GERMAN), None);
        assert_eq!(parse_decimal("1,2,3", NumberLocale::GERMAN), None);
        assert_eq!(parse_decimal("-", NumberLocale::GERMAN), None);
    }

    #[test]
    fn test_parse_scaled() {
        assert_eq!(parse_scaled("107,26", NumberLocale::GERMAN, 2), Some(10726));
        assert_eq!(parse_scaled("16,50", NumberLocale::GERMAN, 2), Some(1650));
        assert_eq!(parse_scaled("2", NumberLocale::GERMAN, 2), Some(200));
        assert_eq!(parse_scaled("0,005", NumberLocale::GERMAN, 2), Some(1));
        assert_eq!(parse_scaled("1,5", NumberLocale::GERMAN, 8), Some(150_000_000));
    }

    #[test]
    fn test_infer_locale() {
        assert_eq!(infer_locale("1.234,56"), Some(NumberLocale::GERMAN));
        assert_eq!(infer_locale("1,234.56"), Some(NumberLocale::ENGLISH));
        assert_eq!(infer_locale("1'234.56"), Some(NumberLocale::SWISS));
        assert_eq!(infer_locale("53,47"), Some(NumberLocale::GERMAN));
        assert_eq!(infer_locale("53.47"), Some(NumberLocale::ENGLISH));
        assert_eq!(infer_locale("1.234.567"), Some(NumberLocale::GERMAN));
        assert_eq!(infer_locale("1,234,567"), Some(NumberLocale::ENGLISH));
        assert_eq!(infer_locale("1.234"), None);
        assert_eq!(infer_locale("1,234"), None);
        assert_eq!(infer_locale("1234"), None);
    }

    #[test]
    fn test_parse_decimal_inferred_fallback() {
        assert_eq!(
            parse_decimal_inferred("1.234", NumberLocale::ENGLISH),
            Some(dec("1.234"))
        );
        assert_eq!(
            parse_decimal_inferred("1.234", NumberLocale::GERMAN),
            Some(dec("1234"))
        );
        assert_eq!(
            parse_decimal_inferred("1,234.5", NumberLocale::GERMAN),
            Some(dec("1234.5"))
        );
    }

    #[test]
    fn test_locale_mode() {
        let fixed = LocaleMode::Fixed(NumberLocale::ENGLISH);
        assert_eq!(fixed.parse("1,234.5"), Some(dec("1234.5")));
        assert_eq!(fixed.parse_scaled("1.5", 2), Some(150));

        let inferred = LocaleMode::Inferred {
            fallback: NumberLocale::GERMAN,
        };
        assert_eq!(inferred.resolve("1,234.56"), NumberLocale::ENGLISH);
        assert_eq!(inferred.resolve("1.234"), NumberLocale::GERMAN);
        assert_eq!(inferred.parse_scaled("1.234", 2), Some(123_400));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 5, 3).unwrap();
        assert_eq!(parse_date("03.05.2021"), Some(expected));
        assert_eq!(parse_date("3.5.2021"), Some(expected));
        assert_eq!(parse_date("3.5.21"), Some(expected));
        assert_eq!(parse_date("2021-05-03"), Some(expected));
        assert_eq!(parse_date("03/05/2021"), Some(expected));
        assert_eq!(parse_date("3. Mai 2021"), Some(expected));
        assert_eq!(parse_date("03 May 2021"), Some(expected));
        assert_eq!(parse_date("May 3, 2021"), Some(expected));
        assert_eq!(
            parse_date("12. Mrz 2020"),
            NaiveDate::from_ymd_opt(2020, 3, 12)
        );
        assert_eq!(parse_date("31.02.2021"), None);
        assert_eq!(parse_date("gestern"), None);
    }

    #[test]
    fn test_parse_date_time() {
        let dt = parse_date_time("03.05.2021", Some("13:45:18")).unwrap();
        assert_eq!(dt.to_string(), "2021-05-03 13:45:18");

        let dt = parse_date_time("17.2.2021", None).unwrap();
        assert_eq!(dt.to_string(), "2021-02-17 00:00:00");

        assert!(parse_date_time("17.2.2021", Some("25:00")).is_none());
    }
}
