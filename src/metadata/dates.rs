//! Years, dates and deadline ranges found in Portuguese administrative text.
//!
//! All parsers return `None` for impossible calendar dates (`31/02/2025`)
//! and keep scanning instead.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Years considered plausible for an academic calendar reference.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2020..=2049;

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

static DATE_BR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-3]?[0-9])[/.-]([01]?[0-9])[/.-](20[2-4][0-9])\b").expect("valid regex")
});

static DATE_WRITTEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([0-9]{1,2})º?\s+de\s+([a-zç]+)\s+de\s+(20[0-9]{2})\b").expect("valid regex")
});

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bde\s+([0-3]?[0-9])/([01]?[0-9])(?:/([0-9]{4}))?\s+a\s+([0-3]?[0-9])/([01]?[0-9])(?:/([0-9]{4}))?",
    )
    .expect("valid regex")
});

const MONTHS: &[(&str, u32)] = &[
    ("janeiro", 1),
    ("fevereiro", 2),
    ("março", 3),
    ("marco", 3),
    ("abril", 4),
    ("maio", 5),
    ("junho", 6),
    ("julho", 7),
    ("agosto", 8),
    ("setembro", 9),
    ("outubro", 10),
    ("novembro", 11),
    ("dezembro", 12),
];

/// Four-digit years in [`YEAR_RANGE`], in order of appearance.
///
/// A year must be a standalone run of exactly four digits, so `AC_2025_x`
/// yields 2025 while `12025` yields nothing.
pub fn plausible_years(s: &str) -> impl Iterator<Item = i32> + '_ {
    DIGIT_RUN
        .find_iter(s)
        .filter(|m| m.as_str().len() == 4)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .filter(|y| YEAR_RANGE.contains(y))
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Every valid `dd/mm/yyyy` (also `-` or `.` separated) date, in order.
pub fn numeric_dates(text: &str) -> impl Iterator<Item = NaiveDate> + '_ {
    DATE_BR
        .captures_iter(text)
        .filter_map(|c| ymd(&c[3], &c[2], &c[1]))
}

/// First date written as `12 de março de 2025`.
pub fn first_written_date(text: &str) -> Option<NaiveDate> {
    DATE_WRITTEN.captures_iter(text).find_map(|c| {
        let month_name = c[2].to_lowercase();
        let month = MONTHS
            .iter()
            .find(|(name, _)| *name == month_name)
            .map(|(_, m)| *m)?;
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[1].parse().ok()?)
    })
}

/// Publication date: first numeric date, else first written-out date.
pub fn guess_data_publicacao(text: &str) -> Option<NaiveDate> {
    numeric_dates(text)
        .next()
        .or_else(|| first_written_date(text))
}

/// Deadline window as `(inicio, fim)`.
///
/// The first `de dd/mm[/yyyy] a dd/mm[/yyyy]` phrase wins. A missing year
/// is taken from the other end of the range, then from the first plausible
/// year anywhere in the text. Without a usable range the first two numeric
/// dates are used; a single date is not a window.
pub fn guess_prazos(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    if let Some(range) = range_phrase(text) {
        return (Some(range.0), Some(range.1));
    }
    let mut dates = numeric_dates(text);
    match (dates.next(), dates.next()) {
        (Some(start), Some(end)) => (Some(start), Some(end)),
        _ => (None, None),
    }
}

fn range_phrase(text: &str) -> Option<(NaiveDate, NaiveDate)> {
    let caps = DATE_RANGE.captures(text)?;
    let explicit = caps.get(3).or_else(|| caps.get(6)).map(|m| m.as_str());
    let hint = match explicit {
        Some(y) => y.to_string(),
        None => plausible_years(text).next()?.to_string(),
    };
    let start_year = caps.get(3).map_or(hint.as_str(), |m| m.as_str());
    let end_year = caps.get(6).map_or(hint.as_str(), |m| m.as_str());
    let start = ymd(start_year, &caps[2], &caps[1])?;
    let end = ymd(end_year, &caps[5], &caps[4])?;
    Some((start, end))
}
