//! FileMan internal dates.
//!
//! The internal form is exactly seven ASCII digits `YYYMMDD`, where
//! `YYY = year - 1700`. Only years 1800 through 2199 are accepted. All
//! arithmetic goes through [`decode`] and [`encode`] and ordinary calendar
//! dates; the digit string is never manipulated directly.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use filebot_core::date;
//!
//! let dob = date::decode("2850101").unwrap();
//! assert_eq!(dob, NaiveDate::from_ymd_opt(1985, 1, 1).unwrap());
//! assert_eq!(date::encode(dob).unwrap(), "2850101");
//! assert_eq!(date::add_days("2850131", 1).unwrap(), "2850201");
//! ```

use chrono::{Datelike, Days, Local, NaiveDate};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Offset between calendar years and the internal `YYY` field.
pub const YEAR_OFFSET: i32 = 1700;
/// Earliest supported calendar year.
pub const MIN_YEAR: i32 = 1800;
/// Latest supported calendar year.
pub const MAX_YEAR: i32 = 2199;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Result type for date operations.
pub type DateResult<T> = Result<T, DateError>;

/// Errors from decoding, encoding or parsing dates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    /// Not exactly seven ASCII digits.
    #[error("FileMan date must be 7 digits, got {0:?}")]
    Malformed(String),

    /// Month outside 1..=12.
    #[error("month {0} out of range")]
    MonthOutOfRange(u32),

    /// Day outside 1..=31.
    #[error("day {0} out of range")]
    DayOutOfRange(u32),

    /// Year outside the supported range.
    #[error("year {0} outside 1800-2199")]
    YearOutOfRange(i32),

    /// Fields are in range but the date does not exist (e.g. February 30).
    #[error("no such calendar date: {0}")]
    Nonexistent(String),

    /// External text did not match any accepted format.
    #[error("unrecognized date: {0:?}")]
    Unrecognized(String),
}

/// Encodes a calendar date as a FileMan internal date.
///
/// # Errors
///
/// Returns [`DateError::YearOutOfRange`] outside 1800-2199.
pub fn encode(date: NaiveDate) -> DateResult<String> {
    let year = date.year();
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(DateError::YearOutOfRange(year));
    }
    Ok(format!(
        "{:03}{:02}{:02}",
        year - YEAR_OFFSET,
        date.month(),
        date.day()
    ))
}

/// Decodes a FileMan internal date.
///
/// # Errors
///
/// Rejects anything other than seven digits, out-of-range fields, and dates
/// that do not exist on the calendar.
pub fn decode(internal: &str) -> DateResult<NaiveDate> {
    if internal.len() != 7 || !internal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError::Malformed(internal.to_string()));
    }
    let field = |range: std::ops::Range<usize>| -> u32 {
        internal.as_bytes()[range]
            .iter()
            .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    };

    let month = field(3..5);
    let day = field(5..7);
    let year = YEAR_OFFSET + field(0..3) as i32;

    if !(1..=12).contains(&month) {
        return Err(DateError::MonthOutOfRange(month));
    }
    if !(1..=31).contains(&day) {
        return Err(DateError::DayOutOfRange(day));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(DateError::YearOutOfRange(year));
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DateError::Nonexistent(internal.to_string()))
}

/// Returns true if `internal` decodes.
#[must_use]
pub fn is_valid(internal: &str) -> bool {
    decode(internal).is_ok()
}

/// Adds (or with a negative count, subtracts) days.
pub fn add_days(internal: &str, days: i64) -> DateResult<String> {
    let date = decode(internal)?;
    let step = Days::new(days.unsigned_abs());
    let shifted = if days < 0 {
        date.checked_sub_days(step)
    } else {
        date.checked_add_days(step)
    };
    shifted
        .ok_or_else(|| DateError::Nonexistent(format!("{internal} {days:+} days")))
        .and_then(encode)
}

/// Returns `to - from` in days.
pub fn diff_days(from: &str, to: &str) -> DateResult<i64> {
    Ok((decode(to)? - decode(from)?).num_days())
}

/// Returns whole years between `birth` and `as_of` (default: today).
///
/// A birthday falling on February 29 counts from March 1 in other years.
/// Returns 0 if `as_of` is before `birth`.
pub fn age_in_years(birth: &str, as_of: Option<&str>) -> DateResult<u32> {
    let birth = decode(birth)?;
    let as_of = match as_of {
        Some(s) => decode(s)?,
        None => today(),
    };
    Ok(age_between(birth, as_of))
}

pub(crate) fn age_between(birth: NaiveDate, as_of: NaiveDate) -> u32 {
    if as_of < birth {
        return 0;
    }
    let mut years = as_of.year() - birth.year();
    if (as_of.month(), as_of.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Today's date in local time.
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Textual styles for external display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateStyle {
    /// `01/15/1985`
    #[default]
    Standard,
    /// `January 15, 1985`
    Long,
    /// `01/15/85`
    Short,
    /// `1985-01-15`
    Iso,
    /// `JAN 15,1985`, the FileMan external form.
    FileMan,
}

impl DateStyle {
    /// Renders a calendar date in this style.
    #[must_use]
    pub fn render(self, date: NaiveDate) -> String {
        let (y, m, d) = (date.year(), date.month(), date.day());
        let month_name = MONTHS[(m - 1) as usize];
        match self {
            Self::Standard => format!("{m:02}/{d:02}/{y:04}"),
            Self::Long => format!("{month_name} {d}, {y}"),
            Self::Short => format!("{m:02}/{d:02}/{:02}", y.rem_euclid(100)),
            Self::Iso => format!("{y:04}-{m:02}-{d:02}"),
            Self::FileMan => format!("{} {d:02},{y}", month_name[..3].to_ascii_uppercase()),
        }
    }
}

impl FromStr for DateStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            "iso" => Ok(Self::Iso),
            "fileman" => Ok(Self::FileMan),
            other => Err(format!("unknown date style {other:?}")),
        }
    }
}

/// Renders an internal date for display.
pub fn external_format(internal: &str, style: DateStyle) -> DateResult<String> {
    Ok(style.render(decode(internal)?))
}

/// Two-digit-year pivot.
///
/// Two-digit years up to and including the pivot are in the 2000s; larger
/// ones are in the 1900s. The default of 30 maps `00..=30` to 2000-2030 and
/// `31..=99` to 1931-1999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearPivot(u8);

impl YearPivot {
    /// Creates a pivot, clamped to 0..=99.
    #[must_use]
    pub const fn new(pivot: u8) -> Self {
        Self(if pivot > 99 { 99 } else { pivot })
    }

    /// Returns the pivot value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Expands a two-digit year.
    #[must_use]
    pub const fn expand(self, yy: u32) -> i32 {
        if yy <= self.0 as u32 {
            2000 + yy as i32
        } else {
            1900 + yy as i32
        }
    }
}

impl Default for YearPivot {
    fn default() -> Self {
        Self(30)
    }
}

/// Parses external text into an internal date.
///
/// Accepts `MM/DD/YYYY`, `MM/DD/YY`, `YYYY-MM-DD`, `Mon DD, YYYY` (full or
/// three-letter month names, any case, comma optional), and an internal
/// date as-is. Empty or all-whitespace input means "unset" and returns
/// `Ok(None)`.
pub fn parse_external(text: &str, pivot: YearPivot) -> DateResult<Option<String>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    if text.len() == 7 && text.bytes().all(|b| b.is_ascii_digit()) {
        decode(text)?;
        return Ok(Some(text.to_string()));
    }

    let date = parse_slashed(text, pivot)
        .or_else(|| parse_iso(text))
        .or_else(|| parse_month_name(text))
        .ok_or_else(|| DateError::Unrecognized(text.to_string()))?;
    match date {
        Some(d) => encode(d).map(Some),
        None => Err(DateError::Nonexistent(text.to_string())),
    }
}

/// `None` if the text does not have the parser's shape, `Some(None)` if it
/// does but the fields name no calendar date.
type Attempt = Option<Option<NaiveDate>>;

fn digits(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_slashed(text: &str, pivot: YearPivot) -> Attempt {
    let mut parts = text.split('/');
    let (m, d, y) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (month, day) = (digits(m)?, digits(d)?);
    let year = match y.len() {
        2 => pivot.expand(digits(y)?),
        4 => digits(y)? as i32,
        _ => return None,
    };
    Some(NaiveDate::from_ymd_opt(year, month, day))
}

fn parse_iso(text: &str) -> Attempt {
    let mut parts = text.split('-');
    let (y, m, d) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || y.len() != 4 {
        return None;
    }
    Some(NaiveDate::from_ymd_opt(
        digits(y)? as i32,
        digits(m)?,
        digits(d)?,
    ))
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|full| {
            let full = full.to_ascii_lowercase();
            lower == full || (lower.len() == 3 && full.starts_with(&lower))
        })
        .map(|i| i as u32 + 1)
}

fn parse_month_name(text: &str) -> Attempt {
    let (name, rest) = text.split_once(' ')?;
    let month = month_number(name)?;
    let (d, y) = rest
        .split_once(',')
        .map(|(d, y)| (d.trim(), y.trim()))
        .or_else(|| rest.trim().split_once(' ').map(|(d, y)| (d.trim(), y.trim())))?;
    if y.len() != 4 {
        return None;
    }
    Some(NaiveDate::from_ymd_opt(digits(y)? as i32, month, digits(d)?))
}

/// A validated FileMan internal date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileManDate(NaiveDate);

impl FileManDate {
    /// Wraps a calendar date, checking the supported range.
    pub fn from_date(date: NaiveDate) -> DateResult<Self> {
        encode(date)?;
        Ok(Self(date))
    }

    /// Returns the calendar date.
    #[must_use]
    pub fn date(self) -> NaiveDate {
        self.0
    }

    /// Returns the seven-digit internal form.
    #[must_use]
    pub fn internal(self) -> String {
        format!(
            "{:03}{:02}{:02}",
            self.0.year() - YEAR_OFFSET,
            self.0.month(),
            self.0.day()
        )
    }

    /// Renders the date in a display style.
    #[must_use]
    pub fn format(self, style: DateStyle) -> String {
        style.render(self.0)
    }
}

impl FromStr for FileManDate {
    type Err = DateError;

    fn from_str(s: &str) -> DateResult<Self> {
        decode(s).map(Self)
    }
}

impl fmt::Display for FileManDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.internal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn round_trip_every_supported_day() {
        let mut date = ymd(MIN_YEAR, 1, 1);
        let last = ymd(MAX_YEAR, 12, 31);
        let mut count = 0;
        while date <= last {
            let internal = encode(date).unwrap();
            assert_eq!(decode(&internal).unwrap(), date, "{internal}");
            date = date.succ_opt().unwrap();
            count += 1;
        }
        // 400 Gregorian years hold exactly 146097 days.
        assert_eq!(count, 146_097);
    }

    #[test]
    fn decode_rejections() {
        assert!(matches!(decode("285010"), Err(DateError::Malformed(_))));
        assert!(matches!(decode("28501011"), Err(DateError::Malformed(_))));
        assert!(matches!(decode("285O101"), Err(DateError::Malformed(_))));
        assert!(matches!(decode(""), Err(DateError::Malformed(_))));
        assert_eq!(decode("2851301"), Err(DateError::MonthOutOfRange(13)));
        assert_eq!(decode("2850001"), Err(DateError::MonthOutOfRange(0)));
        assert_eq!(decode("2850132"), Err(DateError::DayOutOfRange(32)));
        assert_eq!(decode("0990101"), Err(DateError::YearOutOfRange(1799)));
        assert_eq!(decode("5000101"), Err(DateError::YearOutOfRange(2200)));
        assert!(matches!(decode("2850230"), Err(DateError::Nonexistent(_))));
    }

    #[test]
    fn encode_range() {
        assert_eq!(encode(ymd(1800, 1, 1)).unwrap(), "1000101");
        assert_eq!(encode(ymd(2199, 12, 31)).unwrap(), "4991231");
        assert_eq!(
            encode(ymd(1799, 12, 31)),
            Err(DateError::YearOutOfRange(1799))
        );
    }

    #[test]
    fn arithmetic() {
        assert_eq!(add_days("3000228", 1).unwrap(), "3000229");
        assert_eq!(add_days("3000301", -1).unwrap(), "3000229");
        assert_eq!(diff_days("2850101", "2860101").unwrap(), 365);
        assert_eq!(diff_days("2860101", "2850101").unwrap(), -365);
        assert!(add_days("4991231", 1).is_err());
    }

    #[test]
    fn age() {
        assert_eq!(age_in_years("2850101", Some("3250101")).unwrap(), 40);
        assert_eq!(age_in_years("2850102", Some("3250101")).unwrap(), 39);
        assert_eq!(age_in_years("3000229", Some("3010228")).unwrap(), 0);
        assert_eq!(age_in_years("3000229", Some("3010301")).unwrap(), 1);
        assert_eq!(age_in_years("3250101", Some("2850101")).unwrap(), 0);
    }

    #[test]
    fn styles() {
        let d = "2850115";
        assert_eq!(external_format(d, DateStyle::Standard).unwrap(), "01/15/1985");
        assert_eq!(external_format(d, DateStyle::Long).unwrap(), "January 15, 1985");
        assert_eq!(external_format(d, DateStyle::Short).unwrap(), "01/15/85");
        assert_eq!(external_format(d, DateStyle::Iso).unwrap(), "1985-01-15");
        assert_eq!(external_format(d, DateStyle::FileMan).unwrap(), "JAN 15,1985");
        assert_eq!("ISO".parse::<DateStyle>().unwrap(), DateStyle::Iso);
    }

    #[test]
    fn parse_formats() {
        let p = YearPivot::default();
        for text in [
            "01/15/1985",
            "1/15/1985",
            "01/15/85",
            "1985-01-15",
            "Jan 15, 1985",
            "JANUARY 15 1985",
            "jan 15,1985",
            "2850115",
        ] {
            assert_eq!(
                parse_external(text, p).unwrap().as_deref(),
                Some("2850115"),
                "{text}"
            );
        }
        assert_eq!(parse_external("  ", p).unwrap(), None);
        for text in ["02/30/1985", "2/30/20", "1985-02-30", "Feb 30, 1985"] {
            assert!(
                matches!(parse_external(text, p), Err(DateError::Nonexistent(_))),
                "{text}"
            );
        }
        assert!(matches!(
            parse_external("yesterday", p),
            Err(DateError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_external("01/01/1700", p),
            Err(DateError::YearOutOfRange(1700))
        ));
    }

    #[test]
    fn pivot() {
        let p = YearPivot::default();
        assert_eq!(p.expand(30), 2030);
        assert_eq!(p.expand(31), 1931);
        assert_eq!(p.expand(0), 2000);
        assert_eq!(YearPivot::new(50).expand(45), 2045);
        assert_eq!(YearPivot::new(200).value(), 99);
    }

    #[test]
    fn typed_date() {
        let d: FileManDate = "2850101".parse().unwrap();
        assert_eq!(d.to_string(), "2850101");
        assert_eq!(d.format(DateStyle::Iso), "1985-01-01");
        assert!(FileManDate::from_date(ymd(2200, 1, 1)).is_err());
        assert!("2850132".parse::<FileManDate>().is_err());
    }
}
