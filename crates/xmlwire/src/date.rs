//! # ISO-8601 Date Codec
//!
//! The `dateTime.iso8601` sub-format.
//!
//! ## Invariants
//! - **Literal Fields**: Decoding keeps the wall-clock fields exactly as written.
//!   A `Z` or `+HH:MM` suffix is recognized but never applied as an offset.
//! - **Fixed Width**: Encoding always produces `YYYYMMDDTHH:MM:SS`.

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;
use crate::error::Result;

static ISO8601: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^\s*([0-9]{4})",
        r"(?:-?([0-9]{2})",
        r"(?:-?([0-9]{2})",
        r"(?:T([0-9]{2}):([0-9]{2})",
        r"(?::([0-9]{2})(?:\.([0-9]+))?)?",
        r"(?:Z|[-+][0-9]{2}:[0-9]{2})?",
        r")?)?)?",
    ))
    .expect("ISO-8601 pattern is valid")
});

/// Calendar fields of a wire date.
///
/// `month` is 1-based (January is 1). Fields absent from decoded text keep
/// the `Default` values: January 1st, midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

impl Default for DateTime {
    fn default() -> Self {
        Self { year: 1970, month: 1, day: 1, hour: 0, minute: 0, second: 0, millisecond: 0 }
    }
}

impl DateTime {
    /// A date at midnight.
    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day, ..Self::default() }
    }

    /// Sets the wall-clock time, keeping the date.
    pub fn with_hms(self, hour: u32, minute: u32, second: u32) -> Self {
        Self { hour, minute, second, ..self }
    }

    /// Zero-based month index (January is 0).
    pub fn month0(&self) -> u32 {
        self.month.saturating_sub(1)
    }

    /// Converts to a chrono value, `None` if the fields do not form a real date.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_milli_opt(
            self.hour,
            self.minute,
            self.second,
            self.millisecond,
        )
    }
}

impl From<NaiveDateTime> for DateTime {
    fn from(dt: NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            // leap seconds carry nanoseconds past 1e9
            millisecond: (dt.nanosecond() / 1_000_000).min(999),
        }
    }
}

/// Decodes `YYYY[-]MM[-]DD[THH:MM[:SS[.fraction]]][Z|±HH:MM]`.
///
/// # Errors
/// Returns `Error::MalformedDate` if the text does not start with a four-digit year.
pub fn decode(text: &str) -> Result<DateTime> {
    let caps = ISO8601
        .captures(text)
        .ok_or_else(|| Error::MalformedDate(text.to_string()))?;

    let field = |idx: usize| caps.get(idx).map(|m| m.as_str());
    let number = |idx: usize| field(idx).and_then(|s| s.parse::<u32>().ok());

    let year = field(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::MalformedDate(text.to_string()))?;

    let mut date = DateTime { year, ..DateTime::default() };
    if let Some(month) = number(2) {
        date.month = month;
    }
    if let Some(day) = number(3) {
        date.day = day;
    }
    if let Some(hour) = number(4) {
        date.hour = hour;
    }
    if let Some(minute) = number(5) {
        date.minute = minute;
    }
    if let Some(second) = number(6) {
        date.second = second;
    }
    if let Some(fraction) = field(7) {
        date.millisecond = fraction_to_millis(fraction);
    }
    Ok(date)
}

/// Encodes as `YYYYMMDDTHH:MM:SS`. No timezone, no fraction.
pub fn encode(date: &DateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}:{:02}:{:02}",
        date.year, date.month, date.day, date.hour, date.minute, date.second
    )
}

// `0.<digits>` seconds, truncated to whole milliseconds
fn fraction_to_millis(digits: &str) -> u32 {
    digits
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(3)
        .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}
