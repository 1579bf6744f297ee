//! Relative Time Parser
//!
//! Turns rendered age phrases ("3 hours ago", "just now") into absolute
//! instants against a caller-supplied reference time. Month and year
//! subtraction follow the calendar (`Jan 31 - 1 month = Dec 31`,
//! `Mar 31 - 1 month = Feb 28/29`), never a fixed-length approximation.
//!
//! Also parses the machine timestamp some sources attach to the age
//! element's `title` attribute.

use chrono::{DateTime, Days, Duration, Months, NaiveDateTime, TimeZone, Utc};

/// Unit accepted in "<N> <unit> ago"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeUnit {
    fn parse(word: &str) -> Option<Self> {
        let singular = word.strip_suffix('s').unwrap_or(word);
        match singular {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

/// Why a phrase could not be turned into an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelativeTimeError {
    /// Empty or whitespace-only input
    Empty,
    /// Phrase does not match any accepted pattern
    Unrecognized(String),
    /// Count is not a positive integer
    InvalidCount(String),
    /// Unit word outside minute/hour/day/month/year
    UnknownUnit(String),
    /// Subtraction left the representable calendar range
    OutOfRange,
}

impl std::fmt::Display for RelativeTimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty time text"),
            Self::Unrecognized(text) => write!(f, "unrecognized time text: {:?}", text),
            Self::InvalidCount(count) => write!(f, "invalid count {:?} (expected positive integer)", count),
            Self::UnknownUnit(unit) => write!(f, "unknown time unit: {:?}", unit),
            Self::OutOfRange => write!(f, "time offset out of calendar range"),
        }
    }
}

impl std::error::Error for RelativeTimeError {}

/// Parse "just now" / "now" / "<N> <unit>[s] ago".
///
/// Case and whitespace insensitive. Failure means "timestamp unavailable";
/// callers must never substitute a default instant.
pub fn parse_relative_time(
    text: &str,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>, RelativeTimeError> {
    let normalized = text.trim().to_lowercase();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    match tokens.as_slice() {
        [] => Err(RelativeTimeError::Empty),
        ["now"] | ["just", "now"] => Ok(reference),
        [count, unit, "ago"] => {
            let n: u32 = count
                .parse()
                .map_err(|_| RelativeTimeError::InvalidCount(count.to_string()))?;
            if n == 0 {
                return Err(RelativeTimeError::InvalidCount(count.to_string()));
            }
            let unit = TimeUnit::parse(unit)
                .ok_or_else(|| RelativeTimeError::UnknownUnit(unit.to_string()))?;
            subtract(reference, n, unit)
        }
        _ => Err(RelativeTimeError::Unrecognized(text.trim().to_string())),
    }
}

fn subtract(
    reference: DateTime<Utc>,
    n: u32,
    unit: TimeUnit,
) -> Result<DateTime<Utc>, RelativeTimeError> {
    let result = match unit {
        TimeUnit::Minute => reference.checked_sub_signed(Duration::minutes(i64::from(n))),
        TimeUnit::Hour => reference.checked_sub_signed(Duration::hours(i64::from(n))),
        TimeUnit::Day => reference.checked_sub_days(Days::new(u64::from(n))),
        TimeUnit::Month => reference.checked_sub_months(Months::new(n)),
        TimeUnit::Year => n
            .checked_mul(12)
            .and_then(|months| reference.checked_sub_months(Months::new(months))),
    };
    result.ok_or(RelativeTimeError::OutOfRange)
}

/// Parse an age element's `title` attribute.
///
/// Accepts `2024-01-01T12:00:00`, `2024-01-01T12:00:00 1704110400` (the
/// trailing epoch wins when present) and RFC 3339.
pub fn parse_timestamp_attribute(value: &str) -> Option<DateTime<Utc>> {
    let mut parts = value.split_whitespace();
    let iso = parts.next()?;

    if let Some(epoch) = parts.next().and_then(|s| s.parse::<i64>().ok()) {
        if let Some(ts) = Utc.timestamp_opt(epoch, 0).single() {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(iso) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
