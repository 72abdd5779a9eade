//! Expiration input resolution and canonical bucket timestamps.
//!
//! Everything is naive local time. Resolved instants that do not fall on the
//! current calendar day are truncated to midnight, so only same-day
//! expirations keep second precision. Durations are the exception: they are
//! applied to "now" as-is.

use crate::constants::{TIMESTAMP_FORMAT, TIMESTAMP_WIDTH};
use crate::error::{KeyringError, Result};
use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Anything that can be turned into an expiration instant.
#[derive(Debug, Clone, PartialEq)]
pub enum Expiration {
    /// `in <N> <unit>` or an absolute date string.
    Text(String),
    /// UNIX timestamp in seconds.
    Timestamp(i64),
    /// UNIX timestamp with a fractional part.
    FractionalTimestamp(f64),
    /// Offset from now.
    Duration(Duration),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
}

impl Expiration {
    /// Interpret a command-line argument: all digits is an epoch, digits with a
    /// single dot is a fractional epoch, anything else is a date string.
    pub fn from_arg(arg: &str) -> Self {
        let arg = arg.trim();
        let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if is_digits(arg) {
            if let Ok(secs) = arg.parse::<i64>() {
                return Expiration::Timestamp(secs);
            }
        }
        if let Some((whole, frac)) = arg.split_once('.') {
            if is_digits(whole) && is_digits(frac) {
                if let Ok(secs) = arg.parse::<f64>() {
                    return Expiration::FractionalTimestamp(secs);
                }
            }
        }
        Expiration::Text(arg.to_string())
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiration::Text(s) => write!(f, "{}", s),
            Expiration::Timestamp(t) => write!(f, "{}", t),
            Expiration::FractionalTimestamp(t) => write!(f, "{}", t),
            Expiration::Duration(d) => write!(f, "now + {}s", d.num_seconds()),
            Expiration::DateTime(dt) => write!(f, "{}", dt),
            Expiration::Date(d) => write!(f, "{}", d),
        }
    }
}

impl From<&str> for Expiration {
    fn from(s: &str) -> Self {
        Expiration::Text(s.to_string())
    }
}

impl From<String> for Expiration {
    fn from(s: String) -> Self {
        Expiration::Text(s)
    }
}

impl From<i64> for Expiration {
    fn from(t: i64) -> Self {
        Expiration::Timestamp(t)
    }
}

impl From<f64> for Expiration {
    fn from(t: f64) -> Self {
        Expiration::FractionalTimestamp(t)
    }
}

impl From<Duration> for Expiration {
    fn from(d: Duration) -> Self {
        Expiration::Duration(d)
    }
}

impl From<NaiveDateTime> for Expiration {
    fn from(dt: NaiveDateTime) -> Self {
        Expiration::DateTime(dt)
    }
}

impl From<NaiveDate> for Expiration {
    fn from(d: NaiveDate) -> Self {
        Expiration::Date(d)
    }
}

impl From<DateTime<Local>> for Expiration {
    fn from(dt: DateTime<Local>) -> Self {
        Expiration::DateTime(dt.naive_local())
    }
}

fn relative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*in\s+(\d+)\s+([a-z]+)\s*$").expect("relative date pattern compiles")
    })
}

/// Parse `in <N> <unit>` into an offset. Months are 30 days, years 365.
pub fn relative_offset(phrase: &str) -> Option<Duration> {
    let caps = relative_pattern().captures(phrase)?;
    let count: i64 = caps[1].parse().ok()?;
    let unit = caps[2].to_ascii_lowercase();
    let unit = unit.strip_suffix('s').unwrap_or(&unit);
    let unit_secs: i64 = match unit {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 7 * 86_400,
        "month" => 30 * 86_400,
        "year" => 365 * 86_400,
        _ => return None,
    };
    Duration::try_seconds(count.checked_mul(unit_secs)?)
}

/// Resolve `input` against `now` into a second-precision instant.
pub fn resolve(input: &Expiration, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let invalid = || KeyringError::InvalidDateFormat(input.to_string());

    let resolved = match input {
        Expiration::Text(text) => {
            let text = text.trim();
            if text.to_ascii_lowercase().starts_with("in ") {
                let offset = relative_offset(text).ok_or_else(invalid)?;
                now.checked_add_signed(offset).ok_or_else(invalid)?
            } else {
                parse_absolute(text, now).ok_or_else(invalid)?
            }
        }
        Expiration::Timestamp(secs) => Local
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(invalid)?
            .naive_local(),
        Expiration::FractionalTimestamp(secs) => {
            if !secs.is_finite() {
                return Err(invalid());
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            Local
                .timestamp_opt(whole as i64, nanos.min(999_999_999))
                .single()
                .ok_or_else(invalid)?
                .naive_local()
        }
        Expiration::Duration(d) => {
            let at = now.checked_add_signed(*d).ok_or_else(invalid)?;
            return finish(at, input);
        }
        Expiration::DateTime(dt) => *dt,
        Expiration::Date(d) => d.and_time(NaiveTime::MIN),
    };

    let resolved = if resolved.date() != now.date() {
        resolved.date().and_time(NaiveTime::MIN)
    } else {
        resolved
    };
    finish(resolved, input)
}

fn finish(at: NaiveDateTime, input: &Expiration) -> Result<NaiveDateTime> {
    // canonical timestamps are fixed-width, which bounds the year to four digits
    if !(1000..=9999).contains(&at.year()) {
        return Err(KeyringError::InvalidDateFormat(input.to_string()));
    }
    Ok(at.with_nanosecond(0).unwrap_or(at))
}

fn parse_absolute(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    match text.to_ascii_lowercase().as_str() {
        "" => return None,
        "now" => return Some(now),
        "today" => return Some(now.date().and_time(NaiveTime::MIN)),
        "tomorrow" => return now.date().succ_opt().map(|d| d.and_time(NaiveTime::MIN)),
        _ => {}
    }
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::MIN));
    }
    dateparser::parse_with_timezone(text, &Local)
        .ok()
        .map(|utc| utc.with_timezone(&Local).naive_local())
}

/// Render an instant as the fixed-width bucket key `YYYYMMDDHHMMSS`.
pub fn canonicalize(instant: NaiveDateTime) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a bucket key produced by [`canonicalize`].
pub fn parse_canonical(timestamp: &str) -> Result<NaiveDateTime> {
    if timestamp.len() != TIMESTAMP_WIDTH || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyringError::InvalidDateFormat(timestamp.to_string()));
    }
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| KeyringError::InvalidDateFormat(timestamp.to_string()))
}
