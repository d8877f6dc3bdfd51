//! # Time Handling
//!
//! Decoding of CF-convention time coordinates (`"minutes since 2018-01-01
//! 00:00:00"`) into [`NaiveDateTime`] values, and parsing of the timestamps
//! users type on the command line or in job files.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display format used for timestamps in logs, labels and exports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const SUPPORTED_CALENDARS: &[&str] = &["standard", "gregorian", "proleptic_gregorian"];

/// Unit of a CF time offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Parse the unit word of a CF `units` string (`"minutes"`, `"min"`, `"h"`, ...).
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "milliseconds" | "millisecond" | "msec" | "ms" => Some(TimeUnit::Milliseconds),
            "seconds" | "second" | "secs" | "sec" | "s" => Some(TimeUnit::Seconds),
            "minutes" | "minute" | "mins" | "min" => Some(TimeUnit::Minutes),
            "hours" | "hour" | "hrs" | "hr" | "h" => Some(TimeUnit::Hours),
            "days" | "day" | "d" => Some(TimeUnit::Days),
            _ => None,
        }
    }

    /// Length of one unit in milliseconds.
    pub fn to_millis_multiplier(&self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 1.0,
            TimeUnit::Seconds => 1e3,
            TimeUnit::Minutes => 60e3,
            TimeUnit::Hours => 3_600e3,
            TimeUnit::Days => 86_400e3,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        f.write_str(word)
    }
}

/// Parsed CF time units: an offset unit and the epoch it counts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: NaiveDateTime,
}

impl TimeUnits {
    /// Parse a CF `units` attribute such as `"minutes since 2018-01-01 00:00:00"`.
    pub fn parse(units: &str) -> Result<Self> {
        let mut parts = units.trim().splitn(3, char::is_whitespace);
        let unit_word = parts.next().unwrap_or_default();
        let since = parts.next().unwrap_or_default();
        let epoch_str = parts.next().unwrap_or_default().trim();

        if !since.eq_ignore_ascii_case("since") || epoch_str.is_empty() {
            return Err(Error::InvalidTime {
                reason: format!("unexpected time units format: '{}'", units),
            });
        }

        let unit = TimeUnit::parse(unit_word).ok_or_else(|| Error::InvalidTime {
            reason: format!("unsupported time unit '{}' in '{}'", unit_word, units),
        })?;
        let epoch = parse_epoch(epoch_str)?;

        Ok(TimeUnits { unit, epoch })
    }

    /// Convert one raw offset into an absolute timestamp, rounded to the millisecond.
    pub fn decode(&self, offset: f64) -> Result<NaiveDateTime> {
        if !offset.is_finite() {
            return Err(Error::InvalidTime {
                reason: format!("non-finite time offset {}", offset),
            });
        }
        let millis = (offset * self.unit.to_millis_multiplier()).round();
        if millis.abs() > i64::MAX as f64 {
            return Err(Error::InvalidTime {
                reason: format!("time offset {} {} overflows", offset, self.unit),
            });
        }
        TimeDelta::try_milliseconds(millis as i64)
            .and_then(|delta| self.epoch.checked_add_signed(delta))
            .ok_or_else(|| Error::InvalidTime {
                reason: format!("time offset {} {} is out of range", offset, self.unit),
            })
    }

    /// Decode every offset of a time coordinate.
    pub fn decode_all(&self, offsets: &[f64]) -> Result<Vec<NaiveDateTime>> {
        offsets.iter().map(|&offset| self.decode(offset)).collect()
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} since {}", self.unit, self.epoch.format(TIMESTAMP_FORMAT))
    }
}

/// Reject non-gregorian calendars; `None` means the CF default (`standard`).
pub fn check_calendar(calendar: Option<&str>) -> Result<()> {
    match calendar {
        None => Ok(()),
        Some(name) if SUPPORTED_CALENDARS.contains(&name.to_ascii_lowercase().as_str()) => Ok(()),
        Some(name) => Err(Error::InvalidTime {
            reason: format!("unsupported calendar '{}'", name),
        }),
    }
}

/// Parse a user-supplied timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM[:SS[.fff]]`, the same with a `T` separator,
/// RFC 3339 (converted to UTC) and a bare date, which means midnight.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();

    for format in DATETIME_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t);
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.naive_utc());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date.and_time(chrono::NaiveTime::MIN));
        }
    }

    Err(Error::InvalidTime {
        reason: format!("cannot parse timestamp '{}'", s),
    })
}

/// Format a timestamp with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_epoch(s: &str) -> Result<NaiveDateTime> {
    // CF epochs may carry a UTC marker; offsets other than zero are rare enough
    // to go through the RFC 3339 path in parse_timestamp.
    let trimmed = s
        .trim_end_matches(" UTC")
        .trim_end_matches(" utc")
        .trim_end_matches('Z')
        .trim_end_matches(" +00:00")
        .trim_end_matches("+00:00");
    parse_timestamp(trimmed)
        .or_else(|_| parse_timestamp(s))
        .or_else(|_| parse_loose_date(trimmed))
        .map_err(|_| Error::InvalidTime {
            reason: format!("failed to parse time units epoch '{}'", s),
        })
}

/// CF allows non-padded epochs such as `2018-1-1 0:0:0`.
fn parse_loose_date(s: &str) -> Result<NaiveDateTime> {
    let mut halves = s.splitn(2, [' ', 'T']);
    let date = halves.next().unwrap_or_default();
    let clock = halves.next().unwrap_or("0:0:0");

    let ymd: Vec<&str> = date.split('-').collect();
    let hms: Vec<&str> = clock.split(':').collect();
    let invalid = || Error::InvalidTime {
        reason: format!("cannot parse timestamp '{}'", s),
    };
    if ymd.len() != 3 || hms.is_empty() || hms.len() > 3 {
        return Err(invalid());
    }

    let year: i32 = ymd[0].parse().map_err(|_| invalid())?;
    let month: u32 = ymd[1].parse().map_err(|_| invalid())?;
    let day: u32 = ymd[2].parse().map_err(|_| invalid())?;
    let hour: u32 = hms[0].parse().map_err(|_| invalid())?;
    let minute: u32 = hms.get(1).map_or(Ok(0), |v| v.parse()).map_err(|_| invalid())?;
    let second: f64 = hms.get(2).map_or(Ok(0.0), |v| v.parse()).map_err(|_| invalid())?;
    // 60 allows a leap second
    if !(0.0..61.0).contains(&second) {
        return Err(invalid());
    }

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .and_then(|t| {
            TimeDelta::try_milliseconds((second * 1e3).round() as i64)
                .and_then(|delta| t.checked_add_signed(delta))
        })
        .ok_or_else(invalid)
}
