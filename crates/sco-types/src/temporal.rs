use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const NANOS_PER_SECOND: u32 = 1_000_000_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

/// A point in time with nanosecond precision, as stored in SQL timestamp columns.
///
/// The instant is kept as whole seconds since the UNIX epoch plus a
/// nanosecond fraction. [`Timestamp::millis`] folds the millisecond part of
/// the fraction back in, and [`Timestamp::set_millis`] replaces the fraction
/// with the millisecond remainder, matching SQL timestamp semantics.
///
/// Ordering: `secs` → `nanos` (total order by instant).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Create a timestamp from seconds and a nanosecond fraction.
    pub fn new(secs: i64, nanos: u32) -> Result<Self, TypeError> {
        if nanos >= NANOS_PER_SECOND {
            return Err(TypeError::NanosOutOfRange(i64::from(nanos)));
        }
        Ok(Self { secs, nanos })
    }

    /// Create a timestamp from milliseconds since the epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self {
            secs: millis.div_euclid(1000),
            nanos: millis.rem_euclid(1000) as u32 * NANOS_PER_MILLI,
        }
    }

    /// The UNIX epoch.
    pub const fn epoch() -> Self {
        Self { secs: 0, nanos: 0 }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            secs: now.timestamp(),
            nanos: now.timestamp_subsec_nanos().min(NANOS_PER_SECOND - 1),
        }
    }

    /// Milliseconds since the epoch, including the millisecond part of the nanos.
    pub fn millis(&self) -> i64 {
        self.secs * 1000 + i64::from(self.nanos / NANOS_PER_MILLI)
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Replace the instant; the fraction becomes the millisecond remainder.
    pub fn set_millis(&mut self, millis: i64) {
        *self = Self::from_millis(millis);
    }

    /// Replace the nanosecond fraction, keeping the whole seconds.
    pub fn set_nanos(&mut self, nanos: u32) -> Result<(), TypeError> {
        if nanos >= NANOS_PER_SECOND {
            return Err(TypeError::NanosOutOfRange(i64::from(nanos)));
        }
        self.nanos = nanos;
        Ok(())
    }

    /// The instant as a UTC date-time.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, TypeError> {
        DateTime::<Utc>::from_timestamp(self.secs, self.nanos)
            .ok_or(TypeError::InstantOutOfRange(self.secs))
    }

    fn set_calendar_field(
        &mut self,
        field: &'static str,
        value: i64,
        apply: impl FnOnce(DateTime<Utc>) -> Option<DateTime<Utc>>,
    ) -> Result<(), TypeError> {
        let updated = apply(self.to_datetime()?).ok_or(TypeError::InvalidField { field, value })?;
        self.secs = updated.timestamp();
        Ok(())
    }

    /// Set the calendar year (UTC).
    pub fn set_year(&mut self, year: i32) -> Result<(), TypeError> {
        self.set_calendar_field("year", i64::from(year), |dt| dt.with_year(year))
    }

    /// Set the month of the year, 1 to 12 (UTC).
    pub fn set_month(&mut self, month: u32) -> Result<(), TypeError> {
        self.set_calendar_field("month", i64::from(month), |dt| dt.with_month(month))
    }

    /// Set the day of the month, starting at 1 (UTC).
    pub fn set_day(&mut self, day: u32) -> Result<(), TypeError> {
        self.set_calendar_field("day", i64::from(day), |dt| dt.with_day(day))
    }

    /// Set the hour of the day, 0 to 23 (UTC).
    pub fn set_hours(&mut self, hours: u32) -> Result<(), TypeError> {
        self.set_calendar_field("hours", i64::from(hours), |dt| dt.with_hour(hours))
    }

    pub fn set_minutes(&mut self, minutes: u32) -> Result<(), TypeError> {
        self.set_calendar_field("minutes", i64::from(minutes), |dt| dt.with_minute(minutes))
    }

    pub fn set_seconds(&mut self, seconds: u32) -> Result<(), TypeError> {
        self.set_calendar_field("seconds", i64::from(seconds), |dt| dt.with_second(seconds))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}s.{:09})", self.secs, self.nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(dt) = self.to_datetime() else {
            return write!(f, "{}s.{:09}", self.secs, self.nanos);
        };
        let fraction = format!("{:09}", self.nanos);
        let fraction = fraction.trim_end_matches('0');
        write!(
            f,
            "{}.{}",
            dt.format("%Y-%m-%d %H:%M:%S"),
            if fraction.is_empty() { "0" } else { fraction }
        )
    }
}

/// Parses `yyyy-mm-dd hh:mm:ss[.fffffffff]` in UTC.
///
/// Any run of non-digits separates fields, so `2024/03/01T10:00:00` is
/// accepted as well. A fraction shorter than nine digits is right-padded.
impl FromStr for Timestamp {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidTimestamp(s.to_string());
        let groups: Vec<&str> = s
            .split(|c: char| !c.is_ascii_digit())
            .filter(|g| !g.is_empty())
            .collect();
        if groups.len() < 6 || groups.len() > 7 {
            return Err(invalid());
        }

        let number = |g: &str| g.parse::<u32>().map_err(|_| invalid());
        let year = groups[0].parse::<i32>().map_err(|_| invalid())?;
        let nanos = match groups.get(6) {
            Some(fraction) if fraction.len() <= 9 => number(format!("{fraction:0<9}").as_str())?,
            Some(_) => return Err(invalid()),
            None => 0,
        };

        let (month, day) = (number(groups[1])?, number(groups[2])?);
        let (hour, minute, second) = (number(groups[3])?, number(groups[4])?, number(groups[5])?);
        let datetime = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or_else(invalid)?;
        Self::new(datetime.and_utc().timestamp(), nanos)
    }
}
