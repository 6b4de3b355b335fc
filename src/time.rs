//! Date-time handling for tasks.
//!
//! Task times carry three pieces of state: an absolute timestamp, an
//! optional named timezone and an all-day flag. A `null` timezone means
//! *floating* time, interpreted in the viewer's local zone; all-day values
//! are pure dates. Both floating and all-day values are encoded as the
//! naive wall-clock reading taken as UTC, so equal wall-clock readings
//! compare equal regardless of the zone they are viewed from.

use crate::error::{Error, Result};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Milliseconds per day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// A point in time as stored on a task: timestamp, optional timezone and
/// all-day flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTime {
    millis: i64,
    tz: Option<Tz>,
    all_day: bool,
}

impl TaskTime {
    /// A timed value. With a timezone the timestamp is absolute UTC
    /// milliseconds; without one it is a floating wall-clock reading.
    #[must_use]
    pub const fn timed(millis: i64, tz: Option<Tz>) -> Self {
        Self { millis, tz, all_day: false }
    }

    /// An all-day value. The timestamp must be the date's midnight.
    #[must_use]
    pub const fn all_day(millis: i64) -> Self {
        Self { millis, tz: None, all_day: true }
    }

    /// Build a value from its stored column triple.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown timezone identifier.
    pub fn from_columns(millis: i64, tz: Option<&str>, all_day: bool) -> Result<Self> {
        if all_day {
            return Ok(Self::all_day(millis));
        }
        let tz = tz.map(parse_tz).transpose()?;
        Ok(Self::timed(millis, tz))
    }

    /// The stored timestamp in milliseconds.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.millis
    }

    /// The timezone identifier to store, or `None` for floating and all-day
    /// values.
    #[must_use]
    pub fn tz_name(&self) -> Option<&'static str> {
        if self.all_day {
            None
        } else {
            self.tz.map(Tz::name)
        }
    }

    /// Whether this is an all-day value.
    #[must_use]
    pub const fn is_all_day(&self) -> bool {
        self.all_day
    }

    /// The timezone, if the value carries one.
    #[must_use]
    pub const fn tz(&self) -> Option<Tz> {
        if self.all_day {
            None
        } else {
            self.tz
        }
    }

    /// Whether this is a floating (zone-less, non-all-day) value.
    #[must_use]
    pub const fn is_floating(&self) -> bool {
        self.tz.is_none() && !self.all_day
    }

    /// Whether the timestamp sits exactly on a midnight boundary.
    ///
    /// All-day values are required to be aligned like this.
    #[must_use]
    pub const fn is_midnight_aligned(&self) -> bool {
        self.millis.rem_euclid(MILLIS_PER_DAY) == 0
    }

    /// The wall-clock reading of this value in its own zone.
    ///
    /// For all-day and floating values this is the stored reading itself;
    /// for zoned values the timestamp is shifted into the zone first.
    #[must_use]
    pub fn naive(&self) -> NaiveDateTime {
        match (self.all_day, self.tz) {
            (false, Some(tz)) => utc(self.millis).with_timezone(&tz).naive_local(),
            _ => utc(self.millis).naive_utc(),
        }
    }

    /// Rebuild this value from a new wall-clock reading, keeping the zone
    /// and all-day flag.
    #[must_use]
    pub fn with_naive(&self, naive: NaiveDateTime) -> Self {
        let millis = match (self.all_day, self.tz) {
            (false, Some(tz)) => resolve_local(tz, naive).timestamp_millis(),
            _ => naive.and_utc().timestamp_millis(),
        };
        Self { millis, ..*self }
    }

    /// The value shifted by an absolute number of milliseconds.
    #[must_use]
    pub const fn plus_millis(&self, delta: i64) -> Self {
        Self { millis: self.millis + delta, ..*self }
    }

    /// An opaque sorting surrogate.
    ///
    /// The surrogate is the local wall-clock reading encoded as
    /// milliseconds: all-day and floating values keep their stored reading,
    /// zoned values are shifted into `local` first. Ordering by the
    /// surrogate interleaves all-day occurrences (midnight to midnight in
    /// any viewer zone) correctly with timed ones; the numeric value itself
    /// carries no meaning.
    #[must_use]
    pub fn sort_key(&self, local: Tz) -> i64 {
        match (self.all_day, self.tz) {
            (false, Some(_)) => {
                utc(self.millis).with_timezone(&local).naive_local().and_utc().timestamp_millis()
            }
            _ => self.millis,
        }
    }
}

/// Parse a timezone identifier.
///
/// # Errors
///
/// Returns a validation error for identifiers not in the tz database.
pub fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| Error::validation(format!("unknown timezone '{name}'")))
}

fn utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Resolve a wall-clock reading in a zone, stepping over DST gaps.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => {
            // a nonexistent reading inside a DST gap; an hour later is valid
            let shifted = naive + chrono::Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
                LocalResult::None => tz.from_utc_datetime(&naive),
            }
        }
    }
}

/// An RFC5545 duration, e.g. `P2W`, `P1DT12H`, `-PT15M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskDuration {
    negative: bool,
    weeks: u32,
    days: u32,
    hours: u32,
    minutes: u32,
    seconds: u32,
}

impl TaskDuration {
    /// Parse an RFC5545 duration string.
    ///
    /// # Errors
    ///
    /// Returns a validation error on malformed input.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = || Error::validation(format!("malformed duration '{text}'"));
        let mut rest = text;
        let negative = match rest.as_bytes().first() {
            Some(b'-') => {
                rest = &rest[1..];
                true
            }
            Some(b'+') => {
                rest = &rest[1..];
                false
            }
            _ => false,
        };
        let mut chars = rest.chars();
        if chars.next() != Some('P') {
            return Err(bad());
        }
        let mut result = Self { negative, ..Self::default() };
        let mut in_time = false;
        let mut value: Option<u32> = None;
        let mut any_unit = false;
        for c in chars {
            match c {
                '0'..='9' => {
                    let digit = u32::from(c as u8 - b'0');
                    value = Some(
                        value
                            .unwrap_or(0)
                            .checked_mul(10)
                            .and_then(|v| v.checked_add(digit))
                            .ok_or_else(|| bad())?,
                    );
                }
                'T' if value.is_none() => in_time = true,
                'W' | 'D' | 'H' | 'M' | 'S' => {
                    let v = value.take().ok_or_else(|| bad())?;
                    any_unit = true;
                    match (c, in_time) {
                        ('W', false) => result.weeks = v,
                        ('D', false) => result.days = v,
                        ('H', true) => result.hours = v,
                        ('M', true) => result.minutes = v,
                        ('S', true) => result.seconds = v,
                        _ => return Err(bad()),
                    }
                }
                _ => return Err(bad()),
            }
        }
        if value.is_some() || !any_unit {
            return Err(bad());
        }
        Ok(result)
    }

    /// The total length in milliseconds (negative for negative durations).
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        let days = i64::from(self.weeks) * 7 + i64::from(self.days);
        let seconds = i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60
            + i64::from(self.seconds);
        let total = days * MILLIS_PER_DAY + seconds * 1000;
        if self.negative {
            -total
        } else {
            total
        }
    }

    /// Whether the duration has no time-of-day component.
    ///
    /// All-day tasks may only carry date-only durations.
    #[must_use]
    pub const fn is_date_only(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

impl std::fmt::Display for TaskDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        if self.weeks > 0 && self.days == 0 && self.is_date_only() {
            return write!(f, "{}W", self.weeks);
        }
        // weeks mixed with anything else fold into days
        let days = self.weeks * 7 + self.days;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if !self.is_date_only() {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        } else if days == 0 {
            write!(f, "T0S")?;
        }
        Ok(())
    }
}

/// Parse an RFC5545 date or date-time literal, e.g. `20240215`,
/// `20240215T093000` or `20240215T093000Z`.
///
/// Zone-less readings are interpreted in `tz` when one is given, otherwise
/// as floating time. `Z` readings are absolute UTC.
///
/// # Errors
///
/// Returns a validation error on malformed input.
pub fn parse_datetime(text: &str, tz: Option<Tz>, all_day: bool) -> Result<TaskTime> {
    let bad = || Error::validation(format!("malformed date-time '{text}'"));
    let (body, is_utc) = match text.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (text, false),
    };
    let naive = if body.len() == 8 {
        chrono::NaiveDate::parse_from_str(body, "%Y%m%d")
            .map_err(|_| bad())?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(bad)?
    } else {
        NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S").map_err(|_| bad())?
    };
    if all_day {
        if naive.hour() != 0 || naive.minute() != 0 || naive.second() != 0 {
            return Err(Error::validation(format!("all-day date-time '{text}' has a time part")));
        }
        return Ok(TaskTime::all_day(naive.and_utc().timestamp_millis()));
    }
    let millis = match (is_utc, tz) {
        (true, _) => naive.and_utc().timestamp_millis(),
        (false, Some(tz)) => resolve_local(tz, naive).timestamp_millis(),
        (false, None) => naive.and_utc().timestamp_millis(),
    };
    Ok(TaskTime::timed(millis, tz))
}

/// Format a [`TaskTime`] as an RFC5545 literal in its own zone.
#[must_use]
pub fn format_datetime(time: &TaskTime) -> String {
    let naive = time.naive();
    if time.is_all_day() {
        naive.format("%Y%m%d").to_string()
    } else if time.is_floating() {
        naive.format("%Y%m%dT%H%M%S").to_string()
    } else {
        // zoned values serialize as UTC so the reading stays unambiguous
        utc(time.timestamp()).naive_utc().format("%Y%m%dT%H%M%SZ").to_string()
    }
}
