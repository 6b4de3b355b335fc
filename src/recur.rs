//! RRULE/RDATE/EXDATE parsing and occurrence expansion.
//!
//! The supported RRULE vocabulary is FREQ (DAILY, WEEKLY, MONTHLY, YEARLY),
//! INTERVAL, COUNT, UNTIL, BYDAY, BYMONTHDAY, BYMONTH, BYSETPOS and WKST.
//! Expansion happens in the task's own wall-clock space: occurrences keep
//! the start's time of day and are converted back to absolute timestamps by
//! the caller, which keeps "daily at 9:00" at 9:00 across DST changes.

use crate::error::{Error, Result};
use crate::time::{parse_datetime, TaskTime};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, Weekday};
use std::collections::BTreeSet;

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freq {
    /// Every `interval` days.
    Daily,
    /// Every `interval` weeks.
    Weekly,
    /// Every `interval` months.
    Monthly,
    /// Every `interval` years.
    Yearly,
}

/// A BYDAY part: an optional ordinal (`2MO`, `-1FR`) and a weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByDay {
    /// Week ordinal within the month, negative counting from the end.
    pub ordinal: Option<i32>,
    /// The weekday.
    pub weekday: Weekday,
}

/// A parsed RRULE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    /// The base frequency.
    pub freq: Freq,
    /// The interval between periods, at least 1.
    pub interval: u32,
    /// Maximum number of rule occurrences, counting the start.
    pub count: Option<u32>,
    /// Inclusive end bound, with a flag marking UTC (`...Z`) readings.
    pub until: Option<(NaiveDateTime, bool)>,
    /// BYDAY parts.
    pub by_day: Vec<ByDay>,
    /// BYMONTHDAY parts, negative counting from the end of the month.
    pub by_month_day: Vec<i32>,
    /// BYMONTH parts, 1-12.
    pub by_month: Vec<u32>,
    /// BYSETPOS parts, 1-based, negative from the end.
    pub by_set_pos: Vec<i32>,
    /// Week start for WEEKLY expansion.
    pub wkst: Weekday,
}

/// Expansion stops after this many occurrences for unbounded rules.
pub const MAX_OCCURRENCES: usize = 1000;

/// Periods scanned without a match before a rule is considered exhausted.
const MAX_EMPTY_PERIODS: usize = 1000;

impl RecurrenceRule {
    /// Parse an RRULE string such as `FREQ=DAILY;COUNT=3`.
    ///
    /// # Errors
    ///
    /// Returns a validation error on malformed or unsupported input.
    pub fn parse(text: &str) -> Result<Self> {
        let mut freq = None;
        let mut rule = Self {
            freq: Freq::Daily,
            interval: 1,
            count: None,
            until: None,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            by_set_pos: Vec::new(),
            wkst: Weekday::Mon,
        };
        for part in text.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::validation(format!("malformed RRULE part '{part}'")))?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(match value.to_ascii_uppercase().as_str() {
                        "DAILY" => Freq::Daily,
                        "WEEKLY" => Freq::Weekly,
                        "MONTHLY" => Freq::Monthly,
                        "YEARLY" => Freq::Yearly,
                        other => {
                            return Err(Error::validation(format!("unsupported FREQ '{other}'")))
                        }
                    });
                }
                "INTERVAL" => {
                    rule.interval = value
                        .parse::<u32>()
                        .ok()
                        .filter(|i| *i >= 1)
                        .ok_or_else(|| Error::validation(format!("invalid INTERVAL '{value}'")))?;
                }
                "COUNT" => {
                    rule.count = Some(value.parse::<u32>().ok().filter(|c| *c >= 1).ok_or_else(
                        || Error::validation(format!("invalid COUNT '{value}'")),
                    )?);
                }
                "UNTIL" => {
                    let is_utc = value.ends_with('Z');
                    let parsed = parse_datetime(value, None, false)
                        .map_err(|_| Error::validation(format!("invalid UNTIL '{value}'")))?;
                    rule.until = Some((parsed.naive(), is_utc));
                }
                "BYDAY" => {
                    for entry in value.split(',') {
                        rule.by_day.push(parse_by_day(entry)?);
                    }
                }
                "BYMONTHDAY" => {
                    for entry in value.split(',') {
                        let day = entry.parse::<i32>().ok().filter(|d| {
                            (1..=31).contains(&d.abs()) }).ok_or_else(|| {
                            Error::validation(format!("invalid BYMONTHDAY '{entry}'"))
                        })?;
                        rule.by_month_day.push(day);
                    }
                }
                "BYMONTH" => {
                    for entry in value.split(',') {
                        let month =
                            entry.parse::<u32>().ok().filter(|m| (1..=12).contains(m)).ok_or_else(
                                || Error::validation(format!("invalid BYMONTH '{entry}'")),
                            )?;
                        rule.by_month.push(month);
                    }
                }
                "BYSETPOS" => {
                    for entry in value.split(',') {
                        let pos = entry.parse::<i32>().ok().filter(|p| *p != 0).ok_or_else(
                            || Error::validation(format!("invalid BYSETPOS '{entry}'")),
                        )?;
                        rule.by_set_pos.push(pos);
                    }
                }
                "WKST" => rule.wkst = parse_weekday(value)?,
                other => {
                    return Err(Error::validation(format!("unsupported RRULE part '{other}'")))
                }
            }
        }
        rule.freq = freq.ok_or_else(|| Error::validation("RRULE is missing FREQ"))?;
        if rule.count.is_some() && rule.until.is_some() {
            return Err(Error::validation("RRULE has both COUNT and UNTIL"));
        }
        Ok(rule)
    }

    /// Expand the rule from `start`, in wall-clock space.
    ///
    /// The start itself is always the first occurrence and counts toward
    /// COUNT, per RFC5545. At most `cap` occurrences are produced.
    ///
    /// # Errors
    ///
    /// Returns a consistency error when the expansion state overflows the
    /// calendar range.
    pub fn expand(&self, start: NaiveDateTime, cap: usize) -> Result<Vec<NaiveDateTime>> {
        let mut out = vec![start];
        let limit = self.count.map_or(cap, |c| cap.min(c as usize));
        let until = self.until.map(|(naive, _)| naive);
        let mut empty_periods = 0_usize;

        for period in 0.. {
            if out.len() >= limit {
                break;
            }
            if empty_periods > MAX_EMPTY_PERIODS {
                break;
            }
            let candidates = self.candidates(start, period)?;
            let mut produced = false;
            for candidate in candidates {
                if candidate <= start {
                    // instances before the start are ignored; the start
                    // itself is already in the set
                    produced |= candidate == start;
                    continue;
                }
                if let Some(until) = until {
                    if candidate > until {
                        return Ok(out);
                    }
                }
                produced = true;
                out.push(candidate);
                if out.len() >= limit {
                    return Ok(out);
                }
            }
            if produced {
                empty_periods = 0;
            } else {
                empty_periods += 1;
            }
        }
        Ok(out)
    }

    /// The sorted candidate set of period number `period`.
    fn candidates(&self, start: NaiveDateTime, period: u64) -> Result<Vec<NaiveDateTime>> {
        let overflow = || Error::consistency("recurrence expansion left the calendar range");
        let time = start.time();
        let step = u64::from(self.interval) * period;
        let mut dates: Vec<NaiveDate> = match self.freq {
            Freq::Daily => {
                let date = start.date().checked_add_days(Days::new(step)).ok_or_else(overflow)?;
                let ok = self.month_matches(date)
                    && self.month_day_matches(date)
                    && (self.by_day.is_empty()
                        || self.by_day.iter().any(|d| d.weekday == date.weekday()));
                if ok {
                    vec![date]
                } else {
                    vec![]
                }
            }
            Freq::Weekly => {
                if self.by_day.is_empty() {
                    let date = start
                        .date()
                        .checked_add_days(Days::new(step * 7))
                        .ok_or_else(overflow)?;
                    vec![date]
                } else {
                    let since_wkst =
                        u64::from((7 + start.date().weekday().num_days_from_monday()
                            - self.wkst.num_days_from_monday())
                            % 7);
                    let week_start = start
                        .date()
                        .checked_sub_days(Days::new(since_wkst))
                        .and_then(|d| d.checked_add_days(Days::new(step * 7)))
                        .ok_or_else(overflow)?;
                    let mut days: Vec<NaiveDate> = (0..7)
                        .filter_map(|offset| week_start.checked_add_days(Days::new(offset)))
                        .filter(|d| self.by_day.iter().any(|bd| bd.weekday == d.weekday()))
                        .collect();
                    days.retain(|d| self.month_matches(*d));
                    days
                }
            }
            Freq::Monthly => {
                let month_start = first_of_month(start.date())
                    .checked_add_months(Months::new(u32::try_from(step).map_err(|_| overflow())?))
                    .ok_or_else(overflow)?;
                if self.month_matches(month_start) {
                    self.days_in_month(month_start, start.date().day())
                } else {
                    vec![]
                }
            }
            Freq::Yearly => {
                let year_start = start
                    .date()
                    .with_day(1)
                    .and_then(|d| d.with_month(1))
                    .and_then(|d| {
                        d.checked_add_months(Months::new(
                            u32::try_from(step * 12).ok()?,
                        ))
                    })
                    .ok_or_else(overflow)?;
                let months: Vec<u32> = if self.by_month.is_empty() {
                    vec![start.date().month()]
                } else {
                    self.by_month.clone()
                };
                let mut days = Vec::new();
                for month in months {
                    if let Some(month_start) = year_start.with_month(month) {
                        days.extend(self.days_in_month(month_start, start.date().day()));
                    }
                }
                days.sort_unstable();
                days
            }
        };
        dates = apply_set_pos(dates, &self.by_set_pos);
        Ok(dates.into_iter().map(|d| d.and_time(time)).collect())
    }

    /// Candidate days within the month starting at `month_start`.
    fn days_in_month(&self, month_start: NaiveDate, start_day: u32) -> Vec<NaiveDate> {
        let len = month_length(month_start);
        let mut days: Vec<NaiveDate> = if self.by_month_day.is_empty() {
            if self.by_day.is_empty() {
                // same day-of-month as the start; months too short skip it
                month_start.with_day(start_day).into_iter().collect()
            } else {
                let matching: Vec<NaiveDate> = (1..=len)
                    .filter_map(|day| month_start.with_day(day))
                    .filter(|d| self.by_day.iter().any(|bd| bd.weekday == d.weekday()))
                    .collect();
                self.by_day
                    .iter()
                    .flat_map(|bd| {
                        let of_weekday: Vec<NaiveDate> = matching
                            .iter()
                            .copied()
                            .filter(|d| d.weekday() == bd.weekday)
                            .collect();
                        match bd.ordinal {
                            None => of_weekday,
                            Some(n) => pick_ordinal(&of_weekday, n).into_iter().collect(),
                        }
                    })
                    .collect()
            }
        } else {
            self.by_month_day
                .iter()
                .filter_map(|md| {
                    let day = if *md > 0 {
                        u32::try_from(*md).ok()?
                    } else {
                        u32::try_from(i64::from(len) + 1 + i64::from(*md)).ok()?
                    };
                    month_start.with_day(day)
                })
                .filter(|d| {
                    self.by_day.is_empty()
                        || self.by_day.iter().any(|bd| bd.weekday == d.weekday())
                })
                .collect()
        };
        days.sort_unstable();
        days.dedup();
        days
    }

    fn month_matches(&self, date: NaiveDate) -> bool {
        self.by_month.is_empty() || self.by_month.contains(&date.month())
    }

    fn month_day_matches(&self, date: NaiveDate) -> bool {
        if self.by_month_day.is_empty() {
            return true;
        }
        let len = i64::from(month_length(date));
        self.by_month_day.iter().any(|md| {
            i64::from(date.day())
                == if *md > 0 { i64::from(*md) } else { len + 1 + i64::from(*md) }
        })
    }
}

fn parse_by_day(entry: &str) -> Result<ByDay> {
    let bad = || Error::validation(format!("invalid BYDAY '{entry}'"));
    if !entry.is_ascii() || entry.len() < 2 {
        return Err(bad());
    }
    let day_part = &entry[entry.len().saturating_sub(2)..];
    let ordinal_part = &entry[..entry.len().saturating_sub(2)];
    let weekday = parse_weekday(day_part)?;
    let ordinal = if ordinal_part.is_empty() {
        None
    } else {
        Some(
            ordinal_part
                .parse::<i32>()
                .ok()
                .filter(|o| *o != 0 && o.abs() <= 5)
                .ok_or_else(bad)?,
        )
    };
    Ok(ByDay { ordinal, weekday })
}

fn parse_weekday(text: &str) -> Result<Weekday> {
    match text.to_ascii_uppercase().as_str() {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(Error::validation(format!("invalid weekday '{other}'"))),
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn month_length(date: NaiveDate) -> u32 {
    let first = first_of_month(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.signed_duration_since(first).num_days().try_into().ok())
        .unwrap_or(31)
}

fn pick_ordinal(sorted: &[NaiveDate], ordinal: i32) -> Option<NaiveDate> {
    if ordinal > 0 {
        sorted.get(usize::try_from(ordinal).ok()? - 1).copied()
    } else {
        let back = usize::try_from(-ordinal).ok()?;
        sorted.len().checked_sub(back).map(|i| sorted[i])
    }
}

fn apply_set_pos(sorted: Vec<NaiveDate>, set_pos: &[i32]) -> Vec<NaiveDate> {
    if set_pos.is_empty() || sorted.is_empty() {
        return sorted;
    }
    let mut picked: Vec<NaiveDate> = set_pos
        .iter()
        .filter_map(|pos| {
            if *pos > 0 {
                sorted.get(usize::try_from(*pos).ok()? - 1).copied()
            } else {
                let back = usize::try_from(-*pos).ok()?;
                sorted.len().checked_sub(back).map(|i| sorted[i])
            }
        })
        .collect();
    picked.sort_unstable();
    picked.dedup();
    picked
}

/// A full recurrence set: optional rule plus RDATE and EXDATE lists.
#[derive(Debug, Clone, Default)]
pub struct RecurrenceSet {
    /// The RRULE, if any.
    pub rule: Option<RecurrenceRule>,
    /// Extra occurrence times.
    pub rdates: Vec<TaskTime>,
    /// Excluded occurrence times.
    pub exdates: Vec<TaskTime>,
}

impl RecurrenceSet {
    /// Whether the set produces anything beyond the plain start.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.rule.is_some() || !self.rdates.is_empty()
    }

    /// All occurrence times from `start`: (RDATE ∪ RRULE) \ EXDATE, sorted,
    /// each at most once, capped at [`MAX_OCCURRENCES`].
    ///
    /// # Errors
    ///
    /// Returns a consistency error when rule expansion fails.
    pub fn occurrences(&self, start: TaskTime) -> Result<Vec<TaskTime>> {
        let mut naive_set: BTreeSet<NaiveDateTime> = BTreeSet::new();
        if let Some(rule) = &self.rule {
            let mut rule = rule.clone();
            if let (Some((until, true)), Some(tz)) = (rule.until, start.tz()) {
                // a UTC bound applies at the same instant in the task's zone
                let local =
                    TaskTime::timed(until.and_utc().timestamp_millis(), Some(tz)).naive();
                rule.until = Some((local, false));
            }
            naive_set.extend(rule.expand(start.naive(), MAX_OCCURRENCES)?);
        } else {
            naive_set.insert(start.naive());
        }
        naive_set.extend(self.rdates.iter().map(TaskTime::naive));
        for ex in &self.exdates {
            naive_set.remove(&ex.naive());
        }
        Ok(naive_set.into_iter().take(MAX_OCCURRENCES).map(|n| start.with_naive(n)).collect())
    }
}

/// Parse a comma-separated RDATE/EXDATE list in the task's zone.
///
/// # Errors
///
/// Returns a validation error on malformed entries.
pub fn parse_datetime_list(
    text: &str,
    tz: Option<chrono_tz::Tz>,
    all_day: bool,
) -> Result<Vec<TaskTime>> {
    text.split(',')
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_datetime(entry, tz, all_day))
        .collect()
}
