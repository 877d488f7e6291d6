// Local-time handling: calendar date ranges and the zone readings are bucketed in
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use super::error::EngineError;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// The zone in which calendar dates and bucket labels are interpreted.
///
/// Dashboard users think in wall-clock time at the farm, so every date range is
/// midnight-to-midnight in this zone, never in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    System,
    Fixed(FixedOffset),
}

impl LocalZone {
    /// Builds a fixed zone from an offset in minutes east of UTC, falling back
    /// to the system zone when the offset is missing or out of range.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| m.checked_mul(60))
            .and_then(FixedOffset::east_opt)
            .map(LocalZone::Fixed)
            .unwrap_or(LocalZone::System)
    }

    pub fn to_local(&self, instant: &DateTime<Utc>) -> NaiveDateTime {
        match self {
            LocalZone::System => instant.with_timezone(&Local).naive_local(),
            LocalZone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }

    /// Resolves a wall-clock time to an instant. Ambiguous times (DST fold)
    /// take the earlier instant; times inside a DST gap resolve to `None`.
    pub fn from_local(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            LocalZone::System => Local
                .from_local_datetime(local)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            LocalZone::Fixed(offset) => offset
                .from_local_datetime(local)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.to_local(&Utc::now()).date()
    }
}

/// An inclusive range of calendar dates, validated so that `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, EngineError> {
        Self::new(parse_calendar_date(start)?, parse_calendar_date(end)?)
    }

    /// The `days` calendar days ending on (and including) `end`.
    pub fn last_days(end: NaiveDate, days: u32) -> Self {
        let start = end
            .checked_sub_days(chrono::Days::new(u64::from(days)))
            .unwrap_or(end);
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whole days between the boundary dates; the time of day never counts.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_milliseconds() / MILLIS_PER_DAY
    }

    /// Local wall-clock window: start at 00:00:00.000, end at 23:59:59.999.
    pub fn window(&self) -> LocalWindow {
        LocalWindow {
            start: self.start.and_time(NaiveTime::MIN),
            end: self.end.and_time(end_of_day()),
        }
    }

    /// Year used to anchor `DD/MM` labels, which carry no year of their own.
    pub fn anchor_year(&self) -> i32 {
        self.start.year()
    }
}

/// A local wall-clock window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl LocalWindow {
    pub fn contains(&self, local: &NaiveDateTime) -> bool {
        *local >= self.start && *local <= self.end
    }

    pub fn span_hours(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidDate(raw.to_string()))
}
