// Bucket resolution for a chart, chosen from the requested span and point density
use chrono::{NaiveDateTime, TimeDelta, Timelike};

use super::time::DateRange;

/// Default number of raw points above which a short span is charted hourly.
pub const DEFAULT_HOURLY_POINT_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Daily,
    Hourly,
    SubHourly { interval_minutes: u32 },
}

/// Knobs that differ between call sites. Per-metric mini charts and the
/// multi-metric analysis chart use different sub-hourly widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GranularityPolicy {
    sub_hourly_minutes: u32,
    hourly_point_threshold: usize,
}

impl GranularityPolicy {
    /// `sub_hourly_minutes` is clamped to 1..=60.
    pub fn new(sub_hourly_minutes: u32, hourly_point_threshold: usize) -> Self {
        Self {
            sub_hourly_minutes: sub_hourly_minutes.clamp(1, 60),
            hourly_point_threshold,
        }
    }

    pub fn sub_hourly(&self) -> Granularity {
        Granularity::SubHourly {
            interval_minutes: self.sub_hourly_minutes,
        }
    }
}

impl Granularity {
    /// Selects the granularity for a calendar date range.
    pub fn select(range: &DateRange, raw_point_count: Option<usize>, policy: &GranularityPolicy) -> Self {
        Self::from_span(
            range.span_days(),
            range.window().span_hours(),
            raw_point_count,
            policy,
        )
    }

    /// Selects the granularity for an arbitrary instant-to-instant span.
    pub fn for_duration(span: TimeDelta, raw_point_count: Option<usize>, policy: &GranularityPolicy) -> Self {
        Self::from_span(
            span.num_days(),
            span.num_milliseconds() as f64 / 3_600_000.0,
            raw_point_count,
            policy,
        )
    }

    fn from_span(
        span_days: i64,
        span_hours: f64,
        raw_point_count: Option<usize>,
        policy: &GranularityPolicy,
    ) -> Self {
        if span_days >= 2 {
            return Granularity::Daily;
        }
        let dense = raw_point_count.is_some_and(|count| count > policy.hourly_point_threshold);
        if span_hours >= 48.0 || dense {
            return Granularity::Hourly;
        }
        policy.sub_hourly()
    }

    /// One step finer, or `None` when already sub-hourly.
    pub fn finer(&self, policy: &GranularityPolicy) -> Option<Self> {
        match self {
            Granularity::Daily => Some(Granularity::Hourly),
            Granularity::Hourly => Some(policy.sub_hourly()),
            Granularity::SubHourly { .. } => None,
        }
    }

    /// Start of the slot that `local` falls into.
    pub fn truncate(&self, local: &NaiveDateTime) -> NaiveDateTime {
        let date = local.date();
        let slot = match self {
            Granularity::Daily => date.and_hms_opt(0, 0, 0),
            Granularity::Hourly => date.and_hms_opt(local.hour(), 0, 0),
            Granularity::SubHourly { interval_minutes } => {
                let width = (*interval_minutes).clamp(1, 60);
                date.and_hms_opt(local.hour(), local.minute() / width * width, 0)
            }
        };
        slot.unwrap_or(*local)
    }

    /// `DD/MM`, `HH:00` or `HH:MM`.
    pub fn label(&self, slot: &NaiveDateTime) -> String {
        match self {
            Granularity::Daily => slot.format("%d/%m").to_string(),
            Granularity::Hourly => slot.format("%H:00").to_string(),
            Granularity::SubHourly { .. } => slot.format("%H:%M").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn policy(minutes: u32) -> GranularityPolicy {
        GranularityPolicy::new(minutes, DEFAULT_HOURLY_POINT_THRESHOLD)
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 27)
            .unwrap()
    }

    #[test]
    fn test_multi_day_ranges_are_daily() {
        let p = policy(15);
        for days in 2..=10 {
            let end = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() + TimeDelta::days(days);
            let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), end).unwrap();
            assert_eq!(Granularity::select(&range, Some(50_000), &p), Granularity::Daily);
        }
    }

    #[test]
    fn test_short_ranges_depend_on_density() {
        let p = policy(15);
        let one_day = DateRange::parse("2024-06-01", "2024-06-02").unwrap();
        assert_eq!(
            Granularity::select(&one_day, Some(1000), &p),
            Granularity::SubHourly { interval_minutes: 15 }
        );
        assert_eq!(Granularity::select(&one_day, Some(1001), &p), Granularity::Hourly);
        assert_eq!(
            Granularity::select(&one_day, None, &policy(30)),
            Granularity::SubHourly { interval_minutes: 30 }
        );
    }

    #[test]
    fn test_duration_spans() {
        let p = policy(15);
        for minutes in [0, 1, 30, 59, 60] {
            assert_eq!(
                Granularity::for_duration(TimeDelta::minutes(minutes), Some(1000), &p),
                Granularity::SubHourly { interval_minutes: 15 }
            );
        }
        assert_eq!(
            Granularity::for_duration(TimeDelta::hours(2), Some(3), &p),
            Granularity::SubHourly { interval_minutes: 15 }
        );
        assert_eq!(
            Granularity::for_duration(TimeDelta::days(5), Some(400), &p),
            Granularity::Daily
        );
    }

    #[test]
    fn test_finer_steps_once() {
        let p = policy(30);
        assert_eq!(Granularity::Daily.finer(&p), Some(Granularity::Hourly));
        assert_eq!(Granularity::Hourly.finer(&p), Some(p.sub_hourly()));
        assert_eq!(p.sub_hourly().finer(&p), None);
    }

    #[test]
    fn test_truncate_and_label() {
        let quarter = Granularity::SubHourly { interval_minutes: 15 };
        assert_eq!(quarter.label(&quarter.truncate(&at(9, 3))), "09:00");
        assert_eq!(quarter.label(&quarter.truncate(&at(9, 41))), "09:30");
        assert_eq!(quarter.label(&quarter.truncate(&at(23, 59))), "23:45");

        let half = Granularity::SubHourly { interval_minutes: 30 };
        assert_eq!(half.label(&half.truncate(&at(9, 41))), "09:30");

        assert_eq!(Granularity::Hourly.label(&Granularity::Hourly.truncate(&at(9, 41))), "09:00");
        assert_eq!(Granularity::Daily.label(&Granularity::Daily.truncate(&at(9, 41))), "03/06");
        assert_eq!(Granularity::Daily.truncate(&at(9, 41)), at(0, 0).with_second(0).unwrap());
    }
}
