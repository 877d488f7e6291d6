// Restricts a fetched reading set to one analysis window and, optionally, one metric
use super::metric::MetricKind;
use super::reading::{Catalog, Reading};
use super::time::{LocalWindow, LocalZone};

pub struct ReadingSelection<'a> {
    catalog: &'a Catalog,
    zone: LocalZone,
    window: LocalWindow,
    metric: Option<MetricKind>,
}

impl<'a> ReadingSelection<'a> {
    pub fn new(catalog: &'a Catalog, zone: LocalZone, window: LocalWindow) -> Self {
        Self {
            catalog,
            zone,
            window,
            metric: None,
        }
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn selects(&self, reading: &Reading) -> bool {
        if !self.window.contains(&self.zone.to_local(&reading.timestamp)) {
            return false;
        }
        match self.metric {
            None => true,
            Some(kind) => match self.catalog.metric_name(reading.context.metric_id) {
                Some(name) => kind.matches_name(name),
                None => reading.context.metric_id == Some(kind.default_metric_id()),
            },
        }
    }

    /// Selected readings, sorted by timestamp.
    pub fn apply(&self, readings: &[Reading]) -> Vec<Reading> {
        let mut selected: Vec<Reading> = readings.iter().filter(|r| self.selects(r)).cloned().collect();
        selected.sort_by_key(|r| r.timestamp);
        selected
    }
}

/// Most recent reading with a usable value.
pub fn latest_reading(readings: &[Reading]) -> Option<&Reading> {
    readings
        .iter()
        .filter(|r| r.usable_value().is_some())
        .max_by_key(|r| r.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reading::{Metric, SeriesContext};
    use crate::domain::time::DateRange;
    use chrono::{TimeZone, Utc};

    fn catalog() -> Catalog {
        Catalog::new(
            vec![],
            vec![],
            vec![
                Metric {
                    id: 7,
                    name: "Temperatura\nSuelo".to_string(),
                    unit: None,
                },
                Metric {
                    id: 8,
                    name: "Humedad".to_string(),
                    unit: None,
                },
            ],
            vec![],
        )
    }

    fn reading(day: u32, hour: u32, metric_id: Option<i64>) -> Reading {
        Reading::new(
            Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap(),
            Some(1.0),
            SeriesContext {
                location_id: Some(1),
                sensor_id: Some(1),
                sensor_type_id: None,
                metric_id,
            },
        )
    }

    #[test]
    fn test_window_and_metric_filtering() {
        let catalog = catalog();
        let zone = LocalZone::from_offset_minutes(Some(0));
        let window = DateRange::parse("2024-06-03", "2024-06-04").unwrap().window();
        let selection = ReadingSelection::new(&catalog, zone, window).with_metric(MetricKind::Temperature);

        let readings = vec![
            reading(4, 23, Some(7)),
            reading(3, 0, Some(7)),
            reading(2, 23, Some(7)),
            reading(5, 0, Some(7)),
            reading(3, 12, Some(8)),
            reading(3, 12, Some(1)),
            reading(3, 12, Some(2)),
        ];
        let selected = selection.apply(&readings);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].timestamp, readings[1].timestamp);
        assert_eq!(selected[1].context.metric_id, Some(1));
    }

    #[test]
    fn test_window_uses_local_zone() {
        let catalog = catalog();
        let zone = LocalZone::from_offset_minutes(Some(-300));
        let window = DateRange::parse("2024-06-03", "2024-06-03").unwrap().window();
        let selection = ReadingSelection::new(&catalog, zone, window);
        // 04:00 UTC on the 4th is 23:00 local on the 3rd.
        assert!(selection.selects(&reading(4, 4, None)));
        assert!(!selection.selects(&reading(3, 4, None)));
    }

    #[test]
    fn test_latest_reading_skips_nulls() {
        let mut newest = reading(5, 0, None);
        newest.value = None;
        let readings = vec![reading(3, 0, None), newest, reading(4, 0, None)];
        assert_eq!(latest_reading(&readings).unwrap().timestamp, readings[2].timestamp);
        assert!(latest_reading(&[]).is_none());
    }
}
