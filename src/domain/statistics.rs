// Fluctuation statistics, threshold recommendations and boxplot summaries
//
// These work on raw readings, never on bucketed rows.
use std::collections::BTreeMap;

use super::reading::{Catalog, Reading};
use super::series::{SeriesKey, SeriesLabeler, disambiguate_labels};

/// Minimum finite values for a recommendation.
pub const MIN_RECOMMENDATION_SAMPLES: usize = 4;

const LOWER_PERCENTILE: f64 = 0.05;
const UPPER_PERCENTILE: f64 = 0.95;
const MARGIN_STD_DEVS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl SeriesSummary {
    /// `None` when no finite values are given.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let avg = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;
        Some(Self {
            count,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg,
            std_dev: variance.sqrt(),
        })
    }
}

/// Suggested operating range for one series. All figures are rounded to two
/// decimals; `recommended_min` is never negative nor above `recommended_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRecommendation {
    pub series_key: SeriesKey,
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std_dev: f64,
    pub recommended_min: f64,
    pub recommended_max: f64,
}

impl ThresholdRecommendation {
    pub fn compute(series_key: SeriesKey, values: &[f64]) -> Option<Self> {
        let summary = SeriesSummary::compute(values)?;
        if summary.count < MIN_RECOMMENDATION_SAMPLES {
            return None;
        }

        let sorted = sorted_finite(values);
        let p5 = sorted[index_at(sorted.len(), LOWER_PERCENTILE, f64::floor)];
        let p95 = sorted[index_at(sorted.len(), UPPER_PERCENTILE, f64::ceil)];
        let margin = summary.std_dev * MARGIN_STD_DEVS;

        let recommended_min = round2((p5 - margin).max(0.0));
        let recommended_max = round2(p95 + margin).max(recommended_min);

        Some(Self {
            series_key,
            sample_count: summary.count,
            min: round2(summary.min),
            max: round2(summary.max),
            avg: round2(summary.avg),
            std_dev: round2(summary.std_dev),
            recommended_min,
            recommended_max,
        })
    }
}

/// Groups readings by series and recommends thresholds for each series with
/// enough data. A series with too few values simply has no entry. Colliding
/// labels are disambiguated exactly as chart series are.
pub fn recommend_thresholds(readings: &[Reading], labeler: &SeriesLabeler<'_>) -> BTreeMap<SeriesKey, ThresholdRecommendation> {
    let mut values_by_series: BTreeMap<SeriesKey, Vec<f64>> = BTreeMap::new();
    for reading in readings {
        if let Some(value) = reading.usable_value() {
            values_by_series
                .entry(labeler.label(&reading.context))
                .or_default()
                .push(value);
        }
    }

    let renames = disambiguate_labels(values_by_series.keys());
    values_by_series
        .into_iter()
        .filter_map(|(key, values)| {
            let key = renames.get(&key).cloned().unwrap_or(key);
            ThresholdRecommendation::compute(key.clone(), &values).map(|rec| (key, rec))
        })
        .collect()
}

/// Quartile summary of one metric, with the offsets a stacked-bar boxplot needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxplotSummary {
    pub metric_id: i64,
    pub metric_name: String,
    pub sample_count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub iqr: f64,
    pub q1_offset: f64,
    pub max_offset: f64,
}

impl BoxplotSummary {
    pub fn compute(metric_id: i64, metric_name: impl Into<String>, values: &[f64]) -> Option<Self> {
        let sorted = sorted_finite(values);
        let n = sorted.len();
        if n == 0 {
            return None;
        }
        let min = sorted[0];
        let max = sorted[n - 1];
        let q1 = sorted[index_at(n, 0.25, f64::floor)];
        let median = sorted[index_at(n, 0.5, f64::floor)];
        let q3 = sorted[index_at(n, 0.75, f64::floor)];
        Some(Self {
            metric_id,
            metric_name: metric_name.into(),
            sample_count: n,
            min,
            q1,
            median,
            q3,
            max,
            iqr: q3 - q1,
            q1_offset: q1 - min,
            max_offset: max - q3,
        })
    }
}

/// One boxplot per metric id present in `readings`, ordered by metric id.
pub fn boxplots(readings: &[Reading], catalog: &Catalog) -> Vec<BoxplotSummary> {
    let mut values_by_metric: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for reading in readings {
        if let (Some(metric_id), Some(value)) = (reading.context.metric_id, reading.usable_value()) {
            values_by_metric.entry(metric_id).or_default().push(value);
        }
    }

    values_by_metric
        .into_iter()
        .filter_map(|(metric_id, values)| {
            let name = catalog
                .metric_name(Some(metric_id))
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| format!("Metric {}", metric_id));
            BoxplotSummary::compute(metric_id, name, &values)
        })
        .collect()
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Index for quantile `q` of `n` sorted values, clamped to the last element.
fn index_at(n: usize, q: f64, round: fn(f64) -> f64) -> usize {
    let raw = round(n as f64 * q).max(0.0) as usize;
    raw.min(n.saturating_sub(1))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregation::Aggregator;
    use crate::domain::granularity::{Granularity, GranularityPolicy};
    use crate::domain::reading::{Location, Metric, Sensor, SensorType, SeriesContext};
    use crate::domain::series::LabelStyle;
    use crate::domain::time::LocalZone;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn reading(sensor_id: i64, metric_id: i64, value: Option<f64>) -> Reading {
        Reading::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
            value,
            SeriesContext {
                location_id: Some(1),
                sensor_id: Some(sensor_id),
                sensor_type_id: None,
                metric_id: Some(metric_id),
            },
        )
    }

    #[test]
    fn test_one_to_ten() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let summary = SeriesSummary::compute(&values).unwrap();
        assert_eq!(summary.avg, 5.5);
        assert!((summary.std_dev - 2.8723).abs() < 1e-4);

        let rec = ThresholdRecommendation::compute(SeriesKey::new("Temp - S1"), &values).unwrap();
        assert_eq!(rec.avg, 5.5);
        assert_eq!(rec.std_dev, 2.87);
        assert_eq!(rec.min, 1.0);
        assert_eq!(rec.max, 10.0);
        // p5 = 1, p95 index 10 clamps to the last element.
        assert_eq!(rec.recommended_min, 0.0);
        assert_eq!(rec.recommended_max, 11.44);
    }

    #[test]
    fn test_recommended_min_above_zero_for_tight_series() {
        let values = [20.0, 20.5, 21.0, 21.5, 22.0, 22.5, 23.0, 23.5];
        let rec = ThresholdRecommendation::compute(SeriesKey::new("x"), &values).unwrap();
        assert!(rec.recommended_min > 19.0 && rec.recommended_min < 20.0);
        assert!(rec.recommended_max > 23.5);
    }

    #[test]
    fn test_insufficient_data_yields_no_entry() {
        assert!(ThresholdRecommendation::compute(SeriesKey::new("x"), &[]).is_none());
        assert!(ThresholdRecommendation::compute(SeriesKey::new("x"), &[1.0, 2.0, 3.0]).is_none());
        assert!(ThresholdRecommendation::compute(SeriesKey::new("x"), &[f64::NAN; 5]).is_none());
        assert!(SeriesSummary::compute(&[]).is_none());
    }

    #[test]
    fn test_negative_series_keeps_bounds_ordered() {
        let values = [-12.0, -11.0, -10.5, -10.0, -9.0];
        let rec = ThresholdRecommendation::compute(SeriesKey::new("freezer"), &values).unwrap();
        assert_eq!(rec.recommended_min, 0.0);
        assert_eq!(rec.recommended_max, 0.0);
    }

    #[test]
    fn test_recommendations_grouped_by_series() {
        let catalog = Catalog::default();
        let labeler = SeriesLabeler::new(&catalog, LabelStyle::Sensor);
        let mut readings: Vec<Reading> = (1..=6).map(|v| reading(1, 1, Some(f64::from(v)))).collect();
        readings.extend([reading(2, 1, Some(1.0)), reading(2, 1, None)]);

        let recs = recommend_thresholds(&readings, &labeler);
        assert_eq!(recs.len(), 1);
        let rec = recs.values().next().unwrap();
        assert_eq!(rec.series_key.display_label, "Sensor 1");
        assert_eq!(rec.sample_count, 6);
    }

    #[test]
    fn test_same_label_sensors_get_chart_legend_keys() {
        let catalog = Catalog::new(
            vec![
                Sensor {
                    id: 12,
                    name: None,
                    sensor_type_id: Some(2),
                },
                Sensor {
                    id: 13,
                    name: None,
                    sensor_type_id: Some(2),
                },
            ],
            vec![SensorType {
                id: 2,
                name: "Hygro".to_string(),
            }],
            vec![],
            vec![Location {
                id: 1,
                name: "Loc".to_string(),
                node_id: Some(7),
            }],
        );
        let labeler = SeriesLabeler::new(&catalog, LabelStyle::WithLocation);
        let readings: Vec<Reading> = (1..=6)
            .flat_map(|v| [reading(12, 1, Some(f64::from(v))), reading(13, 1, Some(f64::from(v) + 10.0))])
            .collect();

        let recs = recommend_thresholds(&readings, &labeler);
        let labels: Vec<&str> = recs.values().map(|r| r.series_key.display_label.as_str()).collect();
        assert_eq!(labels, vec!["Loc (Hygro) (ID: 12)", "Loc (Hygro) (ID: 13)"]);

        let chart = Aggregator::new(&labeler, LocalZone::from_offset_minutes(Some(0)), GranularityPolicy::new(30, 1000))
            .aggregate(&readings, Granularity::Hourly);
        let chart_keys: Vec<&SeriesKey> = chart.series.keys().collect();
        let threshold_keys: Vec<&SeriesKey> = recs.keys().collect();
        assert_eq!(chart_keys, threshold_keys);
    }

    #[test]
    fn test_boxplot_quartiles_per_metric() {
        let catalog = Catalog::new(
            vec![],
            vec![],
            vec![Metric {
                id: 1,
                name: "Temperatura".to_string(),
                unit: Some("°C".to_string()),
            }],
            vec![],
        );
        let mut readings: Vec<Reading> = (1..=8).map(|v| reading(v, 1, Some(f64::from(v as i32)))).collect();
        readings.push(reading(1, 2, Some(50.0)));
        readings.push(reading(1, 3, None));

        let plots = boxplots(&readings, &catalog);
        assert_eq!(plots.len(), 2);
        let temp = &plots[0];
        assert_eq!(temp.metric_name, "Temperatura");
        assert_eq!((temp.min, temp.q1, temp.median, temp.q3, temp.max), (1.0, 3.0, 5.0, 7.0, 8.0));
        assert_eq!(temp.iqr, 4.0);
        assert_eq!(temp.q1_offset, 2.0);
        assert_eq!(temp.max_offset, 1.0);

        let other = &plots[1];
        assert_eq!(other.metric_name, "Metric 2");
        assert_eq!(other.sample_count, 1);
        assert_eq!(other.iqr, 0.0);
    }

    proptest! {
        #[test]
        fn prop_threshold_bounds(values in prop::collection::vec(-1000.0f64..1000.0, 0..300)) {
            match ThresholdRecommendation::compute(SeriesKey::new("p"), &values) {
                Some(rec) => {
                    prop_assert!(rec.recommended_min >= 0.0);
                    prop_assert!(rec.recommended_min <= rec.recommended_max);
                    prop_assert!(rec.min <= rec.max);
                }
                None => prop_assert!(values.len() < MIN_RECOMMENDATION_SAMPLES),
            }
        }
    }
}
