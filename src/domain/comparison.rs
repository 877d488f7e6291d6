// Overlays a comparison node's chart onto the main node's chart
use chrono::NaiveDate;
use std::collections::HashMap;

use super::reading::Reading;
use super::time::DateRange;
use super::timeline::{ChartDataset, ChartRow};

/// Merges two independently unified row sets on label equality.
///
/// Main rows are copied as-is; comparison series are added under their
/// `comp_` identity and never overwrite a key already present in the row.
pub fn merge_rows(main_rows: &[ChartRow], comparison_rows: &[ChartRow], range: &DateRange) -> Vec<ChartRow> {
    let mut merged: Vec<ChartRow> = main_rows.to_vec();
    let mut by_label: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, row)| (row.time.clone(), i))
        .collect();

    for comparison in comparison_rows {
        let index = match by_label.get(&comparison.time) {
            Some(&i) => i,
            None => {
                merged.push(ChartRow::new(comparison.time.clone(), comparison.slot));
                by_label.insert(comparison.time.clone(), merged.len() - 1);
                merged.len() - 1
            }
        };
        let row = &mut merged[index];
        for (key, value) in &comparison.values {
            row.values.entry(key.as_comparison()).or_insert(*value);
        }
    }

    merged.retain(ChartRow::has_values);
    merged.sort_by_cached_key(|row| LabelOrder::of(&row.time, range));
    merged
}

/// Merges two datasets; the result reports the main side's granularity.
pub fn merge_datasets(main: &ChartDataset, comparison: &ChartDataset, range: &DateRange) -> ChartDataset {
    ChartDataset {
        granularity: main.granularity,
        refined: main.refined || comparison.refined,
        dropped: main.dropped + comparison.dropped,
        rows: merge_rows(&main.rows, &comparison.rows, range),
    }
}

/// Sort key for merged labels. `DD/MM` is dated against the analysis window
/// (rolling into the next year for windows that cross New Year); zero-padded
/// `HH:MM` sorts lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LabelOrder {
    Date(NaiveDate),
    Clock(String),
    Other(String),
}

impl LabelOrder {
    fn of(label: &str, range: &DateRange) -> Self {
        if let Some((day, month)) = split_pair(label, '/') {
            let year = range.anchor_year();
            let dated = NaiveDate::from_ymd_opt(year, month, day)
                .filter(|d| *d >= range.start())
                .or_else(|| NaiveDate::from_ymd_opt(year + 1, month, day));
            if let Some(date) = dated {
                return LabelOrder::Date(date);
            }
        }
        if split_pair(label, ':').is_some_and(|(h, m)| h < 24 && m < 60) {
            return LabelOrder::Clock(label.to_string());
        }
        LabelOrder::Other(label.to_string())
    }
}

fn split_pair(label: &str, separator: char) -> Option<(u32, u32)> {
    let (left, right) = label.split_once(separator)?;
    if left.len() != 2 || right.len() != 2 {
        return None;
    }
    Some((left.parse().ok()?, right.parse().ok()?))
}

/// Side-by-side means of two nodes' readings for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComparisonStats {
    pub main_avg: Option<f64>,
    pub comparison_avg: Option<f64>,
    pub difference: Option<f64>,
    pub percent_difference: Option<f64>,
}

impl ComparisonStats {
    /// All fields are `None` unless both sides have usable values.
    pub fn between(main: &[Reading], comparison: &[Reading]) -> Self {
        let (Some(main_avg), Some(comparison_avg)) = (mean(main), mean(comparison)) else {
            return Self::default();
        };
        let difference = comparison_avg - main_avg;
        let percent_difference = (main_avg != 0.0).then(|| difference / main_avg * 100.0);
        Self {
            main_avg: Some(main_avg),
            comparison_avg: Some(comparison_avg),
            difference: Some(difference),
            percent_difference,
        }
    }
}

fn mean(readings: &[Reading]) -> Option<f64> {
    let (sum, count) = readings
        .iter()
        .filter_map(Reading::usable_value)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
