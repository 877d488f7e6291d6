// Projects bucketed series onto one shared, chronologically sorted timeline
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::aggregation::Aggregation;
use super::granularity::Granularity;
use super::series::SeriesKey;

/// One point on the chart's x axis. A series without data in this slot has no
/// entry at all; absence is never materialized as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub time: String,
    pub slot: NaiveDateTime,
    pub values: BTreeMap<SeriesKey, f64>,
}

impl ChartRow {
    pub fn new(time: impl Into<String>, slot: NaiveDateTime) -> Self {
        Self {
            time: time.into(),
            slot,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &SeriesKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn has_values(&self) -> bool {
        self.values.values().any(|v| v.is_finite())
    }
}

/// Chart-ready output: rows plus the legend (union of keys across rows).
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDataset {
    pub granularity: Granularity,
    pub refined: bool,
    pub dropped: usize,
    pub rows: Vec<ChartRow>,
}

impl ChartDataset {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            refined: false,
            dropped: 0,
            rows: Vec::new(),
        }
    }

    pub fn series_keys(&self) -> Vec<SeriesKey> {
        let keys: BTreeSet<&SeriesKey> = self.rows.iter().flat_map(|r| r.values.keys()).collect();
        keys.into_iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds one row per distinct slot label, ordered by the truncated instant
/// rather than the label string (so `"9:00"`-style labels cannot misorder).
pub fn unify(aggregation: &Aggregation) -> ChartDataset {
    // Earliest slot per label; labels can repeat across days at fine granularities.
    let mut timeline: HashMap<&str, NaiveDateTime> = HashMap::new();
    for bucket in aggregation.series.values().flatten() {
        timeline
            .entry(bucket.time_label.as_str())
            .and_modify(|slot| *slot = (*slot).min(bucket.slot))
            .or_insert(bucket.slot);
    }

    let mut ordered: Vec<(NaiveDateTime, &str)> = timeline.into_iter().map(|(label, slot)| (slot, label)).collect();
    ordered.sort();

    let lookup: Vec<(&SeriesKey, HashMap<&str, f64>)> = aggregation
        .series
        .iter()
        .map(|(key, buckets)| {
            let by_label = buckets.iter().map(|b| (b.time_label.as_str(), b.value)).collect();
            (key, by_label)
        })
        .collect();

    let rows = ordered
        .into_iter()
        .filter_map(|(slot, label)| {
            let mut row = ChartRow::new(label, slot);
            for (key, by_label) in &lookup {
                if let Some(&value) = by_label.get(label) {
                    row.values.insert((*key).clone(), value);
                }
            }
            row.has_values().then_some(row)
        })
        .collect();

    ChartDataset {
        granularity: aggregation.granularity,
        refined: aggregation.refined,
        dropped: aggregation.dropped,
        rows,
    }
}
