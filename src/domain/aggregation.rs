// Time-bucketing: folds readings into per-series running means
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

use super::granularity::{Granularity, GranularityPolicy};
use super::reading::Reading;
use super::series::{SeriesKey, SeriesLabeler, disambiguate_labels};
use super::time::LocalZone;

/// Fewest usable readings for which a degenerate result is refined.
const REFINE_MIN_READINGS: usize = 3;
/// Bucket count per series at or below which a result counts as degenerate.
const REFINE_MAX_BUCKETS: usize = 2;

/// The aggregated value of one series within one time slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Truncated local instant of the first reading folded into this bucket.
    pub slot: NaiveDateTime,
    pub time_label: String,
    pub value: f64,
    pub sample_count: usize,
}

impl Bucket {
    fn new(slot: NaiveDateTime, time_label: String, value: f64) -> Self {
        Self {
            slot,
            time_label,
            value,
            sample_count: 1,
        }
    }

    fn fold(&mut self, incoming: f64) {
        let count = self.sample_count as f64;
        self.value = (self.value * count + incoming) / (count + 1.0);
        self.sample_count += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Granularity actually used, after any refinement.
    pub granularity: Granularity,
    pub refined: bool,
    pub series: BTreeMap<SeriesKey, Vec<Bucket>>,
    /// Readings without a location identity.
    pub dropped: usize,
    /// Readings that took part in bucketing.
    pub used: usize,
}

impl Aggregation {
    fn is_degenerate(&self) -> bool {
        self.used >= REFINE_MIN_READINGS
            && self
                .series
                .values()
                .all(|buckets| buckets.len() <= REFINE_MAX_BUCKETS)
    }
}

pub struct Aggregator<'a> {
    labeler: &'a SeriesLabeler<'a>,
    zone: LocalZone,
    policy: GranularityPolicy,
}

impl<'a> Aggregator<'a> {
    pub fn new(labeler: &'a SeriesLabeler<'a>, zone: LocalZone, policy: GranularityPolicy) -> Self {
        Self {
            labeler,
            zone,
            policy,
        }
    }

    /// Buckets `readings` at `granularity`. When every series ends up with at
    /// most two buckets, re-runs exactly once at the next finer granularity.
    pub fn aggregate(&self, readings: &[Reading], granularity: Granularity) -> Aggregation {
        let first = self.bucket(readings, granularity);
        if !first.is_degenerate() {
            return first;
        }
        match granularity.finer(&self.policy) {
            Some(finer) => Aggregation {
                refined: true,
                ..self.bucket(readings, finer)
            },
            None => first,
        }
    }

    fn bucket(&self, readings: &[Reading], granularity: Granularity) -> Aggregation {
        let mut series: BTreeMap<SeriesKey, Vec<Bucket>> = BTreeMap::new();
        let mut slots: HashMap<SeriesKey, HashMap<String, usize>> = HashMap::new();
        let mut dropped = 0;
        let mut used = 0;

        for reading in readings {
            let Some(value) = reading.usable_value() else {
                continue;
            };
            if reading.context.location_id.is_none() {
                dropped += 1;
                continue;
            }

            let key = self.labeler.label(&reading.context);
            let slot = granularity.truncate(&self.zone.to_local(&reading.timestamp));
            let time_label = granularity.label(&slot);

            let buckets = series.entry(key.clone()).or_default();
            let index = slots.entry(key).or_default();
            match index.get(&time_label) {
                Some(&i) => buckets[i].fold(value),
                None => {
                    index.insert(time_label.clone(), buckets.len());
                    buckets.push(Bucket::new(slot, time_label, value));
                }
            }
            used += 1;
        }

        for buckets in series.values_mut() {
            buckets.sort_by_key(|b| b.slot);
        }

        Aggregation {
            granularity,
            refined: false,
            series: relabel_collisions(series),
            dropped,
            used,
        }
    }
}

fn relabel_collisions(series: BTreeMap<SeriesKey, Vec<Bucket>>) -> BTreeMap<SeriesKey, Vec<Bucket>> {
    let renames = disambiguate_labels(series.keys());
    if renames.is_empty() {
        return series;
    }
    series
        .into_iter()
        .map(|(key, buckets)| match renames.get(&key) {
            Some(renamed) => (renamed.clone(), buckets),
            None => (key, buckets),
        })
        .collect()
}
