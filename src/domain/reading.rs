// Raw measurement records and the reference tables they point into
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Identity of the series a reading belongs to. Any field may be missing
/// when the backend returns a partially expanded record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SeriesContext {
    pub location_id: Option<i64>,
    pub sensor_id: Option<i64>,
    pub sensor_type_id: Option<i64>,
    pub metric_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub context: SeriesContext,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>, context: SeriesContext) -> Self {
        Self {
            timestamp,
            value,
            context,
        }
    }

    /// The value if it can take part in aggregation (present and finite).
    pub fn usable_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: i64,
    pub name: Option<String>,
    pub sensor_type_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: i64,
    pub name: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub node_id: Option<i64>,
}

/// Immutable lookup tables used to label series. Tables may be empty while
/// the reference data is still loading; labelling degrades instead of failing.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub sensors: HashMap<i64, Sensor>,
    pub sensor_types: HashMap<i64, SensorType>,
    pub metrics: HashMap<i64, Metric>,
    pub locations: HashMap<i64, Location>,
}

impl Catalog {
    pub fn new(
        sensors: Vec<Sensor>,
        sensor_types: Vec<SensorType>,
        metrics: Vec<Metric>,
        locations: Vec<Location>,
    ) -> Self {
        Self {
            sensors: sensors.into_iter().map(|s| (s.id, s)).collect(),
            sensor_types: sensor_types.into_iter().map(|t| (t.id, t)).collect(),
            metrics: metrics.into_iter().map(|m| (m.id, m)).collect(),
            locations: locations.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    pub fn metric_name(&self, metric_id: Option<i64>) -> Option<&str> {
        metric_id
            .and_then(|id| self.metrics.get(&id))
            .map(|m| m.name.as_str())
    }

    /// False while any lookup table is still empty.
    pub fn is_complete(&self) -> bool {
        !(self.sensors.is_empty() || self.sensor_types.is_empty() || self.metrics.is_empty() || self.locations.is_empty())
    }
}
