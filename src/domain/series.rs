// Series identity: turns a reading's context into a stable, human-readable key
use std::collections::HashMap;
use std::fmt;

use super::reading::{Catalog, SeriesContext};

const DEFAULT_TYPE_LABEL: &str = "Sensor";
const COMPARISON_PREFIX: &str = "comp_";

/// Structured identity of one chart line.
///
/// Ordering is by display label first, so a sorted key set is also the legend
/// order. The wire name (see `Display`) adds the `comp_` prefix for series that
/// come from the comparison node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub display_label: String,
    pub sensor_type_id: Option<i64>,
    pub sensor_id: Option<i64>,
    pub location_id: Option<i64>,
    pub is_comparison: bool,
}

impl SeriesKey {
    pub fn new(display_label: impl Into<String>) -> Self {
        Self {
            display_label: display_label.into(),
            sensor_type_id: None,
            sensor_id: None,
            location_id: None,
            is_comparison: false,
        }
    }

    pub fn as_comparison(&self) -> Self {
        Self {
            is_comparison: true,
            ..self.clone()
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_comparison {
            write!(f, "{}{}", COMPARISON_PREFIX, self.display_label)
        } else {
            f.write_str(&self.display_label)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelStyle {
    /// `"<type> - <sensor>"`, used by the per-metric mini charts.
    Sensor,
    /// `"<location> (<type> - <sensor>)"`, used by the detailed analysis chart.
    WithLocation,
}

pub struct SeriesLabeler<'a> {
    catalog: &'a Catalog,
    style: LabelStyle,
}

impl<'a> SeriesLabeler<'a> {
    pub fn new(catalog: &'a Catalog, style: LabelStyle) -> Self {
        Self { catalog, style }
    }

    /// Never fails: missing sensors or types degrade to fallback labels.
    pub fn label(&self, context: &SeriesContext) -> SeriesKey {
        let (sensor_label, sensor_type_id) = self.sensor_label(context);

        match (self.style, context.location_id) {
            (LabelStyle::WithLocation, Some(location_id)) => {
                let location = self
                    .catalog
                    .locations
                    .get(&location_id)
                    .map(|l| l.name.trim())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Point {}", location_id));
                SeriesKey {
                    display_label: format!("{} ({})", location, sensor_label),
                    sensor_type_id,
                    sensor_id: context.sensor_id,
                    location_id: Some(location_id),
                    is_comparison: false,
                }
            }
            _ => SeriesKey {
                display_label: sensor_label,
                sensor_type_id,
                sensor_id: context.sensor_id,
                location_id: None,
                is_comparison: false,
            },
        }
    }

    fn sensor_label(&self, context: &SeriesContext) -> (String, Option<i64>) {
        let Some(sensor_id) = context.sensor_id else {
            let type_name = self.type_name(context.sensor_type_id);
            return (
                type_name.unwrap_or(DEFAULT_TYPE_LABEL).to_string(),
                context.sensor_type_id,
            );
        };

        let Some(sensor) = self.catalog.sensors.get(&sensor_id) else {
            let label = match self.type_name(context.sensor_type_id) {
                Some(type_name) => format!("{} (ID: {})", type_name, sensor_id),
                None => format!("{} {}", DEFAULT_TYPE_LABEL, sensor_id),
            };
            return (label, context.sensor_type_id);
        };

        let type_id = sensor.sensor_type_id.or(context.sensor_type_id);
        let type_name = self.type_name(type_id).unwrap_or(DEFAULT_TYPE_LABEL);
        let sensor_name = sensor.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let label = match sensor_name {
            Some(name) if name.eq_ignore_ascii_case(type_name) => {
                format!("{} (ID: {})", type_name, sensor_id)
            }
            Some(name) => format!("{} - {}", type_name, name),
            None => type_name.to_string(),
        };
        (label, type_id)
    }

    fn type_name(&self, type_id: Option<i64>) -> Option<&'a str> {
        type_id
            .and_then(|id| self.catalog.sensor_types.get(&id))
            .map(|t| t.name.trim())
            .filter(|name| !name.is_empty())
    }
}

/// Distinct keys that render to the same label would overwrite each other in
/// a chart row. Appends the sensor id to every colliding key that has one.
pub fn disambiguate_labels<'k>(keys: impl IntoIterator<Item = &'k SeriesKey>) -> HashMap<SeriesKey, SeriesKey> {
    let mut by_label: HashMap<&str, Vec<&SeriesKey>> = HashMap::new();
    for key in keys {
        let group = by_label.entry(key.display_label.as_str()).or_default();
        if !group.contains(&key) {
            group.push(key);
        }
    }

    let mut renames = HashMap::new();
    for group in by_label.values().filter(|g| g.len() > 1) {
        for key in group {
            if let Some(sensor_id) = key.sensor_id {
                let suffix = format!("(ID: {})", sensor_id);
                if key.display_label.ends_with(&suffix) {
                    continue;
                }
                let mut renamed = (*key).clone();
                renamed.display_label = format!("{} {}", key.display_label, suffix);
                renames.insert((*key).clone(), renamed);
            }
        }
    }
    renames
}
