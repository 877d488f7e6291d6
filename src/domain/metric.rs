// Metric catalogue: alias matching, units and default agronomic ranges
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Temperature,
    Humidity,
    Conductivity,
}

impl MetricKind {
    /// Parses a metric key as used in URLs; accepts every alias.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = normalize_metric_name(key);
        match key.as_str() {
            "temperatura" | "temperature" | "temp" => Some(MetricKind::Temperature),
            "humedad" | "humidity" => Some(MetricKind::Humidity),
            "conductividad" | "electroconductividad" | "conductivity" | "ec" => Some(MetricKind::Conductivity),
            _ => None,
        }
    }

    /// Key the dashboard backend uses for this metric.
    pub fn data_key(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperatura",
            MetricKind::Humidity => "humedad",
            MetricKind::Conductivity => "conductividad",
        }
    }

    /// Metric id assumed when a reading's metric has no resolvable name.
    pub fn default_metric_id(&self) -> i64 {
        match self {
            MetricKind::Temperature => 1,
            MetricKind::Humidity => 2,
            MetricKind::Conductivity => 3,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::Humidity => "%",
            MetricKind::Conductivity => "uS/cm",
        }
    }

    fn name_fragments(&self) -> &'static [&'static str] {
        match self {
            MetricKind::Temperature => &["temperatura", "temp"],
            MetricKind::Humidity => &["humedad", "humidity"],
            MetricKind::Conductivity => &["conductividad", "electroconductividad", "conductivity"],
        }
    }

    /// Whether a metric name reported by the backend denotes this kind.
    /// Matching is by substring, so `"Temperatura suelo"` is a temperature.
    pub fn matches_name(&self, raw_name: &str) -> bool {
        let name = normalize_metric_name(raw_name);
        !name.is_empty() && self.name_fragments().iter().any(|f| name.contains(f))
    }

    pub fn default_range(&self) -> MetricRange {
        match self {
            MetricKind::Temperature => MetricRange::new(15.0, 35.0, (20.0, 28.0)),
            MetricKind::Humidity => MetricRange::new(40.0, 90.0, (60.0, 75.0)),
            MetricKind::Conductivity => MetricRange::new(0.5, 2.5, (1.0, 1.8)),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data_key())
    }
}

/// Collapses line breaks, trims and lowercases a metric name.
pub fn normalize_metric_name(raw: &str) -> String {
    raw.replace("\r\n", " ")
        .replace(['\r', '\n'], " ")
        .trim()
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
    pub optimal: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStatus {
    Optimal,
    Warning,
    Critical,
}

impl MetricRange {
    pub fn new(min: f64, max: f64, optimal: (f64, f64)) -> Self {
        Self { min, max, optimal }
    }

    pub fn classify(&self, value: f64) -> MetricStatus {
        let (low, high) = self.optimal;
        if (low..=high).contains(&value) {
            MetricStatus::Optimal
        } else if (self.min..=self.max).contains(&value) {
            MetricStatus::Warning
        } else {
            MetricStatus::Critical
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key_accepts_aliases() {
        assert_eq!(MetricKind::from_key("Temperatura"), Some(MetricKind::Temperature));
        assert_eq!(MetricKind::from_key(" humidity "), Some(MetricKind::Humidity));
        assert_eq!(MetricKind::from_key("EC"), Some(MetricKind::Conductivity));
        assert_eq!(MetricKind::from_key("ph"), None);
    }

    #[test]
    fn test_matches_backend_names() {
        assert!(MetricKind::Temperature.matches_name("Temperatura\r\nAmbiente"));
        assert!(MetricKind::Humidity.matches_name("HUMEDAD relativa"));
        assert!(MetricKind::Conductivity.matches_name("Electroconductividad"));
        assert!(!MetricKind::Temperature.matches_name("Electroconductividad"));
        assert!(!MetricKind::Humidity.matches_name(""));
    }

    #[test]
    fn test_normalize_collapses_line_breaks() {
        assert_eq!(normalize_metric_name("  Humedad\r\nSuelo\n"), "humedad suelo");
    }

    #[test]
    fn test_status_classification() {
        let range = MetricKind::Temperature.default_range();
        assert_eq!(range.classify(24.0), MetricStatus::Optimal);
        assert_eq!(range.classify(30.0), MetricStatus::Warning);
        assert_eq!(range.classify(40.0), MetricStatus::Critical);
        assert_eq!(range.classify(f64::NAN), MetricStatus::Critical);
    }
}
