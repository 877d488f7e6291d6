// Mapper to convert chart and analysis results to their JSON wire types
use crate::application::chart_service::{LatestValue, MetricChart, ThresholdReport};
use crate::domain::comparison::ComparisonStats;
use crate::domain::granularity::Granularity;
use crate::domain::metric::MetricStatus;
use crate::domain::statistics::{BoxplotSummary, ThresholdRecommendation};
use crate::domain::series::SeriesKey;
use crate::domain::timeline::{ChartDataset, ChartRow};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const TIME_FIELD: &str = "time";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GranularityDto {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestDto {
    pub value: f64,
    pub timestamp: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDto {
    pub metric: &'static str,
    pub unit: &'static str,
    pub start_date: String,
    pub end_date: String,
    pub granularity: GranularityDto,
    pub refined: bool,
    pub dropped_readings: usize,
    pub series_keys: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub latest: Option<LatestDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationDto {
    pub series_key: String,
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std_dev: f64,
    pub recommended_min: f64,
    pub recommended_max: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDto {
    pub main_avg: Option<f64>,
    pub comparison_avg: Option<f64>,
    pub difference: Option<f64>,
    pub percent_difference: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsDto {
    pub metric: &'static str,
    pub insufficient_data: bool,
    pub nodes: BTreeMap<String, Vec<RecommendationDto>>,
    pub insufficient: Vec<String>,
    pub comparison: Option<ComparisonDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxplotDto {
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

pub fn chart_to_dto(chart: MetricChart) -> ChartDto {
    let dataset: &ChartDataset = &chart.dataset;
    let keys = dataset.series_keys();
    let names = wire_names(&keys);

    ChartDto {
        metric: chart.metric.data_key(),
        unit: chart.metric.unit(),
        start_date: chart.range.start().to_string(),
        end_date: chart.range.end().to_string(),
        granularity: granularity_to_dto(dataset.granularity),
        refined: dataset.refined,
        dropped_readings: dataset.dropped,
        series_keys: keys.iter().map(|key| wire_name(&names, key)).collect(),
        rows: dataset.rows.iter().map(|row| row_to_dto(row, &names)).collect(),
        latest: chart.latest.map(latest_to_dto),
    }
}

fn granularity_to_dto(granularity: Granularity) -> GranularityDto {
    match granularity {
        Granularity::Daily => GranularityDto {
            kind: "daily",
            interval_minutes: None,
        },
        Granularity::Hourly => GranularityDto {
            kind: "hourly",
            interval_minutes: None,
        },
        Granularity::SubHourly { interval_minutes } => GranularityDto {
            kind: "subHourly",
            interval_minutes: Some(interval_minutes),
        },
    }
}

/// JSON field name per series. Distinct keys that print alike, or that would
/// shadow the `time` field, get a `#n` suffix in key order.
fn wire_names(keys: &[SeriesKey]) -> HashMap<SeriesKey, String> {
    let mut taken = HashSet::from([TIME_FIELD.to_string()]);
    keys.iter()
        .map(|key| {
            let base = key.to_string();
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{} #{}", base, n);
                n += 1;
            }
            (key.clone(), name)
        })
        .collect()
}

fn wire_name(names: &HashMap<SeriesKey, String>, key: &SeriesKey) -> String {
    names.get(key).cloned().unwrap_or_else(|| key.to_string())
}

/// Flattens a row to `{time, <series>: value}`. Absent series stay absent.
fn row_to_dto(row: &ChartRow, names: &HashMap<SeriesKey, String>) -> Map<String, Value> {
    let mut fields = Map::with_capacity(row.values.len() + 1);
    fields.insert(TIME_FIELD.to_string(), Value::from(row.time.clone()));
    for (key, value) in &row.values {
        fields.insert(wire_name(names, key), Value::from(*value));
    }
    fields
}

fn latest_to_dto(latest: LatestValue) -> LatestDto {
    LatestDto {
        value: latest.value,
        timestamp: latest.timestamp.to_rfc3339(),
        status: status_name(latest.status),
    }
}

fn status_name(status: MetricStatus) -> &'static str {
    match status {
        MetricStatus::Optimal => "optimal",
        MetricStatus::Warning => "warning",
        MetricStatus::Critical => "critical",
    }
}

pub fn thresholds_to_dto(report: ThresholdReport) -> ThresholdsDto {
    let insufficient_data = report.is_insufficient();
    let nodes = report
        .nodes
        .into_iter()
        .map(|(key, node)| {
            let series: Vec<SeriesKey> = node.recommendations.iter().map(|r| r.series_key.clone()).collect();
            let names = wire_names(&series);
            let recommendations = node
                .recommendations
                .into_iter()
                .map(|r| recommendation_to_dto(r, &names))
                .collect();
            (key, recommendations)
        })
        .collect();

    ThresholdsDto {
        metric: report.metric.data_key(),
        insufficient_data,
        nodes,
        insufficient: report.insufficient,
        comparison: report.comparison.map(comparison_to_dto),
    }
}

fn recommendation_to_dto(recommendation: ThresholdRecommendation, names: &HashMap<SeriesKey, String>) -> RecommendationDto {
    RecommendationDto {
        series_key: wire_name(names, &recommendation.series_key),
        sample_count: recommendation.sample_count,
        min: recommendation.min,
        max: recommendation.max,
        avg: recommendation.avg,
        std_dev: recommendation.std_dev,
        recommended_min: recommendation.recommended_min,
        recommended_max: recommendation.recommended_max,
    }
}

fn comparison_to_dto(stats: ComparisonStats) -> ComparisonDto {
    ComparisonDto {
        main_avg: stats.main_avg,
        comparison_avg: stats.comparison_avg,
        difference: stats.difference,
        percent_difference: stats.percent_difference,
    }
}

pub fn boxplots_to_dto(summaries: Vec<BoxplotSummary>) -> Vec<BoxplotDto> {
    summaries
        .into_iter()
        .map(|s| BoxplotDto {
            metric_id: s.metric_id,
            metric_name: s.metric_name,
            sample_count: s.sample_count,
            min: s.min,
            q1: s.q1,
            median: s.median,
            q3: s.q3,
            max: s.max,
            iqr: s.iqr,
            q1_offset: s.q1_offset,
            max_offset: s.max_offset,
        })
        .collect()
}
