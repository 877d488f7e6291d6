// Chart service - Use cases behind the dashboard charts and analysis panels
use crate::application::chart_cache::{ChartCache, ChartCacheKey};
use crate::application::reading_repository::ReadingRepository;
use crate::application::request_tracker::RequestTracker;
use crate::domain::aggregation::Aggregator;
use crate::domain::comparison::{ComparisonStats, merge_datasets};
use crate::domain::granularity::{Granularity, GranularityPolicy};
use crate::domain::metric::{MetricKind, MetricStatus};
use crate::domain::reading::{Catalog, Reading};
use crate::domain::selection::{ReadingSelection, latest_reading};
use crate::domain::series::{LabelStyle, SeriesLabeler};
use crate::domain::statistics::{BoxplotSummary, ThresholdRecommendation, boxplots, recommend_thresholds};
use crate::domain::time::{DateRange, LocalZone};
use crate::domain::timeline::{ChartDataset, unify};
use crate::infrastructure::config::DashboardSettings;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which dashboard screen a chart is drawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChartProfile {
    /// Per-metric mini chart: fine sub-hourly buckets, plain sensor labels.
    #[default]
    Mini,
    /// Detailed analysis chart: coarser sub-hourly buckets, location-qualified labels.
    Detail,
}

impl ChartProfile {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "mini" => Some(ChartProfile::Mini),
            "detail" => Some(ChartProfile::Detail),
            _ => None,
        }
    }

    fn label_style(&self) -> LabelStyle {
        match self {
            ChartProfile::Mini => LabelStyle::Sensor,
            ChartProfile::Detail => LabelStyle::WithLocation,
        }
    }

    fn sub_hourly_minutes(&self, settings: &DashboardSettings) -> u32 {
        match self {
            ChartProfile::Mini => settings.per_metric_interval_minutes,
            ChartProfile::Detail => settings.multi_metric_interval_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub node_id: i64,
    pub metric: MetricKind,
    pub range: DateRange,
    pub comparison_node_id: Option<i64>,
    pub profile: ChartProfile,
    pub view: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestValue {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub status: MetricStatus,
}

#[derive(Debug, Clone)]
pub struct MetricChart {
    pub metric: MetricKind,
    /// Range the data actually covers; differs from the request after a fallback.
    pub range: DateRange,
    pub dataset: Arc<ChartDataset>,
    pub latest: Option<LatestValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeThresholds {
    pub node_id: i64,
    pub recommendations: Vec<ThresholdRecommendation>,
}

/// Threshold recommendations per node, keyed `node_<id>`. Nodes without any
/// qualifying series are listed in `insufficient` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdReport {
    pub metric: MetricKind,
    pub nodes: BTreeMap<String, NodeThresholds>,
    pub insufficient: Vec<String>,
    pub comparison: Option<ComparisonStats>,
}

impl ThresholdReport {
    pub fn is_insufficient(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub fn node_key(node_id: i64) -> String {
    format!("node_{}", node_id)
}

struct FetchedReadings {
    catalog: Catalog,
    range: DateRange,
    main: Vec<Reading>,
    comparison: Option<Vec<Reading>>,
}

#[derive(Clone)]
pub struct ChartService {
    repository: Arc<dyn ReadingRepository>,
    settings: DashboardSettings,
    zone: LocalZone,
    cache: Arc<ChartCache>,
    tracker: Arc<RequestTracker>,
}

impl ChartService {
    pub fn new(repository: Arc<dyn ReadingRepository>, settings: DashboardSettings) -> Self {
        let zone = LocalZone::from_offset_minutes(settings.utc_offset_minutes);
        let cache = Arc::new(ChartCache::new(settings.cache_capacity));
        let tracker = Arc::new(RequestTracker::new(settings.debounce()));
        Self {
            repository,
            settings,
            zone,
            cache,
            tracker,
        }
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Aggregated chart of one metric, optionally overlaid with a comparison node.
    pub async fn metric_chart(&self, request: &ChartRequest) -> anyhow::Result<MetricChart> {
        let fetch = self.fetch_for(request, request.profile == ChartProfile::Mini);
        self.tracker
            .run_latest(request.view.as_deref(), fetch, |fetched| Ok(self.build_chart(request, fetched)))
            .await
    }

    /// Threshold recommendations for the main node and, when given, the comparison node.
    pub async fn threshold_report(&self, request: &ChartRequest) -> anyhow::Result<ThresholdReport> {
        let fetch = self.fetch_for(request, false);
        self.tracker
            .run_latest(request.view.as_deref(), fetch, |fetched| Ok(self.build_thresholds(request, fetched)))
            .await
    }

    /// Quartile summaries of every metric the node reported inside `range`.
    pub async fn boxplots(&self, node_id: i64, range: DateRange, view: Option<&str>) -> anyhow::Result<Vec<BoxplotSummary>> {
        let fetch = async {
            let window = range.window();
            let (catalog, readings) = tokio::try_join!(
                self.load_catalog(),
                self.fetch_window(node_id, &range, self.settings.fetch_limits.range_selected),
            )?;
            tracing::debug!("Fetched {} readings for boxplots of node {} ({:?})", readings.len(), node_id, window);
            Ok::<_, anyhow::Error>((catalog, readings))
        };
        self.tracker
            .run_latest(view, fetch, |(catalog, readings)| {
                let selected = ReadingSelection::new(&catalog, self.zone, range.window()).apply(&readings);
                Ok(boxplots(&selected, &catalog))
            })
            .await
    }

    async fn fetch_for(&self, request: &ChartRequest, allow_fallback: bool) -> anyhow::Result<FetchedReadings> {
        let (catalog, (range, main)) = tokio::try_join!(
            self.load_catalog(),
            self.load_node(request.node_id, request.range, allow_fallback),
        )?;

        let comparison = match request.comparison_node_id {
            Some(node_id) => Some(
                self.fetch_window(node_id, &range, self.settings.fetch_limits.range_selected)
                    .await
                    .with_context(|| format!("Failed to fetch comparison node {}", node_id))?,
            ),
            None => None,
        };

        Ok(FetchedReadings {
            catalog,
            range,
            main,
            comparison,
        })
    }

    async fn load_catalog(&self) -> anyhow::Result<Catalog> {
        self.repository
            .fetch_catalog()
            .await
            .context("Failed to load reference catalog")
    }

    /// Fetches the selected range; when it is empty and fallback is allowed,
    /// retries progressively wider windows ending today.
    async fn load_node(&self, node_id: i64, range: DateRange, allow_fallback: bool) -> anyhow::Result<(DateRange, Vec<Reading>)> {
        let limits = &self.settings.fetch_limits;
        let readings = self.fetch_window(node_id, &range, limits.range_selected).await?;
        if !readings.is_empty() || !allow_fallback {
            return Ok((range, readings));
        }

        let today = self.zone.today();
        for (days, limit) in limits.fallback_steps() {
            let fallback = DateRange::last_days(today, days);
            let readings = self.fetch_window(node_id, &fallback, limit).await?;
            if !readings.is_empty() {
                tracing::debug!(
                    "Node {} had no data in {:?}, using last {} day(s): {} readings",
                    node_id, range, days, readings.len()
                );
                return Ok((fallback, readings));
            }
        }

        Ok((range, Vec::new()))
    }

    async fn fetch_window(&self, node_id: i64, range: &DateRange, limit: usize) -> anyhow::Result<Vec<Reading>> {
        let window = range.window();
        self.repository
            .fetch_readings(node_id, &window, limit)
            .await
            .inspect_err(|e| tracing::warn!("Fetch failed for node {} in {:?}: {:#}", node_id, window, e))
            .with_context(|| format!("Failed to fetch readings for node {}", node_id))
    }

    fn build_chart(&self, request: &ChartRequest, fetched: FetchedReadings) -> MetricChart {
        let FetchedReadings {
            catalog,
            range,
            main,
            comparison,
        } = fetched;

        let selection = ReadingSelection::new(&catalog, self.zone, range.window()).with_metric(request.metric);
        let main = selection.apply(&main);
        let comparison = comparison.map(|readings| selection.apply(&readings));

        let key = ChartCacheKey {
            node_id: request.node_id,
            comparison_node_id: request.comparison_node_id,
            metric: request.metric,
            profile: request.profile,
            range,
            reading_count: main.len() + comparison.as_ref().map_or(0, Vec::len),
        };

        let dataset = match self.cache.get(&key) {
            Some(hit) => {
                tracing::debug!("Chart cache hit for node {} {}", request.node_id, request.metric);
                hit
            }
            None => {
                tracing::debug!("Chart cache miss for node {} {}", request.node_id, request.metric);
                let main_dataset = self.aggregate(&catalog, &range, request.profile, &main);
                let dataset = match &comparison {
                    Some(readings) => {
                        let comparison_dataset = self.aggregate(&catalog, &range, request.profile, readings);
                        merge_datasets(&main_dataset, &comparison_dataset, &range)
                    }
                    None => main_dataset,
                };
                let dataset = Arc::new(dataset);
                // Labels built from a partial catalog are fallbacks; keep them out of the cache.
                if catalog.is_complete() {
                    self.cache.insert(key, dataset.clone());
                    tracing::debug!("Chart cache now holds {} datasets", self.cache.len());
                } else {
                    tracing::debug!("Catalog incomplete, not caching chart for node {}", request.node_id);
                }
                dataset
            }
        };

        let latest = latest_reading(&main).and_then(|reading| {
            let value = reading.usable_value()?;
            Some(LatestValue {
                value,
                timestamp: reading.timestamp,
                status: request.metric.default_range().classify(value),
            })
        });

        MetricChart {
            metric: request.metric,
            range,
            dataset,
            latest,
        }
    }

    fn aggregate(&self, catalog: &Catalog, range: &DateRange, profile: ChartProfile, readings: &[Reading]) -> ChartDataset {
        let policy = GranularityPolicy::new(
            profile.sub_hourly_minutes(&self.settings),
            self.settings.hourly_point_threshold,
        );
        let granularity = Granularity::select(range, Some(readings.len()), &policy);
        if readings.is_empty() {
            return ChartDataset::empty(granularity);
        }

        let labeler = SeriesLabeler::new(catalog, profile.label_style());
        let aggregation = Aggregator::new(&labeler, self.zone, policy).aggregate(readings, granularity);
        tracing::debug!(
            "Aggregated {} readings into {} series at {:?} (refined: {}, dropped: {})",
            aggregation.used,
            aggregation.series.len(),
            aggregation.granularity,
            aggregation.refined,
            aggregation.dropped
        );
        unify(&aggregation)
    }

    fn build_thresholds(&self, request: &ChartRequest, fetched: FetchedReadings) -> ThresholdReport {
        let selection = ReadingSelection::new(&fetched.catalog, self.zone, fetched.range.window()).with_metric(request.metric);
        let labeler = SeriesLabeler::new(&fetched.catalog, LabelStyle::WithLocation);

        let main = selection.apply(&fetched.main);
        let comparison = fetched.comparison.as_ref().map(|readings| selection.apply(readings));

        let mut report = ThresholdReport {
            metric: request.metric,
            nodes: BTreeMap::new(),
            insufficient: Vec::new(),
            comparison: comparison
                .as_ref()
                .map(|readings| ComparisonStats::between(&main, readings)),
        };

        let mut sides = vec![(request.node_id, main)];
        if let (Some(node_id), Some(readings)) = (request.comparison_node_id, comparison) {
            sides.push((node_id, readings));
        }

        for (node_id, readings) in sides {
            let recommendations: Vec<ThresholdRecommendation> =
                recommend_thresholds(&readings, &labeler).into_values().collect();
            if recommendations.is_empty() {
                report.insufficient.push(node_key(node_id));
            } else {
                report.nodes.insert(
                    node_key(node_id),
                    NodeThresholds {
                        node_id,
                        recommendations,
                    },
                );
            }
        }

        // Without a main-node baseline the comparison thresholds are not reported either.
        if !report.nodes.contains_key(&node_key(request.node_id)) {
            report.nodes.clear();
        }
        report
    }
}
