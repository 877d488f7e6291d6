// HTTP request handlers
use crate::application::chart_service::{ChartProfile, ChartRequest};
use crate::application::request_tracker::Superseded;
use crate::domain::error::EngineError;
use crate::domain::metric::MetricKind;
use crate::domain::time::{DateRange, LocalZone, parse_calendar_date};
use crate::infrastructure::chart_mapper::{boxplots_to_dto, chart_to_dto, thresholds_to_dto};
use crate::infrastructure::http_response::{accepts_brotli, error_json, ok_json};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Response, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub compare: Option<i64>,
    pub view: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub view: Option<String>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Aggregated chart for one metric of a node
pub async fn metric_chart(
    Path((node_id, metric)): Path<(i64, String)>,
    Query(query): Query<ChartQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let request = match chart_request(node_id, &metric, query, state.chart_service.zone()) {
        Ok(request) => request,
        Err(message) => return error_json(StatusCode::BAD_REQUEST, &message).await,
    };

    match state.chart_service.metric_chart(&request).await {
        Ok(chart) => ok_json(&chart_to_dto(chart), compress).await,
        Err(e) => failure_response(node_id, e).await,
    }
}

/// Threshold recommendations for a node and its optional comparison node
pub async fn thresholds(
    Path((node_id, metric)): Path<(i64, String)>,
    Query(query): Query<ChartQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let request = match chart_request(node_id, &metric, query, state.chart_service.zone()) {
        Ok(request) => request,
        Err(message) => return error_json(StatusCode::BAD_REQUEST, &message).await,
    };

    match state.chart_service.threshold_report(&request).await {
        Ok(report) => ok_json(&thresholds_to_dto(report), compress).await,
        Err(e) => failure_response(node_id, e).await,
    }
}

/// Per-metric boxplot summaries for a node
pub async fn boxplots(
    Path(node_id): Path<i64>,
    Query(query): Query<RangeQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let range = match resolve_range(query.start.as_deref(), query.end.as_deref(), state.chart_service.zone()) {
        Ok(range) => range,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, &e.to_string()).await,
    };

    match state.chart_service.boxplots(node_id, range, query.view.as_deref()).await {
        Ok(summaries) => ok_json(&boxplots_to_dto(summaries), compress).await,
        Err(e) => failure_response(node_id, e).await,
    }
}

fn chart_request(node_id: i64, metric: &str, query: ChartQuery, zone: LocalZone) -> Result<ChartRequest, String> {
    let metric = MetricKind::from_key(metric).ok_or_else(|| format!("unknown metric '{}'", metric))?;
    let profile = match query.profile.as_deref() {
        Some(key) => ChartProfile::from_key(key).ok_or_else(|| format!("unknown profile '{}'", key))?,
        None => ChartProfile::default(),
    };
    let range = resolve_range(query.start.as_deref(), query.end.as_deref(), zone).map_err(|e| e.to_string())?;

    Ok(ChartRequest {
        node_id,
        metric,
        range,
        comparison_node_id: query.compare.filter(|id| *id != node_id),
        profile,
        view: query.view.filter(|v| !v.is_empty()),
    })
}

/// Missing dates default to today in the dashboard's zone.
fn resolve_range(start: Option<&str>, end: Option<&str>, zone: LocalZone) -> Result<DateRange, EngineError> {
    let today = zone.today();
    let start = start.map(parse_calendar_date).transpose()?.unwrap_or(today);
    let end = end.map(parse_calendar_date).transpose()?.unwrap_or(today);
    DateRange::new(start, end)
}

async fn failure_response(node_id: i64, error: anyhow::Error) -> Response<Body> {
    if let Some(superseded) = error.downcast_ref::<Superseded>() {
        tracing::debug!("Request for node {} superseded in view {}", node_id, superseded.view);
        return error_json(StatusCode::CONFLICT, &superseded.to_string()).await;
    }
    if let Some(invalid) = error.downcast_ref::<EngineError>() {
        return error_json(StatusCode::BAD_REQUEST, &invalid.to_string()).await;
    }
    tracing::error!("Error serving node {}: {:#}", node_id, error);
    error_json(StatusCode::BAD_GATEWAY, &format!("{:#}", error)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::chart_service::ChartService;
    use crate::application::reading_repository::ReadingRepository;
    use crate::domain::reading::{Catalog, Reading, SeriesContext};
    use crate::domain::time::LocalWindow;
    use crate::infrastructure::config::DashboardSettings;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct StaticRepository {
        readings: Vec<Reading>,
        fail: bool,
    }

    #[async_trait]
    impl ReadingRepository for StaticRepository {
        async fn fetch_readings(&self, _node_id: i64, _window: &LocalWindow, _limit: usize) -> anyhow::Result<Vec<Reading>> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.readings.clone())
        }

        async fn fetch_catalog(&self) -> anyhow::Result<Catalog> {
            Ok(Catalog::default())
        }
    }

    fn state(fail: bool) -> State<Arc<AppState>> {
        let readings = (0..4)
            .map(|h| {
                Reading::new(
                    Utc.with_ymd_and_hms(2024, 6, 3, 8 + h, 0, 0).unwrap(),
                    Some(20.0 + f64::from(h)),
                    SeriesContext {
                        location_id: Some(1),
                        sensor_id: Some(3),
                        sensor_type_id: None,
                        metric_id: Some(1),
                    },
                )
            })
            .collect();
        let settings = DashboardSettings {
            utc_offset_minutes: Some(0),
            ..DashboardSettings::default()
        };
        let repository = Arc::new(StaticRepository { readings, fail });
        State(Arc::new(AppState {
            chart_service: ChartService::new(repository, settings),
        }))
    }

    fn query(start: &str, end: &str) -> ChartQuery {
        ChartQuery {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..ChartQuery::default()
        }
    }

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chart_endpoint_returns_envelope() {
        let response = metric_chart(
            Path((1, "temperature".to_string())),
            Query(query("2024-06-03", "2024-06-03")),
            HeaderMap::new(),
            state(false),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["metric"], "temperatura");
        assert_eq!(body["seriesKeys"], serde_json::json!(["Sensor 3"]));
        assert_eq!(body["rows"].as_array().unwrap().len(), 4);
        assert_eq!(body["rows"][0]["time"], "08:00");
    }

    #[tokio::test]
    async fn test_invalid_input_is_bad_request() {
        let inverted = metric_chart(
            Path((1, "temperatura".to_string())),
            Query(query("2024-06-05", "2024-06-03")),
            HeaderMap::new(),
            state(false),
        )
        .await;
        assert_eq!(inverted.status(), StatusCode::BAD_REQUEST);

        let malformed = metric_chart(
            Path((1, "temperatura".to_string())),
            Query(query("2024-02-30", "2024-06-03")),
            HeaderMap::new(),
            state(false),
        )
        .await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(malformed).await["error"].as_str().unwrap().contains("2024-02-30"));

        let unknown_metric = thresholds(
            Path((1, "ph".to_string())),
            Query(query("2024-06-03", "2024-06-03")),
            HeaderMap::new(),
            state(false),
        )
        .await;
        assert_eq!(unknown_metric.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_backend_failure_is_bad_gateway() {
        let response = boxplots(
            Path(1),
            Query(RangeQuery {
                start: Some("2024-06-03".to_string()),
                end: Some("2024-06-03".to_string()),
                view: None,
            }),
            HeaderMap::new(),
            state(true),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_thresholds_insufficient_is_ok() {
        let response = thresholds(
            Path((1, "humedad".to_string())),
            Query(query("2024-06-03", "2024-06-03")),
            HeaderMap::new(),
            state(false),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["insufficientData"], true);
        assert_eq!(body["insufficient"], serde_json::json!(["node_1"]));
    }

    #[tokio::test]
    async fn test_superseded_maps_to_conflict() {
        let error = anyhow::Error::new(Superseded {
            view: "main".to_string(),
        });
        let response = failure_response(1, error).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_comparison_with_itself_is_ignored() {
        let mut q = query("2024-06-03", "2024-06-04");
        q.compare = Some(1);
        q.profile = Some("detail".to_string());
        let request = chart_request(1, "EC", q, LocalZone::from_offset_minutes(Some(0))).unwrap();

        assert_eq!(request.comparison_node_id, None);
        assert_eq!(request.profile, ChartProfile::Detail);
        assert_eq!(request.metric, MetricKind::Conductivity);

        let unknown_profile = ChartQuery {
            profile: Some("huge".to_string()),
            ..ChartQuery::default()
        };
        assert!(chart_request(1, "EC", unknown_profile, LocalZone::System).is_err());
    }
}
