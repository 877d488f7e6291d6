// Dashboard REST backend repository implementation
use crate::application::reading_repository::ReadingRepository;
use crate::domain::reading::{Catalog, Location, Metric, Reading, Sensor, SensorType, SeriesContext};
use crate::domain::time::{LocalWindow, LocalZone};
use crate::infrastructure::config::BackendSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

const BACKEND_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct BackendRepository {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    zone: LocalZone,
}

/// The backend answers either with a bare array or with `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RowsEnvelope<T> {
    Rows(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> RowsEnvelope<T> {
    fn into_rows(self) -> Vec<T> {
        match self {
            RowsEnvelope::Rows(rows) | RowsEnvelope::Wrapped { data: rows } => rows,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MeasurementRow {
    #[serde(default)]
    fecha: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    medicion: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    localizacionid: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    sensorid: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    tipoid: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    metricaid: Option<i64>,
    #[serde(default)]
    localizacion: Option<LocationRef>,
}

/// Location expanded inline on a measurement row.
#[derive(Debug, Default, Deserialize)]
struct LocationRef {
    #[serde(default, deserialize_with = "lenient_i64")]
    localizacionid: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    sensorid: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    metricaid: Option<i64>,
    #[serde(default)]
    sensor: Option<SensorRef>,
}

#[derive(Debug, Default, Deserialize)]
struct SensorRef {
    #[serde(default, deserialize_with = "lenient_i64")]
    sensorid: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    tipoid: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SensorRow {
    sensorid: i64,
    #[serde(default)]
    tipoid: Option<i64>,
    #[serde(default)]
    sensor: Option<String>,
    #[serde(default)]
    nombre: Option<String>,
    #[serde(default)]
    modelo: Option<String>,
    #[serde(default)]
    deveui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SensorTypeRow {
    tipoid: i64,
    #[serde(default)]
    tipo: String,
}

#[derive(Debug, Deserialize)]
struct MetricRow {
    metricaid: i64,
    #[serde(default)]
    metrica: String,
    #[serde(default)]
    unidad: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    localizacionid: i64,
    #[serde(default)]
    localizacion: String,
    #[serde(default)]
    nodoid: Option<i64>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl BackendRepository {
    pub fn new(settings: &BackendSettings, zone: LocalZone) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone().filter(|t| !t.is_empty()),
            client,
            zone,
        })
    }

    fn build_readings_url(&self, node_id: i64, window: &LocalWindow, limit: usize) -> String {
        let start = window.start.format(BACKEND_DATE_FORMAT).to_string();
        let end = window.end.format(BACKEND_DATE_FORMAT).to_string();
        format!(
            "{}/mediciones/mediciones?nodoid={}&startDate={}&endDate={}&limit={}",
            self.base_url,
            node_id,
            urlencoding::encode(&start),
            urlencoding::encode(&end),
            limit
        )
    }

    async fn get_rows<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to backend")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend request failed with status {}: {}", status, body);
        }

        let envelope = response
            .json::<RowsEnvelope<T>>()
            .await
            .context("Failed to parse backend response")?;

        Ok(envelope.into_rows())
    }

    /// A missing reference table degrades labelling but must not fail the chart.
    async fn table_or_empty<T: DeserializeOwned>(&self, path: &str) -> Vec<T> {
        let url = format!("{}{}", self.base_url, path);
        match self.get_rows(&url).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Reference table {} unavailable, continuing without it: {:#}", path, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ReadingRepository for BackendRepository {
    async fn fetch_readings(&self, node_id: i64, window: &LocalWindow, limit: usize) -> Result<Vec<Reading>> {
        let url = self.build_readings_url(node_id, window, limit);
        tracing::debug!("Fetching readings: {}", url);

        let rows: Vec<MeasurementRow> = self.get_rows(&url).await?;
        let total = rows.len();
        let (readings, skipped) = rows_to_readings(rows, &self.zone);
        if skipped > 0 {
            tracing::debug!("Skipped {} of {} rows for node {} with unparseable timestamps", skipped, total, node_id);
        }

        tracing::debug!("Fetched {} readings for node {}", readings.len(), node_id);
        Ok(readings)
    }

    async fn fetch_catalog(&self) -> Result<Catalog> {
        let (sensors, sensor_types, metrics, locations) = tokio::join!(
            self.table_or_empty::<SensorRow>("/dispositivos/sensor"),
            self.table_or_empty::<SensorTypeRow>("/dispositivos/tipo"),
            self.table_or_empty::<MetricRow>("/dispositivos/metrica"),
            self.table_or_empty::<LocationRow>("/dispositivos/localizacion"),
        );

        Ok(Catalog::new(
            sensors.into_iter().map(Sensor::from).collect(),
            sensor_types.into_iter().map(SensorType::from).collect(),
            metrics.into_iter().map(Metric::from).collect(),
            locations.into_iter().map(Location::from).collect(),
        ))
    }
}

/// Converts backend rows, returning the readings and how many rows were skipped.
fn rows_to_readings(rows: Vec<MeasurementRow>, zone: &LocalZone) -> (Vec<Reading>, usize) {
    let mut skipped = 0;
    let readings: Vec<Reading> = rows
        .into_iter()
        .filter_map(|row| {
            let reading = row_to_reading(row, zone);
            if reading.is_none() {
                skipped += 1;
            }
            reading
        })
        .collect();
    (readings, skipped)
}

fn row_to_reading(row: MeasurementRow, zone: &LocalZone) -> Option<Reading> {
    let timestamp = parse_timestamp(row.fecha.as_deref()?, zone)?;
    let location = row.localizacion.unwrap_or_default();
    let sensor = location.sensor.unwrap_or_default();

    let context = SeriesContext {
        location_id: row.localizacionid.or(location.localizacionid),
        sensor_id: row.sensorid.or(location.sensorid).or(sensor.sensorid),
        sensor_type_id: row.tipoid.or(sensor.tipoid),
        metric_id: row.metricaid.or(location.metricaid),
    };
    Some(Reading::new(timestamp, row.medicion, context))
}

/// Accepts RFC 3339, a space-separated timestamp with a short offset, or a
/// naive wall-clock time which is read in `zone`.
fn parse_timestamp(raw: &str, zone: &LocalZone) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| zone.from_local(&naive))
}

fn first_non_empty(candidates: [Option<String>; 4]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

impl From<SensorRow> for Sensor {
    fn from(row: SensorRow) -> Self {
        Sensor {
            id: row.sensorid,
            name: first_non_empty([row.sensor, row.nombre, row.modelo, row.deveui]),
            sensor_type_id: row.tipoid,
        }
    }
}

impl From<SensorTypeRow> for SensorType {
    fn from(row: SensorTypeRow) -> Self {
        SensorType {
            id: row.tipoid,
            name: row.tipo,
        }
    }
}

impl From<MetricRow> for Metric {
    fn from(row: MetricRow) -> Self {
        Metric {
            id: row.metricaid,
            name: row.metrica,
            unit: row.unidad,
        }
    }
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: row.localizacionid,
            name: row.localizacion,
            node_id: row.nodoid,
        }
    }
}
