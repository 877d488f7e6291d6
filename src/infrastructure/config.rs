use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub backend: BackendSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    /// Minutes east of UTC; the system zone is used when absent.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default = "default_per_metric_interval")]
    pub per_metric_interval_minutes: u32,
    #[serde(default = "default_multi_metric_interval")]
    pub multi_metric_interval_minutes: u32,
    #[serde(default = "default_hourly_point_threshold")]
    pub hourly_point_threshold: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub fetch_limits: FetchLimits,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            per_metric_interval_minutes: default_per_metric_interval(),
            multi_metric_interval_minutes: default_multi_metric_interval(),
            hourly_point_threshold: default_hourly_point_threshold(),
            debounce_ms: default_debounce_ms(),
            cache_capacity: default_cache_capacity(),
            fetch_limits: FetchLimits::default(),
        }
    }
}

impl DashboardSettings {
    /// Debounce delay, kept within 100..=1000 ms.
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms.clamp(100, 1000))
    }
}

/// Row limits per fetch, mirroring what the backend can return quickly.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FetchLimits {
    pub range_selected: usize,
    pub last_day: usize,
    pub last_week: usize,
    pub last_fortnight: usize,
    pub last_month: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            range_selected: 20_000,
            last_day: 1_000,
            last_week: 5_000,
            last_fortnight: 10_000,
            last_month: 20_000,
        }
    }
}

impl FetchLimits {
    /// Progressively wider look-back windows: `(days, limit)`.
    pub fn fallback_steps(&self) -> [(u32, usize); 4] {
        [
            (1, self.last_day),
            (7, self.last_week),
            (14, self.last_fortnight),
            (30, self.last_month),
        ]
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_per_metric_interval() -> u32 {
    15
}

fn default_multi_metric_interval() -> u32 {
    30
}

fn default_hourly_point_threshold() -> usize {
    crate::domain::granularity::DEFAULT_HOURLY_POINT_THRESHOLD
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    64
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("AGRO")
        .separator("__")
        .try_parsing(true)
}

pub fn load_backend_config() -> anyhow::Result<BackendConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/backend").required(false))
        .add_source(environment())
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(environment())
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    #[test]
    fn test_dashboard_defaults() {
        let settings = Config::builder()
            .add_source(File::from_str("[dashboard]\nutc_offset_minutes = -300\n", FileFormat::Toml))
            .build()
            .unwrap();
        let config: DashboardConfig = settings.try_deserialize().unwrap();

        assert_eq!(config.dashboard.utc_offset_minutes, Some(-300));
        assert_eq!(config.dashboard.per_metric_interval_minutes, 15);
        assert_eq!(config.dashboard.multi_metric_interval_minutes, 30);
        assert_eq!(config.dashboard.hourly_point_threshold, 1000);
        assert_eq!(config.dashboard.fetch_limits, FetchLimits::default());
    }

    #[test]
    fn test_backend_config_from_toml() {
        let settings = Config::builder()
            .add_source(File::from_str(
                "[backend]\nbase_url = \"http://localhost:3001/api\"\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: BackendConfig = settings.try_deserialize().unwrap();

        assert_eq!(config.backend.base_url, "http://localhost:3001/api");
        assert_eq!(config.backend.token, None);
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_debounce_is_clamped() {
        let mut settings = DashboardSettings::default();
        settings.debounce_ms = 5;
        assert_eq!(settings.debounce().as_millis(), 100);
        settings.debounce_ms = 10_000;
        assert_eq!(settings.debounce().as_millis(), 1000);
    }
}
