use crate::types::{Banner, Slot, SocialGroup};
use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file, then
/// environment variables with the prefix `BANNER_ROTATOR__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_nats_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
}

/// Which slice of the event log a statistics cycle exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// `[now, now + interval)` read at the start of each cycle.
    #[default]
    Forward,
    /// `[previous cycle start, now)`, contiguous across cycles.
    Trailing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_statistics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub window: WindowPolicy,
}

/// Reference data for the in-memory store. Slots, banners and social groups
/// are managed outside the rotator; this is how they get in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub banners: Vec<Banner>,
    #[serde(default)]
    pub social_groups: Vec<SocialGroup>,
}

fn default_node_id() -> String {
    "rotator-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_nats_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}
fn default_subject() -> String {
    "banner-rotator.statistics".to_string()
}
fn default_nats_max_reconnects() -> usize {
    60
}
fn default_statistics_enabled() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_nats_urls(),
            subject: default_subject(),
            max_reconnects: default_nats_max_reconnects(),
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_statistics_enabled(),
            interval_secs: default_interval_secs(),
            window: WindowPolicy::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            nats: NatsConfig::default(),
            statistics: StatisticsConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl StatisticsConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs.max(1))
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    /// Environment values win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("BANNER_ROTATOR")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("nats.urls"),
            )
            .build()?;
        config.try_deserialize()
    }
}
