//! Configuration management for the exoplanet classifier service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Env var naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "EXOPLANET_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS; `"*"` allows any
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Model artifacts configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing model artifact files
    pub models_dir: String,
    /// Selector used when a request names none
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Canonical labels in rank order: the i-th sorted raw class of every
    /// model maps to the i-th entry
    #[serde(default = "default_canonical_labels")]
    pub canonical_labels: Vec<String>,
    /// Selector to artifact file name, relative to `models_dir`
    #[serde(default = "default_artifacts")]
    pub artifacts: BTreeMap<String, String>,
}

fn default_model() -> String {
    "rf".to_string()
}

fn default_canonical_labels() -> Vec<String> {
    vec![
        "Candidate".to_string(),
        "Confirmed".to_string(),
        "False Positive".to_string(),
    ]
}

fn default_artifacts() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("lr".to_string(), "logistic_regression_pipeline.json".to_string()),
        ("rf".to_string(), "random_forest_pipeline.json".to_string()),
    ])
}

/// KOI listing dataset configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Cumulative KOI table in CSV form
    pub csv_path: String,
    /// Maximum rows returned by the listing endpoint
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_max_rows() -> usize {
    100
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            csv_path: "data/koi_sample.csv".to_string(),
            max_rows: default_max_rows(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from `EXOPLANET_CONFIG` or the default path, with
    /// `EXOPLANET__SECTION__KEY` environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("EXOPLANET")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: ModelsConfig {
                models_dir: "models".to_string(),
                default_model: default_model(),
                canonical_labels: default_canonical_labels(),
                artifacts: default_artifacts(),
            },
            dataset: DatasetConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
