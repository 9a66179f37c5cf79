use aqf_core::Station;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "AQF_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "aqf.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Endpoint returning the JSON array of readings
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/datos-PM10".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub raw_file: String,
    pub forecast_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("databases"),
            raw_file: "realreg.parquet".to_string(),
            forecast_file: "fcst_db.parquet".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(&self.raw_file)
    }

    pub fn forecast_path(&self) -> PathBuf {
        self.dir.join(&self.forecast_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub bucket_minutes: u32,
    /// Future buckets per station
    pub horizon: usize,
    pub changepoint_prior_scale: f64,
    pub interval_width: f64,
    pub uncertainty_samples: usize,
    pub seed: u64,
    pub stations: Vec<Station>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            bucket_minutes: 15,
            horizon: 48,
            changepoint_prior_scale: 0.01,
            interval_width: 0.8,
            uncertainty_samples: 1000,
            seed: 0,
            stations: Station::defaults(),
        }
    }
}

impl ForecastConfig {
    pub fn bucket_secs(&self) -> i64 {
        i64::from(self.bucket_minutes) * 60
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub check_interval_secs: u64,
    /// Forecast file age that triggers a new run
    pub max_age_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3600,
            max_age_secs: 7200,
        }
    }
}

impl ScheduleConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    /// How far back `GET /api/v1/forecast` reaches
    pub window_hours: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            window_hours: 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub forecast: ForecastConfig,
    pub schedule: ScheduleConfig,
    pub api: ApiConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid source url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AppConfig {
    /// Load configuration from the AQF_CONFIG path (TOML) if present, with defaults otherwise
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load from `path`; a missing file means defaults
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&s)?
        } else {
            AppConfig::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.source.url).map_err(|source| ConfigError::Url {
            url: self.source.url.clone(),
            source,
        })?;
        if self.source.timeout_secs == 0 {
            return Err(invalid("source.timeout_secs", "must be positive"));
        }
        if self.forecast.bucket_minutes == 0 {
            return Err(invalid("forecast.bucket_minutes", "must be positive"));
        }
        if self.forecast.horizon == 0 {
            return Err(invalid("forecast.horizon", "must be positive"));
        }
        if self.forecast.stations.is_empty() {
            return Err(invalid("forecast.stations", "at least one station is required"));
        }
        if self.schedule.check_interval_secs == 0 {
            return Err(invalid("schedule.check_interval_secs", "must be positive"));
        }
        if self.api.window_hours <= 0 {
            return Err(invalid("api.window_hours", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
