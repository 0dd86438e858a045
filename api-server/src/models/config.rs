use chrono::Duration;
use figment::providers::{Format, Yaml};
use figment::Figment;
use getset::Getters;
use media_fetch_client::cache::CacheConfig;
use media_fetch_client::in_flight::InFlightConfig;
use media_fetch_client::FetchConfig;
use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use simplelog::LevelFilter;
use std::path::Path;

pub const CONFIG_ENV_VAR: &str = "MEDIA_FETCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
/// Upper bound for every `*Seconds` setting (ten years)
pub const MAX_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid log level {0:?}")]
    LogLevel(String),
    #[error("{field} is {value}, must be at most {max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone, Getters)]
#[serde(rename_all = "camelCase")]
#[get = "pub"]
pub struct Config {
    #[serde_inline_default(120)]
    max_duration_seconds: u64,
    #[serde_inline_default(300)]
    cache_ttl_seconds: u64,
    #[serde_inline_default(100)]
    cache_max_entries: usize,
    #[serde_inline_default(300)]
    cache_sweep_interval_seconds: u64,
    #[serde_inline_default(true)]
    cache_enabled: bool,
    /// 0 disables the cooldown
    #[serde_inline_default(60)]
    download_cooldown_seconds: u64,
    #[serde_inline_default(10)]
    resolver_timeout_seconds: u64,
    #[serde_inline_default(600)]
    in_flight_expiry_seconds: u64,
    #[serde_inline_default("yt-dlp".to_string())]
    yt_dlp_path: String,
    #[serde_inline_default("best".to_string())]
    format: String,
    #[serde_inline_default("info".to_string())]
    log_level: String,
}

impl Config {
    /// Load from the file named by `MEDIA_FETCH_CONFIG`, or `config.yaml`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    /// A missing file yields the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Figment::new().merge(Yaml::file(path)))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Self::from_figment(Figment::new().merge(Yaml::string(yaml)))
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(Box::new)?;
        config.level_filter()?;
        config.check_ranges()?;
        Ok(config)
    }

    fn check_ranges(&self) -> Result<(), ConfigError> {
        let fields = [
            ("cacheTtlSeconds", self.cache_ttl_seconds),
            ("cacheSweepIntervalSeconds", self.cache_sweep_interval_seconds),
            ("downloadCooldownSeconds", self.download_cooldown_seconds),
            ("resolverTimeoutSeconds", self.resolver_timeout_seconds),
            ("inFlightExpirySeconds", self.in_flight_expiry_seconds),
        ];
        match fields.into_iter().find(|(_, value)| *value > MAX_SECONDS) {
            Some((field, value)) => Err(ConfigError::OutOfRange {
                field,
                value,
                max: MAX_SECONDS,
            }),
            None => Ok(()),
        }
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_duration_seconds: self.max_duration_seconds,
            resolver_timeout: seconds(self.resolver_timeout_seconds),
            download_cooldown: Some(self.download_cooldown_seconds)
                .filter(|secs| *secs > 0)
                .map(seconds),
            cache: CacheConfig {
                ttl: seconds(self.cache_ttl_seconds),
                max_entries: self.cache_max_entries,
                sweep_interval: seconds(self.cache_sweep_interval_seconds),
                enabled: self.cache_enabled,
            },
            in_flight: InFlightConfig {
                in_progress_expiry: seconds(self.in_flight_expiry_seconds),
            },
        }
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_SECONDS) as i64)
}
