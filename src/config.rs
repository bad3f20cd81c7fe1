use crate::level::LevelConfig;
use crate::level::settings::{DEFAULT_BUCKET_HEIGHT_CM, DEFAULT_THRESHOLD_PERCENT};
use crate::sampling::DEFAULT_MIN_INTERVAL;
use crate::sensor::{
    DEFAULT_I2C_ADDRESS_7BIT, DEFAULT_SENSOR_TIMEOUT, DEFAULT_SIG_PIN, MAX_SENSOR_TIMEOUT,
    SensorKind, SensorSettings,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub sensor: Option<SensorSection>,
    #[serde(default)]
    pub level: Option<LevelSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SensorSection {
    #[serde(default)]
    pub kind: SensorKind,
    /// GPIO line of the single-wire ultrasonic ranger
    pub pin: Option<u8>,
    /// 7-bit I2C address of the time-of-flight sensor
    pub i2c_address: Option<u8>,
    /// Upper bound for one ranging transaction (default: 30)
    pub timeout_ms: Option<u64>,
    /// Minimum spacing between hardware samples (default: 250)
    pub min_interval_ms: Option<u64>,
    /// Background sampling cadence; unset means sampling is request-driven only
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LevelSection {
    pub bucket_height_cm: Option<f64>,
    pub threshold_percent: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.level.parse::<Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown logging level: {}",
                self.logging.level
            )));
        }

        let timeout = self.sensor_timeout();
        if timeout.is_zero() || timeout > MAX_SENSOR_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "sensor.timeout_ms must be within 1-{}",
                MAX_SENSOR_TIMEOUT.as_millis()
            )));
        }
        if self.min_sample_interval() < timeout {
            return Err(ConfigError::Invalid(
                "sensor.min_interval_ms must not be shorter than sensor.timeout_ms".to_string(),
            ));
        }
        if self.poll_interval().is_some_and(|poll| poll.is_zero()) {
            return Err(ConfigError::Invalid(
                "sensor.poll_interval_ms must be positive".to_string(),
            ));
        }

        let (bucket_height, threshold) = self.level_defaults();
        if let Err(err) = LevelConfig::new(bucket_height, threshold) {
            return Err(ConfigError::Invalid(format!("level: {err}")));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Level {
        self.logging.level.parse().unwrap_or(Level::INFO)
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn sensor_settings(&self) -> SensorSettings {
        let section = self.sensor.clone().unwrap_or_default();
        SensorSettings {
            kind: section.kind,
            sig_pin: section.pin.unwrap_or(DEFAULT_SIG_PIN),
            i2c_address: section.i2c_address.unwrap_or(DEFAULT_I2C_ADDRESS_7BIT),
            timeout: self.sensor_timeout(),
        }
    }

    fn sensor_timeout(&self) -> Duration {
        self.sensor
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SENSOR_TIMEOUT)
    }

    /// Returns the sampling rate limit (default: 250 ms)
    pub fn min_sample_interval(&self) -> Duration {
        self.sensor
            .as_ref()
            .and_then(|s| s.min_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MIN_INTERVAL)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.sensor
            .as_ref()
            .and_then(|s| s.poll_interval_ms)
            .map(Duration::from_millis)
    }

    /// Startup container height and alert threshold; validated by `LevelConfig::new`.
    pub fn level_defaults(&self) -> (f64, f64) {
        let section = self.level.as_ref();
        (
            section
                .and_then(|l| l.bucket_height_cm)
                .unwrap_or(DEFAULT_BUCKET_HEIGHT_CM),
            section
                .and_then(|l| l.threshold_percent)
                .unwrap_or(DEFAULT_THRESHOLD_PERCENT),
        )
    }
}
