use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod mock;
pub mod ultrasonic;
pub mod vl53l1x;

// VL53L1X default is 0x52 in 8-bit notation; use 0x29 for 7-bit addressing.
pub const DEFAULT_I2C_ADDRESS_7BIT: u8 = 0x29;
pub const DEFAULT_SIG_PIN: u8 = 17;
pub const DEFAULT_SENSOR_TIMEOUT: Duration = Duration::from_millis(30);
/// Longest transaction a backend may be configured for.
pub const MAX_SENSOR_TIMEOUT: Duration = Duration::from_millis(100);

/// Raw outcome of a single ranging transaction, before validity filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ranging {
    Echo { distance_cm: f64 },
    NoEcho,
}

/// One blocking ranging transaction per call, bounded by the backend timeout.
/// No retries: the caller owns the retry policy.
pub trait RangeSensor {
    fn measure(&mut self) -> Result<Ranging, AppError>;
}

impl RangeSensor for Box<dyn RangeSensor + Send> {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        (**self).measure()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    #[default]
    Ultrasonic,
    Vl53l1x,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Ultrasonic => f.write_str("ultrasonic"),
            SensorKind::Vl53l1x => f.write_str("vl53l1x"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSettings {
    pub kind: SensorKind,
    /// GPIO line shared by trigger and echo on the single-wire ranger.
    pub sig_pin: u8,
    pub i2c_address: u8,
    pub timeout: Duration,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            kind: SensorKind::default(),
            sig_pin: DEFAULT_SIG_PIN,
            i2c_address: DEFAULT_I2C_ADDRESS_7BIT,
            timeout: DEFAULT_SENSOR_TIMEOUT,
        }
    }
}

/// Build the configured hardware backend.
pub fn build_sensor(settings: &SensorSettings) -> Result<Box<dyn RangeSensor + Send>, AppError> {
    match settings.kind {
        SensorKind::Ultrasonic => {
            let ranger = ultrasonic::UltrasonicRanger::new(settings.sig_pin, settings.timeout)?;
            Ok(Box::new(ranger))
        }
        SensorKind::Vl53l1x => {
            let ranger = vl53l1x::Vl53l1xRanger::new(settings.i2c_address, settings.timeout)?;
            Ok(Box::new(ranger))
        }
    }
}

/// Stand-in installed when the real sensor could not be brought up. Every
/// measurement fails, so the API keeps serving the "no reading" sentinel.
#[derive(Debug, Clone)]
pub struct OfflineSensor {
    reason: String,
}

impl OfflineSensor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RangeSensor for OfflineSensor {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        Err(AppError::Sensor(format!("sensor offline: {}", self.reason)))
    }
}
