use crate::error::AppError;
use crate::sensor::{RangeSensor, Ranging};
use std::time::Duration;

#[cfg(target_os = "linux")]
use rppal::i2c::I2c;
#[cfg(target_os = "linux")]
use std::time::Instant;
#[cfg(target_os = "linux")]
use tracing::debug;
#[cfg(target_os = "linux")]
use vl53l1x_uld::{IOVoltage, RangeStatus, VL53L1X};

#[cfg(target_os = "linux")]
const DATA_READY_POLL: Duration = Duration::from_millis(1);

pub fn mm_to_cm(distance_mm: u16) -> f64 {
    f64::from(distance_mm) / 10.0
}

/// Time-of-flight alternative to the ultrasonic ranger, kept in continuous
/// ranging mode and polled for data-ready on each measurement.
#[cfg(target_os = "linux")]
pub struct Vl53l1xRanger {
    driver: VL53L1X<I2c>,
    timeout: Duration,
}

#[cfg(target_os = "linux")]
impl Vl53l1xRanger {
    pub fn new(address: u8, timeout: Duration) -> Result<Self, AppError> {
        let i2c = I2c::new().map_err(|err| AppError::I2c(err.to_string()))?;
        let mut driver = VL53L1X::new(i2c, address);
        driver
            .init(IOVoltage::Volt2_8)
            .map_err(|err| AppError::Sensor(format!("{err:?}")))?;
        driver
            .start_ranging()
            .map_err(|err| AppError::Sensor(format!("start_ranging: {err:?}")))?;
        Ok(Self { driver, timeout })
    }
}

#[cfg(target_os = "linux")]
impl RangeSensor for Vl53l1xRanger {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let ready = self
                .driver
                .is_data_ready()
                .map_err(|err| AppError::Sensor(format!("is_data_ready: {err:?}")))?;
            if ready {
                break;
            }
            if Instant::now() >= deadline {
                return Ok(Ranging::NoEcho);
            }
            std::thread::sleep(DATA_READY_POLL);
        }

        let result = self
            .driver
            .get_result()
            .map_err(|err| AppError::Sensor(format!("{err:?}")))?;
        // Clear interrupt to trigger next measurement
        self.driver
            .clear_interrupt()
            .map_err(|err| AppError::Sensor(format!("clear_interrupt: {err:?}")))?;

        if !matches!(result.status, RangeStatus::Valid) {
            debug!(
                range_status = format_args!("{:?}", result.status),
                distance_mm = result.distance_mm,
                "Discarding time-of-flight result"
            );
            return Ok(Ranging::NoEcho);
        }

        Ok(Ranging::Echo {
            distance_cm: mm_to_cm(result.distance_mm),
        })
    }
}

#[cfg(not(target_os = "linux"))]
pub struct Vl53l1xRanger;

#[cfg(not(target_os = "linux"))]
impl Vl53l1xRanger {
    pub fn new(_address: u8, _timeout: Duration) -> Result<Self, AppError> {
        Err(AppError::I2c(
            "VL53L1X driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl RangeSensor for Vl53l1xRanger {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        Err(AppError::Sensor(
            "VL53L1X driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}
