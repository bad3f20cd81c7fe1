//! Single-wire ultrasonic ranger (trigger and echo share one GPIO line).
//!
//! A transaction drives a short trigger pulse, flips the line to input and
//! times the echo pulse. The configured timeout bounds the whole transaction,
//! not each phase.

use crate::error::AppError;
use crate::sensor::{RangeSensor, Ranging};
use std::time::Duration;

#[cfg(target_os = "linux")]
use rppal::gpio::{Gpio, IoPin, Mode};
#[cfg(target_os = "linux")]
use std::time::Instant;
#[cfg(target_os = "linux")]
use tracing::trace;

/// Round-trip echo time per centimetre, as µs / 29 / 2.
pub const MICROS_PER_CM: u64 = 29;
pub const TRIGGER_SETTLE: Duration = Duration::from_micros(2);
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Convert an echo pulse width into centimetres.
pub fn echo_to_cm(echo: Duration) -> f64 {
    let micros = echo.as_micros() as u64;
    (micros / MICROS_PER_CM / 2) as f64
}

#[cfg(target_os = "linux")]
pub struct UltrasonicRanger {
    pin: IoPin,
    timeout: Duration,
}

#[cfg(target_os = "linux")]
impl UltrasonicRanger {
    pub fn new(sig_pin: u8, timeout: Duration) -> Result<Self, AppError> {
        let gpio = Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;
        let pin = gpio
            .get(sig_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_io(Mode::Output);
        Ok(Self { pin, timeout })
    }

    fn trigger(&mut self) {
        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        spin_for(TRIGGER_SETTLE);
        self.pin.set_high();
        spin_for(TRIGGER_PULSE);
        self.pin.set_low();
        self.pin.set_mode(Mode::Input);
    }

    /// Spin until the line reaches `high` or the deadline passes.
    fn wait_for_level(&self, high: bool, deadline: Instant) -> Option<Instant> {
        loop {
            let now = Instant::now();
            if self.pin.is_high() == high {
                return Some(now);
            }
            if now >= deadline {
                return None;
            }
            std::hint::spin_loop();
        }
    }
}

#[cfg(target_os = "linux")]
impl RangeSensor for UltrasonicRanger {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        let deadline = Instant::now() + self.timeout;
        self.trigger();

        let Some(rise) = self.wait_for_level(true, deadline) else {
            trace!("No echo pulse start before timeout");
            return Ok(Ranging::NoEcho);
        };
        let Some(fall) = self.wait_for_level(false, deadline) else {
            trace!("Echo pulse did not end before timeout");
            return Ok(Ranging::NoEcho);
        };

        Ok(Ranging::Echo {
            distance_cm: echo_to_cm(fall.saturating_duration_since(rise)),
        })
    }
}

#[cfg(target_os = "linux")]
fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

#[cfg(not(target_os = "linux"))]
pub struct UltrasonicRanger;

#[cfg(not(target_os = "linux"))]
impl UltrasonicRanger {
    pub fn new(_sig_pin: u8, _timeout: Duration) -> Result<Self, AppError> {
        Err(AppError::Gpio(
            "ultrasonic ranger requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl RangeSensor for UltrasonicRanger {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        Err(AppError::Sensor(
            "ultrasonic ranger requires Linux/Raspberry Pi".to_string(),
        ))
    }
}
