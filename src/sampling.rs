//! Rate-limited, validity-filtered access to the range sensor.
//!
//! The HTTP layer may poll as often as it likes; the sensor is only touched
//! once per minimum interval. Readings outside the valid window, missing
//! echoes and driver errors never replace the last good distance. They only
//! mark the held value as stale.

use crate::clock::Clock;
use crate::sensor::{RangeSensor, Ranging};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const MIN_DISTANCE_CM: f64 = 0.0;
pub const MAX_DISTANCE_CM: f64 = 400.0;
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// A validated distance, or nothing measured yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Distance {
    #[default]
    Unknown,
    Measured(f64),
}

impl Distance {
    /// Wire value reported while no valid measurement exists.
    pub const SENTINEL_CM: f64 = -1.0;

    pub fn from_cm(distance_cm: f64) -> Option<Self> {
        if distance_cm.is_finite() && (MIN_DISTANCE_CM..=MAX_DISTANCE_CM).contains(&distance_cm) {
            Some(Distance::Measured(distance_cm))
        } else {
            None
        }
    }

    pub fn cm(self) -> Option<f64> {
        match self {
            Distance::Measured(cm) => Some(cm),
            Distance::Unknown => None,
        }
    }

    pub fn to_wire(self) -> f64 {
        self.cm().unwrap_or(Self::SENTINEL_CM)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// The most recent sensor attempt produced the held distance.
    Fresh,
    /// The most recent attempt failed; the held distance is older, or unknown.
    #[default]
    Stale,
}

/// The default is the state before any sensor attempt.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub distance: Distance,
    pub freshness: Freshness,
    /// Time since the held distance was measured.
    pub age: Option<Duration>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct SampleState {
    last_distance: Distance,
    last_sample_at: Option<Instant>,
    last_valid_at: Option<Instant>,
    last_attempt_ok: bool,
    consecutive_failures: u32,
}

pub struct SampleCache<S, C> {
    sensor: S,
    clock: C,
    min_interval: Duration,
    state: SampleState,
}

impl<S, C> SampleCache<S, C>
where
    S: RangeSensor,
    C: Clock,
{
    pub fn new(sensor: S, clock: C, min_interval: Duration) -> Self {
        Self {
            sensor,
            clock,
            min_interval,
            state: SampleState::default(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Return the current distance, measuring first if the interval has elapsed.
    pub fn sample(&mut self) -> Sample {
        let now = self.clock.now();
        let due = self
            .state
            .last_sample_at
            .is_none_or(|at| now.saturating_duration_since(at) >= self.min_interval);
        if due {
            self.refresh(now);
        }
        self.snapshot(now)
    }

    fn refresh(&mut self, now: Instant) {
        // Stamp before validating so persistent failures stay rate limited.
        self.state.last_sample_at = Some(match self.state.last_sample_at {
            Some(previous) => previous.max(now),
            None => now,
        });

        match self.sensor.measure() {
            Ok(Ranging::Echo { distance_cm }) => match Distance::from_cm(distance_cm) {
                Some(distance) => {
                    debug!(distance_cm, "Range sample accepted");
                    self.state.last_distance = distance;
                    self.state.last_valid_at = Some(now);
                    self.state.last_attempt_ok = true;
                    self.state.consecutive_failures = 0;
                }
                None => self.record_failure(format_args!(
                    "distance out of range: {distance_cm}cm \
                     (expected {MIN_DISTANCE_CM}-{MAX_DISTANCE_CM})"
                )),
            },
            Ok(Ranging::NoEcho) => self.record_failure(format_args!("no echo")),
            Err(err) => self.record_failure(format_args!("measure failed: {err}")),
        }
    }

    fn record_failure(&mut self, reason: std::fmt::Arguments<'_>) {
        self.state.last_attempt_ok = false;
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        warn!(
            reason = %reason,
            consecutive_failures = self.state.consecutive_failures,
            retained_cm = self.state.last_distance.to_wire(),
            "Invalid range sample, keeping last known distance"
        );
    }

    fn snapshot(&self, now: Instant) -> Sample {
        let freshness = if self.state.last_attempt_ok {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        Sample {
            distance: self.state.last_distance,
            freshness,
            age: self
                .state
                .last_valid_at
                .map(|at| now.saturating_duration_since(at)),
            consecutive_failures: self.state.consecutive_failures,
        }
    }
}
