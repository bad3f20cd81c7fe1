use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source for the sampling rate limit.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl Clock for Box<dyn Clock + Send> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Real-time clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same offset, so a test
/// can keep a handle while the sampler owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset = offset.saturating_add(by);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
        self.origin + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now();

        handle.advance(Duration::from_millis(250));

        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn boxed_clock_delegates() {
        let clock = ManualClock::new();
        let boxed: Box<dyn Clock + Send> = Box::new(clock.clone());

        clock.advance(Duration::from_secs(1));

        assert_eq!(boxed.now(), clock.now());
    }
}
