use crate::clock::Clock;
use crate::error::AppError;
use crate::level::{self, ConfigUpdate, LevelConfig, LevelReading, LevelSettings};
use crate::sampling::{Sample, SampleCache};
use crate::sensor::{RangeSensor, SensorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub type DynSampleCache = SampleCache<Box<dyn RangeSensor + Send>, Box<dyn Clock + Send>>;

/// One sample together with the level derived from it under the settings
/// in force at that moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelObservation {
    pub sample: Sample,
    /// `None` until a valid distance has been measured.
    pub reading: Option<LevelReading>,
}

impl LevelObservation {
    pub fn new(sample: Sample, settings: &LevelSettings) -> Self {
        Self {
            sample,
            reading: sample
                .distance
                .cm()
                .map(|distance_cm| level::compute(distance_cm, settings)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub sensor: SensorKind,
}

/// Process-wide state handed to the router and background workers.
///
/// The sampler and the level config sit behind separate locks so a slow
/// ranging transaction never blocks config reads or writes.
pub struct AppState {
    sampler: Mutex<DynSampleCache>,
    min_interval: Duration,
    level: RwLock<LevelConfig>,
    level_tx: watch::Sender<LevelSettings>,
    observation_tx: watch::Sender<Option<LevelObservation>>,
    device: DeviceInfo,
}

impl AppState {
    pub fn new(sampler: DynSampleCache, level: LevelConfig, device: DeviceInfo) -> Self {
        let (level_tx, _level_rx) = watch::channel(level.get());
        let (observation_tx, _observation_rx) = watch::channel(None);
        Self {
            min_interval: sampler.min_interval(),
            sampler: Mutex::new(sampler),
            level: RwLock::new(level),
            level_tx,
            observation_tx,
            device,
        }
    }

    /// Sample (subject to the rate limit) and derive the current level.
    /// May block for up to one sensor timeout.
    pub fn observe(&self) -> Result<LevelObservation, AppError> {
        let mut sampler = self.sampler.lock().map_err(|_| AppError::StateLock)?;
        let sample = sampler.sample();
        let settings = self.level_settings()?;
        let observation = LevelObservation::new(sample, &settings);
        // Published under the sampler lock so subscribers see samples in order.
        self.observation_tx.send_replace(Some(observation));
        drop(sampler);
        Ok(observation)
    }

    /// Sample carried by the latest published observation. Never waits on
    /// an in-flight ranging transaction.
    pub fn last_sample(&self) -> Sample {
        let latest = *self.observation_tx.borrow();
        latest
            .map(|observation| observation.sample)
            .unwrap_or_default()
    }

    pub fn subscribe_observations(&self) -> watch::Receiver<Option<LevelObservation>> {
        self.observation_tx.subscribe()
    }

    pub fn level_settings(&self) -> Result<LevelSettings, AppError> {
        let guard = self.level.read().map_err(|_| AppError::StateLock)?;
        Ok(guard.get())
    }

    /// Apply a partial update. Accepted fields stick even when the call
    /// returns `AppError::Validation` for the others.
    pub fn update_level(&self, update: ConfigUpdate) -> Result<LevelSettings, AppError> {
        let (result, settings) = {
            let mut guard = self.level.write().map_err(|_| AppError::StateLock)?;
            let result = guard.update(update);
            let settings = guard.get();
            self.level_tx.send_replace(settings);
            (result, settings)
        };
        result?;
        Ok(settings)
    }

    pub fn subscribe_level(&self) -> watch::Receiver<LevelSettings> {
        self.level_tx.subscribe()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn min_sample_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Spawn a sync thread that samples on a fixed cadence so alerts fire even
/// when no client is polling.
pub fn spawn_refresh_thread(
    state: Arc<AppState>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match state.observe() {
                Ok(observation) => debug!(
                    distance_cm = observation.sample.distance.to_wire(),
                    "Background sample taken"
                ),
                Err(err) => warn!(error = %err, "Background sample failed"),
            }
            std::thread::sleep(interval);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::level::ConfigField;
    use crate::sampling::{DEFAULT_MIN_INTERVAL, Distance, Freshness};
    use crate::sensor::Ranging;
    use crate::sensor::mock::MockRangeSensor;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    /// Counts calls and flags any measurement that starts while another is
    /// still running. Each echo reports its call number in centimetres.
    #[derive(Default)]
    struct InFlightSensor {
        in_flight: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl RangeSensor for InFlightSensor {
        fn measure(&mut self) -> Result<Ranging, AppError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(1));
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(Ranging::Echo {
                distance_cm: call as f64,
            })
        }
    }

    /// Holds the ranging transaction open until the test releases it.
    struct GatedSensor {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl RangeSensor for GatedSensor {
        fn measure(&mut self) -> Result<Ranging, AppError> {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(Duration::from_secs(2));
            Ok(Ranging::NoEcho)
        }
    }

    fn state_with(sensor: MockRangeSensor, clock: ManualClock) -> AppState {
        state_with_interval(sensor, clock, DEFAULT_MIN_INTERVAL)
    }

    fn state_with_interval(
        sensor: impl RangeSensor + Send + 'static,
        clock: ManualClock,
        min_interval: Duration,
    ) -> AppState {
        let sampler = SampleCache::new(
            Box::new(sensor) as Box<dyn RangeSensor + Send>,
            Box::new(clock) as Box<dyn Clock + Send>,
            min_interval,
        );
        AppState::new(
            sampler,
            LevelConfig::default(),
            DeviceInfo {
                name: "tank-level".to_string(),
                sensor: SensorKind::Ultrasonic,
            },
        )
    }

    #[test]
    fn observe_derives_level_and_publishes() -> Result<(), AppError> {
        let state = state_with(MockRangeSensor::with_reading(30.0), ManualClock::new());
        let receiver = state.subscribe_observations();

        let observation = state.observe()?;

        let reading = observation.reading.expect("reading for valid distance");
        assert_eq!(reading.fill_percent, 70.0);
        assert!(reading.is_above_threshold);
        assert_eq!(*receiver.borrow(), Some(observation));
        Ok(())
    }

    #[test]
    fn observe_without_valid_distance_has_no_reading() -> Result<(), AppError> {
        let state = state_with(MockRangeSensor::new(vec![]), ManualClock::new());

        let observation = state.observe()?;

        assert_eq!(observation.sample.distance, Distance::Unknown);
        assert_eq!(observation.sample.freshness, Freshness::Stale);
        assert_eq!(observation.reading, None);
        Ok(())
    }

    #[test]
    fn level_update_applies_to_next_observation() -> Result<(), AppError> {
        let state = state_with(MockRangeSensor::with_reading(80.0), ManualClock::new());
        let level_rx = state.subscribe_level();

        state.update_level(ConfigUpdate {
            bucket_height: Some(200.0),
            threshold: Some(40.0),
        })?;
        let reading = state.observe()?.reading.expect("reading");

        assert_eq!(reading.fill_percent, 60.0);
        assert!(reading.is_above_threshold);
        assert_eq!(level_rx.borrow().container_height_cm, 200.0);
        Ok(())
    }

    #[test]
    fn partial_update_reports_rejection_and_keeps_valid_field() -> Result<(), AppError> {
        let state = state_with(MockRangeSensor::with_reading(10.0), ManualClock::new());

        let result = state.update_level(ConfigUpdate {
            bucket_height: Some(150.0),
            threshold: Some(-5.0),
        });

        match result {
            Err(AppError::Validation(err)) => {
                assert_eq!(err.fields(), vec![ConfigField::Threshold])
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        let settings = state.level_settings()?;
        assert_eq!(settings.container_height_cm, 150.0);
        assert_eq!(settings.alert_threshold_percent, 50.0);
        assert_eq!(state.subscribe_level().borrow().container_height_cm, 150.0);
        Ok(())
    }

    #[test]
    fn last_sample_is_latest_published_snapshot() -> Result<(), AppError> {
        let sensor = MockRangeSensor::with_reading(55.0);
        let calls = sensor.call_counter();
        let state = state_with(sensor, ManualClock::new());

        assert_eq!(state.last_sample(), Sample::default());
        state.observe()?;
        let sample = state.last_sample();

        assert_eq!(sample.distance, Distance::Measured(55.0));
        assert_eq!(sample.freshness, Freshness::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn last_sample_does_not_wait_for_ranging() -> Result<(), AppError> {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sensor = GatedSensor {
            entered: entered_tx,
            release: release_rx,
        };
        let state = state_with_interval(sensor, ManualClock::new(), DEFAULT_MIN_INTERVAL);

        std::thread::scope(|scope| {
            let observer = scope.spawn(|| state.observe());
            entered_rx
                .recv_timeout(Duration::from_secs(2))
                .expect("sensor entered");

            let started = Instant::now();
            let sample = state.last_sample();
            let waited = started.elapsed();
            let _ = release_tx.send(());

            assert_eq!(sample.distance, Distance::Unknown);
            assert!(waited < Duration::from_secs(1), "waited {waited:?}");
            observer.join().expect("observer join").map(|_| ())
        })
    }

    #[test]
    fn poisoned_sampler_lock_is_reported() {
        let state = Arc::new(state_with(MockRangeSensor::with_reading(1.0), ManualClock::new()));
        let state_for_thread = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.sampler.lock().expect("lock for poison");
            panic!("poison lock");
        })
        .join();

        assert!(matches!(state.observe(), Err(AppError::StateLock)));
        assert_eq!(state.last_sample(), Sample::default());
        assert!(state.level_settings().is_ok());
    }

    #[test]
    fn concurrent_observers_share_one_measurement_per_interval() -> Result<(), AppError> {
        let sensor = InFlightSensor::default();
        let (calls, overlaps) = (Arc::clone(&sensor.calls), Arc::clone(&sensor.overlaps));
        let clock = ManualClock::new();
        let state = state_with_interval(sensor, clock.clone(), DEFAULT_MIN_INTERVAL);

        for _ in 0..3 {
            std::thread::scope(|scope| {
                let observers: Vec<_> = (0..8).map(|_| scope.spawn(|| state.observe())).collect();
                observers
                    .into_iter()
                    .try_for_each(|observer| observer.join().expect("observer join").map(|_| ()))
            })?;
            clock.advance(DEFAULT_MIN_INTERVAL);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn unthrottled_observers_never_overlap_and_publish_in_order() -> Result<(), AppError> {
        let sensor = InFlightSensor::default();
        let (calls, overlaps) = (Arc::clone(&sensor.calls), Arc::clone(&sensor.overlaps));
        let state = state_with_interval(sensor, ManualClock::new(), Duration::ZERO);

        std::thread::scope(|scope| {
            let observers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..10).try_for_each(|_| state.observe().map(|_| ()))))
                .collect();
            observers
                .into_iter()
                .try_for_each(|observer| observer.join().expect("observer join"))
        })?;

        assert_eq!(calls.load(Ordering::SeqCst), 80);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        // Each measurement reports its call number, so the newest one is 80.
        assert_eq!(state.last_sample().distance, Distance::Measured(80.0));
        Ok(())
    }

    #[test]
    fn refresh_thread_samples_until_stopped() {
        let sensor = MockRangeSensor::with_reading(20.0);
        let calls = sensor.call_counter();
        let state = Arc::new(state_with(sensor, ManualClock::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = spawn_refresh_thread(
            Arc::clone(&state),
            Duration::from_millis(5),
            Arc::clone(&stop),
        );
        std::thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::Relaxed);
        handle.join().expect("refresh thread join");

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(state.last_sample().distance, Distance::Measured(20.0));
    }
}
