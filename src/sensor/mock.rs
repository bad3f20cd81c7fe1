use crate::error::AppError;
use crate::sensor::{RangeSensor, Ranging};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockRangeBehavior {
    Echo(f64),
    NoEcho,
    Fail,
}

impl MockRangeBehavior {
    fn outcome(self) -> Result<Ranging, AppError> {
        match self {
            MockRangeBehavior::Echo(distance_cm) => Ok(Ranging::Echo { distance_cm }),
            MockRangeBehavior::NoEcho => Ok(Ranging::NoEcho),
            MockRangeBehavior::Fail => Err(AppError::Sensor("mock measure failed".to_string())),
        }
    }
}

/// Replays a scripted list of outcomes, then repeats the fallback forever.
#[derive(Debug)]
pub struct MockRangeSensor {
    script: VecDeque<MockRangeBehavior>,
    fallback: MockRangeBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockRangeSensor {
    pub fn new(behaviors: Vec<MockRangeBehavior>) -> Self {
        Self {
            script: behaviors.into(),
            fallback: MockRangeBehavior::NoEcho,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_reading(distance_cm: f64) -> Self {
        Self::new(Vec::new()).with_fallback(MockRangeBehavior::Echo(distance_cm))
    }

    pub fn with_fallback(mut self, fallback: MockRangeBehavior) -> Self {
        self.fallback = fallback;
        self
    }

    /// Shared counter of `measure` calls; stays valid after the sensor is boxed.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl RangeSensor for MockRangeSensor {
    fn measure(&mut self) -> Result<Ranging, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or(self.fallback).outcome()
    }
}
