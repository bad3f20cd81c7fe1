use crate::level::LevelSettings;
use crate::state::LevelObservation;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertTransition {
    Raised { fill_percent: f64 },
    Cleared { fill_percent: f64 },
}

/// Edge detector over the alert flag. Observations without a reading leave
/// the current state untouched.
#[derive(Debug, Default)]
pub struct AlertTracker {
    active: bool,
}

impl AlertTracker {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn observe(&mut self, observation: &LevelObservation) -> Option<AlertTransition> {
        let reading = observation.reading?;
        match (self.active, reading.is_above_threshold) {
            (false, true) => {
                self.active = true;
                Some(AlertTransition::Raised {
                    fill_percent: reading.fill_percent,
                })
            }
            (true, false) => {
                self.active = false;
                Some(AlertTransition::Cleared {
                    fill_percent: reading.fill_percent,
                })
            }
            _ => None,
        }
    }
}

/// Log alert transitions for every published observation. A settings
/// change re-derives the last observation, so a new threshold takes effect
/// without waiting for the next sample.
pub fn spawn_alert_watcher(
    observations: watch::Receiver<Option<LevelObservation>>,
    settings: watch::Receiver<LevelSettings>,
) -> JoinHandle<()> {
    tokio::spawn(watch_alerts(observations, settings, log_transition))
}

/// Runs until either channel closes.
pub async fn watch_alerts(
    mut observations: watch::Receiver<Option<LevelObservation>>,
    mut settings: watch::Receiver<LevelSettings>,
    mut on_transition: impl FnMut(AlertTransition),
) {
    let mut tracker = AlertTracker::default();
    let mut latest: Option<LevelObservation> = None;
    loop {
        let observation = tokio::select! {
            changed = observations.changed() => {
                if changed.is_err() {
                    break;
                }
                *observations.borrow_and_update()
            }
            changed = settings.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *settings.borrow_and_update();
                latest.map(|last| LevelObservation::new(last.sample, &current))
            }
        };
        let Some(observation) = observation else {
            continue;
        };
        latest = Some(observation);
        if let Some(transition) = tracker.observe(&observation) {
            on_transition(transition);
        }
    }
}

fn log_transition(transition: AlertTransition) {
    match transition {
        AlertTransition::Raised { fill_percent } => {
            warn!(fill_percent, "Fill level above alert threshold")
        }
        AlertTransition::Cleared { fill_percent } => {
            info!(fill_percent, "Fill level back below alert threshold")
        }
    }
}
