use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_BUCKET_HEIGHT_CM: f64 = 100.0;
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 50.0;

/// Snapshot returned by [`LevelConfig::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSettings {
    pub container_height_cm: f64,
    pub alert_threshold_percent: f64,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            container_height_cm: DEFAULT_BUCKET_HEIGHT_CM,
            alert_threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

/// Requested changes; absent fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigUpdate {
    pub bucket_height: Option<f64>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigField {
    #[serde(rename = "bucketHeight")]
    BucketHeight,
    #[serde(rename = "threshold")]
    Threshold,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigField::BucketHeight => f.write_str("bucketHeight"),
            ConfigField::Threshold => f.write_str("threshold"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRejection {
    pub field: ConfigField,
    pub value: f64,
}

impl fmt::Display for FieldRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("rejected config field(s): {}", join_rejections(.rejected))]
pub struct ValidationError {
    pub rejected: Vec<FieldRejection>,
}

fn join_rejections(rejected: &[FieldRejection]) -> String {
    rejected
        .iter()
        .map(FieldRejection::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    pub fn fields(&self) -> Vec<ConfigField> {
        self.rejected.iter().map(|r| r.field).collect()
    }
}

/// Container height and alert threshold, mutated only through [`LevelConfig::update`].
///
/// Updates are accepted per field: a valid height travelling with an invalid
/// threshold is still applied, and only the threshold is reported back as
/// rejected. Callers that need all-or-nothing semantics must check the
/// returned [`ValidationError`] and the following `get()` themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelConfig {
    settings: LevelSettings,
}

impl LevelConfig {
    pub fn new(
        container_height_cm: f64,
        alert_threshold_percent: f64,
    ) -> Result<Self, ValidationError> {
        let mut rejected = Vec::new();
        if !valid_height(container_height_cm) {
            rejected.push(FieldRejection {
                field: ConfigField::BucketHeight,
                value: container_height_cm,
            });
        }
        if !valid_threshold(alert_threshold_percent) {
            rejected.push(FieldRejection {
                field: ConfigField::Threshold,
                value: alert_threshold_percent,
            });
        }
        if !rejected.is_empty() {
            return Err(ValidationError { rejected });
        }

        Ok(Self {
            settings: LevelSettings {
                container_height_cm,
                alert_threshold_percent,
            },
        })
    }

    pub fn get(&self) -> LevelSettings {
        self.settings
    }

    pub fn update(&mut self, update: ConfigUpdate) -> Result<(), ValidationError> {
        let mut rejected = Vec::new();

        if let Some(height) = update.bucket_height {
            if valid_height(height) {
                self.settings.container_height_cm = height;
                info!(bucket_height_cm = height, "Bucket height updated");
            } else {
                warn!(bucket_height_cm = height, "Rejected invalid bucket height");
                rejected.push(FieldRejection {
                    field: ConfigField::BucketHeight,
                    value: height,
                });
            }
        }

        if let Some(threshold) = update.threshold {
            if valid_threshold(threshold) {
                self.settings.alert_threshold_percent = threshold;
                info!(threshold_percent = threshold, "Alert threshold updated");
            } else {
                warn!(threshold_percent = threshold, "Rejected invalid alert threshold");
                rejected.push(FieldRejection {
                    field: ConfigField::Threshold,
                    value: threshold,
                });
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { rejected })
        }
    }
}

fn valid_height(height: f64) -> bool {
    height.is_finite() && height > 0.0
}

fn valid_threshold(threshold: f64) -> bool {
    threshold.is_finite() && (0.0..=100.0).contains(&threshold)
}
