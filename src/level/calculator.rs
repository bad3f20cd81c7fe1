use crate::level::LevelSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    pub raw_distance_cm: f64,
    pub fill_percent: f64,
    pub is_above_threshold: bool,
}

/// Map a sensor-to-surface distance onto a fill percentage clamped to [0, 100].
///
/// The sensor sits at the container rim, so a distance equal to the height is
/// an empty container and a distance of zero is a full one.
pub fn compute(distance_cm: f64, settings: &LevelSettings) -> LevelReading {
    let height = settings.container_height_cm;
    let raw = (height - distance_cm) / height * 100.0;
    let fill_percent = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };

    LevelReading {
        raw_distance_cm: distance_cm,
        fill_percent,
        is_above_threshold: fill_percent > settings.alert_threshold_percent,
    }
}
