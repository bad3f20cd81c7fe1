//! Container geometry, alert threshold and the fill-level derivation.

pub mod calculator;
pub mod settings;

pub use calculator::{LevelReading, compute};
pub use settings::{
    ConfigField, ConfigUpdate, FieldRejection, LevelConfig, LevelSettings, ValidationError,
};
