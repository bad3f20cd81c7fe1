pub mod alert;
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod level;
pub mod sampling;
pub mod sensor;
pub mod state;
