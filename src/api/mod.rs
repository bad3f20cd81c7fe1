use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub mod handlers;
pub mod requests;
pub mod responses;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/distance", get(handlers::get_distance))
        .route("/api/config", get(handlers::get_config))
        .route("/api/saveConfig", post(handlers::save_config))
        .route("/api/health", get(handlers::get_health))
        .route("/api/device", get(handlers::get_device))
        .with_state(state)
}
