use crate::api::requests::parse_config_update;
use crate::api::responses::{
    ConfigResponse, DeviceResponse, DistanceResponse, ErrorCode, ErrorResponse, HealthStatus,
    HealthSuccessResponse, SaveConfigResponse, SaveStatus,
};
use crate::error::AppError;
use crate::sampling::{Distance, Freshness, Sample};
use crate::state::{AppState, LevelObservation};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const INVALID_JSON_MESSAGE: &str = "Bad Request: Invalid JSON";

/// JSON body on success, or an error body with its status code.
pub enum ApiResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_distance(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Sampling may block on the sensor; keep it off the async workers.
    match tokio::task::spawn_blocking(move || build_distance_response(&state)).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Sampling task failed");
            internal_error("/api/distance", "sampling task failed")
        }
    }
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    build_config_response(&state)
}

pub async fn save_config(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    build_save_config_response(&state, &body)
}

pub async fn get_health(State(state): State<Arc<AppState>>) -> Response {
    match build_health_response(&state, SystemTime::now()) {
        (status, ApiResponse::Success(body)) => (status, Json(body)).into_response(),
        (_, response) => response.into_response(),
    }
}

pub async fn get_device(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    build_device_response(&state)
}

fn build_distance_response(state: &AppState) -> ApiResponse<DistanceResponse> {
    match state.observe() {
        Ok(observation) => ApiResponse::Success(distance_body(&observation)),
        Err(err) => internal_error("/api/distance", &err.to_string()),
    }
}

fn distance_body(observation: &LevelObservation) -> DistanceResponse {
    let sample = &observation.sample;
    DistanceResponse {
        distance: sample.distance.to_wire(),
        freshness: sample.freshness,
        age_ms: sample.age.map(|age| age.as_millis() as u64),
        fill_percent: observation.reading.map(|r| r.fill_percent),
        above_threshold: observation.reading.map(|r| r.is_above_threshold),
    }
}

fn build_config_response(state: &AppState) -> ApiResponse<ConfigResponse> {
    match state.level_settings() {
        Ok(settings) => ApiResponse::Success(ConfigResponse {
            bucket_height: settings.container_height_cm,
            threshold: settings.alert_threshold_percent,
        }),
        Err(err) => internal_error("/api/config", &err.to_string()),
    }
}

/// Well-formed JSON always succeeds, even when individual fields are
/// rejected; only a body that fails to parse is a client error.
fn build_save_config_response(state: &AppState, body: &[u8]) -> ApiResponse<SaveConfigResponse> {
    let update = match parse_config_update(body) {
        Ok(update) => update,
        Err(err) => {
            warn!(error = %err, "Rejected saveConfig body");
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidJson,
                INVALID_JSON_MESSAGE,
            );
        }
    };

    let rejected = match state.update_level(update) {
        Ok(_) => Vec::new(),
        Err(AppError::Validation(err)) => err.fields(),
        Err(err) => return internal_error("/api/saveConfig", &err.to_string()),
    };

    ApiResponse::Success(SaveConfigResponse {
        status: SaveStatus::Saved,
        rejected,
    })
}

fn build_health_response(
    state: &AppState,
    now: SystemTime,
) -> (StatusCode, ApiResponse<HealthSuccessResponse>) {
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                internal_error("/api/health", "timestamp formatting failure"),
            );
        }
    };

    let sample = state.last_sample();
    let status = derive_health_status(&sample);
    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        status_code,
        ApiResponse::Success(HealthSuccessResponse {
            status,
            consecutive_failures: sample.consecutive_failures,
            timestamp,
        }),
    )
}

fn derive_health_status(sample: &Sample) -> HealthStatus {
    match (sample.distance, sample.freshness) {
        (Distance::Unknown, _) => HealthStatus::Ko,
        (Distance::Measured(_), Freshness::Fresh) => HealthStatus::Ok,
        (Distance::Measured(_), Freshness::Stale) => HealthStatus::Degraded,
    }
}

fn build_device_response(state: &AppState) -> ApiResponse<DeviceResponse> {
    let device = state.device();
    ApiResponse::Success(DeviceResponse {
        name: device.name.clone(),
        sensor: device.sensor,
        min_interval_ms: state.min_sample_interval().as_millis() as u64,
    })
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route, message, "Internal error while handling request");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::InternalError,
        INTERNAL_ERROR_MESSAGE,
    )
}

fn error_response<T>(status: StatusCode, code: ErrorCode, message: &str) -> ApiResponse<T> {
    let timestamp = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    ApiResponse::Error {
        status,
        body: ErrorResponse {
            error_code: code,
            error_message: message.to_string(),
            timestamp,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, time::error::Format> {
    OffsetDateTime::from(timestamp).format(&Rfc3339)
}
