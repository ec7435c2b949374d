use crate::api::{AppError, AppState};
use crate::config::TrackingMode;
use crate::device::{ListenHint, StartOutcome, TaskMode};
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Optional body of a start request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Bind address override for listening tasks
    pub server_url: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<TrackingMode>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub device_id: String,
    /// False when a task for the device was already running
    pub started: bool,
    pub mode: TaskMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub device_id: String,
    /// False when the device was not monitored
    pub stopped: bool,
}

/// Create router for device task control
pub fn create_device_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices/:device_id/start", post(start_monitoring))
        .route("/api/devices/:device_id/stop", post(stop_monitoring))
        .with_state(state)
}

/// POST /api/devices/:device_id/start - body is optional
async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<Json<StartResponse>, AppError> {
    let request: StartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };

    let mode = TaskMode::from(request.mode.unwrap_or(state.default_mode));
    let hint = ListenHint::from_server_url(request.server_url.as_deref(), request.port);
    let hint = (hint != ListenHint::default()).then_some(hint);

    let outcome = state.tasks.start_monitoring(&device_id, mode, hint);

    Ok(Json(StartResponse {
        device_id,
        started: outcome == StartOutcome::Started,
        mode,
    }))
}

/// POST /api/devices/:device_id/stop
async fn stop_monitoring(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Json<StopResponse> {
    let stopped = state.tasks.stop_monitoring(&device_id).await;
    Json(StopResponse { device_id, stopped })
}
