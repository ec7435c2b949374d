use crate::api::AppState;
use crate::device::MonitoredDevice;
use crate::position::{PositionRecord, PositionStatus};
use crate::state::LivenessEntry;
use axum::{
    extract::{ConnectInfo, Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Status of a single device; `status` is null when the device is unknown
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusResponse {
    pub device_id: String,
    pub status: Option<PositionStatus>,
}

/// Create query API router
pub fn create_query_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices/positions", get(list_positions))
        .route("/api/devices/status", get(list_statuses))
        .route("/api/devices/monitored", get(list_monitored))
        .route("/api/devices/:device_id/status", get(device_status))
        .route("/api/devices/ping", get(ping))
        .route("/api/devices/test", get(test))
        .with_state(state)
}

/// GET /api/devices/positions - current position of every live device
async fn list_positions(State(state): State<Arc<AppState>>) -> Json<Vec<PositionRecord>> {
    Json(state.table.snapshot_all())
}

/// GET /api/devices/status - liveness entry per device id
async fn list_statuses(
    State(state): State<Arc<AppState>>,
) -> Json<HashMap<String, LivenessEntry>> {
    Json(state.table.statuses())
}

/// GET /api/devices/monitored - running device tasks
async fn list_monitored(State(state): State<Arc<AppState>>) -> Json<Vec<MonitoredDevice>> {
    Json(state.tasks.monitored())
}

/// GET /api/devices/:device_id/status
async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Json<DeviceStatusResponse> {
    let status = state.table.status_of(&device_id);
    Json(DeviceStatusResponse { device_id, status })
}

async fn ping() -> &'static str {
    "pong"
}

/// GET /api/devices/test - liveness probe that logs the caller
async fn test(connect_info: Option<ConnectInfo<SocketAddr>>) -> &'static str {
    match connect_info {
        Some(ConnectInfo(addr)) => info!(remote = %addr, "Test endpoint called"),
        None => info!("Test endpoint called"),
    }
    "Server is running!"
}
