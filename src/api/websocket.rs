use crate::api::AppState;
use crate::broadcast::DeviceListUpdate;
use crate::subscription::ConnectionManager;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Subscribe before snapshotting so no update falls in between
    let devices_rx = state.table.subscribe_devices();
    let positions_rx = state.table.subscribe_positions();

    let initial = DeviceListUpdate {
        devices: state.table.snapshot_all(),
        timestamp: Utc::now(),
    };

    ConnectionManager::new()
        .handle(socket, initial, devices_rx, positions_rx)
        .await;
}
