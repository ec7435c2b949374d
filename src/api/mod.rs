// HTTP and WebSocket APIs

pub mod devices;
pub mod ingestion;
pub mod query;
pub mod websocket;

pub use devices::create_device_router;
pub use ingestion::create_ingestion_router;
pub use query::create_query_router;
pub use websocket::{create_ws_router, ws_handler};

use crate::config::TrackingMode;
use crate::device::DeviceTaskManager;
use crate::protocol::ParseError;
use crate::state::DeviceStateTable;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<DeviceStateTable>,
    pub tasks: Arc<DeviceTaskManager>,
    /// Task mode used when a start request does not name one
    pub default_mode: TrackingMode,
}

/// Full HTTP surface: ingestion, queries, device control and WebSocket
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .merge(create_ingestion_router(Arc::clone(&state)))
        .merge(create_query_router(Arc::clone(&state)))
        .merge(create_device_router(Arc::clone(&state)))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive())
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Input rejected by a protocol adapter
    Rejected(ParseError),
    /// Request body could not be decoded
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = match self {
            AppError::Rejected(e) => e.to_string(),
            AppError::BadRequest(msg) => msg,
        };
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
    }
}

impl From<ParseError> for AppError {
    fn from(e: ParseError) -> Self {
        AppError::Rejected(e)
    }
}
