use crate::api::{AppError, AppState};
use crate::protocol::{parse_gprmc, parse_osmand, parse_push, PushedPosition};
use crate::state::UpdateOutcome;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Reply expected by OsmAnd-compatible clients
const OSMAND_ACK: &str = "OK\r\n";

/// Result of an accepted report
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    device_id: String,
    /// `stored` or `powered_off`
    outcome: &'static str,
}

impl IngestResponse {
    fn new(device_id: String, outcome: UpdateOutcome) -> Self {
        let outcome = match outcome {
            UpdateOutcome::Stored => "stored",
            UpdateOutcome::PoweredOff { .. } => "powered_off",
        };
        Self { device_id, outcome }
    }
}

/// Create router with the position ingestion endpoints
pub fn create_ingestion_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices/osmand", get(receive_osmand).post(receive_osmand))
        .route("/api/devices/push", post(receive_push))
        .route("/api/devices/:device_id/nmea", post(receive_nmea))
        .with_state(state)
}

/// GET|POST /api/devices/osmand - OsmAnd query parameters
async fn receive_osmand(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<&'static str, AppError> {
    let report = parse_osmand(&params).map_err(|e| {
        warn!(error = %e, "Rejected OsmAnd report");
        AppError::from(e)
    })?;

    info!(
        device_id = %report.position.device_id,
        lat = report.position.latitude,
        lon = report.position.longitude,
        speed = report.position.speed,
        battery = ?report.position.battery,
        "GPS data received"
    );

    state.table.apply(report);
    Ok(OSMAND_ACK)
}

/// POST /api/devices/push - structured JSON position
async fn receive_push(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let pushed: PushedPosition =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let report = parse_push(pushed)?;
    let device_id = report.position.device_id.clone();
    let outcome = state.table.apply(report);

    Ok(Json(IngestResponse::new(device_id, outcome)))
}

/// POST /api/devices/:device_id/nmea - raw GPRMC sentence as the body
async fn receive_nmea(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    sentence: String,
) -> Result<Json<IngestResponse>, AppError> {
    let report = parse_gprmc(&device_id, &sentence).map_err(|e| {
        warn!(device_id = %device_id, error = %e, "Rejected NMEA sentence");
        AppError::from(e)
    })?;

    let outcome = state.table.apply(report);
    Ok(Json(IngestResponse::new(device_id, outcome)))
}
