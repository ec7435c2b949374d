use super::ParseError;
use crate::position::{self, now_ms, PositionRecord, PositionReport, PositionStatus, PowerSignal};
use serde::Deserialize;

/// Structured position pushed by a simulator or a trusted upstream.
///
/// Required fields are optional here so that a missing one surfaces as
/// `MissingRequiredField` instead of a generic deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedPosition {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub battery: Option<f64>,
    /// Epoch milliseconds; stamped with the current time when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub status: Option<PositionStatus>,
    /// `false` is a power-off signal
    #[serde(default)]
    pub power: Option<bool>,
}

/// Direct-push adapter: validate ranges, default the optional fields.
pub fn parse_push(pushed: PushedPosition) -> Result<PositionReport, ParseError> {
    let device_id = pushed
        .device_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ParseError::MissingRequiredField("deviceId"))?;
    let latitude = pushed
        .latitude
        .ok_or(ParseError::MissingRequiredField("latitude"))?;
    let longitude = pushed
        .longitude
        .ok_or(ParseError::MissingRequiredField("longitude"))?;

    let record = PositionRecord {
        device_id,
        latitude,
        longitude,
        speed: pushed.speed.unwrap_or(0.0),
        bearing: pushed.bearing.unwrap_or(0.0),
        altitude: pushed.altitude,
        accuracy: pushed.accuracy,
        battery: pushed.battery,
        timestamp_ms: pushed.timestamp.unwrap_or_else(now_ms),
        status: pushed.status.unwrap_or(PositionStatus::Active),
    };

    let power = match pushed.power {
        Some(true) => PowerSignal::On,
        Some(false) => PowerSignal::Off,
        None => PowerSignal::Unspecified,
    };

    // Power-off overrides spatial validity
    if power != PowerSignal::Off {
        position::validate(&record)?;
    }

    Ok(PositionReport::new(record, power))
}
