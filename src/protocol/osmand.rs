use super::ParseError;
use crate::position::{self, now_ms, PositionRecord, PositionReport, PositionStatus, PowerSignal};
use std::collections::HashMap;

/// OsmAnd-style adapter stamping missing timestamps with the current time.
pub fn parse_osmand(params: &HashMap<String, String>) -> Result<PositionReport, ParseError> {
    parse_osmand_at(params, now_ms())
}

/// OsmAnd-style adapter with an explicit fallback time.
///
/// Parameters:
/// - `id`, `lat`/`latitude`, `lon`/`longitude`: required
/// - `timestamp`: whole seconds since the epoch, converted to milliseconds
/// - `speed`, `bearing`: default 0.0 when absent or unparsable
/// - `altitude`, `accuracy`, `batt`/`battery`: left unset when absent or unparsable
/// - `power`: `0` signals power-off, `1` power-on
pub fn parse_osmand_at(
    params: &HashMap<String, String>,
    fallback_ms: i64,
) -> Result<PositionReport, ParseError> {
    let device_id = lookup(params, &["id", "deviceid"])
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingRequiredField("id"))?;

    let latitude =
        number(params, &["lat", "latitude"]).ok_or(ParseError::MissingRequiredField("lat"))?;
    let longitude =
        number(params, &["lon", "longitude"]).ok_or(ParseError::MissingRequiredField("lon"))?;

    let timestamp_ms = lookup(params, &["timestamp"])
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(fallback_ms);

    let record = PositionRecord {
        device_id: device_id.to_string(),
        latitude,
        longitude,
        speed: number(params, &["speed"]).unwrap_or(0.0),
        bearing: number(params, &["bearing"])
            .map(|b| b.rem_euclid(360.0))
            .unwrap_or(0.0),
        altitude: number(params, &["altitude"]),
        accuracy: number(params, &["accuracy"]),
        battery: number(params, &["batt", "battery"]),
        timestamp_ms,
        status: PositionStatus::Active,
    };

    // Power-off overrides spatial validity
    let power = power_signal(params);
    if power != PowerSignal::Off {
        position::validate(&record)?;
    }

    Ok(PositionReport::new(record, power))
}

fn lookup<'a>(params: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| params.get(*name))
        .map(String::as_str)
}

fn number(params: &HashMap<String, String>, names: &[&str]) -> Option<f64> {
    lookup(params, names)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn power_signal(params: &HashMap<String, String>) -> PowerSignal {
    match lookup(params, &["power"]).map(str::trim) {
        Some("0") | Some("false") => PowerSignal::Off,
        Some("1") | Some("true") => PowerSignal::On,
        _ => PowerSignal::Unspecified,
    }
}
