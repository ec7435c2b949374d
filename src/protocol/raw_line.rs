use super::ParseError;
use crate::position::{self, PositionRecord, PositionReport};

/// Parses one raw-socket line: `deviceId,latitude,longitude,speed,timestampMs`.
///
/// The line must carry exactly five fields and name the device the listener
/// was started for.
pub fn parse_line(line: &str, expected_device_id: &str) -> Result<PositionReport, ParseError> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();

    if fields.len() != 5 {
        return Err(ParseError::MalformedLine(format!(
            "expected 5 fields, got {}",
            fields.len()
        )));
    }

    if fields[0] != expected_device_id {
        return Err(ParseError::MalformedLine(format!(
            "device id '{}' does not match listener device '{}'",
            fields[0], expected_device_id
        )));
    }

    let latitude = float_field("latitude", fields[1])?;
    let longitude = float_field("longitude", fields[2])?;
    let speed = float_field("speed", fields[3])?;
    let timestamp_ms = fields[4].parse::<i64>().map_err(|_| {
        ParseError::MalformedLine(format!("invalid timestamp '{}'", fields[4]))
    })?;

    let record = PositionRecord::new(fields[0], latitude, longitude, timestamp_ms).with_speed(speed);
    position::validate(&record)?;

    Ok(record.into())
}

fn float_field(name: &str, raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::MalformedLine(format!("invalid {} '{}'", name, raw)))
}
