use super::PositionRecord;
use crate::protocol::ParseError;

/// Validates the field ranges of a position record.
///
/// Rules:
/// - device id: non-empty
/// - latitude: [-90, 90]
/// - longitude: [-180, 180]
/// - speed: finite and non-negative
/// - bearing: [0, 360)
/// - timestamp: positive epoch milliseconds
pub fn validate(record: &PositionRecord) -> Result<(), ParseError> {
    if record.device_id.trim().is_empty() {
        return Err(ParseError::MissingRequiredField("id"));
    }

    check_range("latitude", record.latitude, -90.0, 90.0)?;
    check_range("longitude", record.longitude, -180.0, 180.0)?;

    if !record.speed.is_finite() || record.speed < 0.0 {
        return Err(ParseError::OutOfRange {
            field: "speed",
            value: record.speed,
        });
    }

    if !record.bearing.is_finite() || record.bearing < 0.0 || record.bearing >= 360.0 {
        return Err(ParseError::OutOfRange {
            field: "bearing",
            value: record.bearing,
        });
    }

    if record.timestamp_ms <= 0 {
        return Err(ParseError::OutOfRange {
            field: "timestamp",
            value: record.timestamp_ms as f64,
        });
    }

    Ok(())
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ParseError> {
    // NaN fails both comparisons, so test for containment rather than exclusion
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ParseError::OutOfRange { field, value })
    }
}
