// Canonical position record shared by every protocol adapter

mod validation;

pub use validation::validate;

use serde::{Deserialize, Serialize};

/// Normalized GPS fix for one device.
///
/// Records are never mutated after construction: the state table replaces
/// the whole record on every accepted update and readers only get clones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// km/h
    pub speed: f64,
    /// Degrees clockwise from north, [0, 360)
    pub bearing: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    /// Milliseconds since the Unix epoch
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub status: PositionStatus,
}

impl PositionRecord {
    /// Minimal record with optional fields unset and status active.
    pub fn new(device_id: impl Into<String>, latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            device_id: device_id.into(),
            latitude,
            longitude,
            speed: 0.0,
            bearing: 0.0,
            altitude: None,
            accuracy: None,
            battery: None,
            timestamp_ms,
            status: PositionStatus::Active,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = bearing;
        self
    }

    pub fn with_status(mut self, status: PositionStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Inactive,
}

/// In-band power indicator carried alongside a position.
///
/// `Off` is an intentional shutdown, distinct from a device simply going
/// silent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    On,
    Off,
    #[default]
    Unspecified,
}

/// What a protocol adapter produces: a position plus the power signal it
/// observed on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionReport {
    pub position: PositionRecord,
    pub power: PowerSignal,
}

impl PositionReport {
    pub fn new(position: PositionRecord, power: PowerSignal) -> Self {
        Self { position, power }
    }
}

impl From<PositionRecord> for PositionReport {
    fn from(position: PositionRecord) -> Self {
        Self::new(position, PowerSignal::Unspecified)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
