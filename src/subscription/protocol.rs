use crate::broadcast::DeviceListUpdate;
use crate::position::PositionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Receive position messages for one device
    #[serde(rename = "subscribe")]
    Subscribe { device_id: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { device_id: String },
}

/// Server → Client: full device list
#[derive(Debug, Clone, Serialize)]
pub struct DeviceListMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub devices: Vec<PositionRecord>,
    pub timestamp: DateTime<Utc>,
}

impl From<DeviceListUpdate> for DeviceListMessage {
    fn from(update: DeviceListUpdate) -> Self {
        Self {
            msg_type: "devices".to_string(),
            devices: update.devices,
            timestamp: update.timestamp,
        }
    }
}

/// Server → Client: position of a subscribed device
#[derive(Debug, Clone, Serialize)]
pub struct PositionMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub position: PositionRecord,
}

impl From<PositionRecord> for PositionMessage {
    fn from(position: PositionRecord) -> Self {
        Self {
            msg_type: "position".to_string(),
            position,
        }
    }
}

/// Server → Client: Error message
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: String) -> Self {
        Self {
            msg_type: "error".to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_deserialize() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "subscribe", "device_id": "dev1"})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                device_id: "dev1".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "unsubscribe", "device_id": "dev1"})).unwrap();
        assert!(matches!(msg, ClientMessage::Unsubscribe { .. }));

        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "dance"})).is_err());
    }

    #[test]
    fn test_position_message_shape() {
        let msg = PositionMessage::from(PositionRecord::new("dev1", 1.0, 2.0, 3));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], json!("position"));
        assert_eq!(value["position"]["deviceId"], json!("dev1"));
    }
}
