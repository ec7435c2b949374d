// Real-time fan-out of device state to subscribers

use crate::position::PositionRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Full device list published on the general channel
#[derive(Clone, Debug, Serialize)]
pub struct DeviceListUpdate {
    pub devices: Vec<PositionRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget publisher over two broadcast channels.
///
/// Sending never blocks: with no subscribers the message is dropped, and a
/// slow subscriber lags and skips messages instead of applying back-pressure.
#[derive(Clone)]
pub struct Broadcaster {
    /// General device-list channel
    devices_tx: broadcast::Sender<DeviceListUpdate>,
    /// Per-device position channel; receivers filter by device id
    positions_tx: broadcast::Sender<PositionRecord>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (devices_tx, _) = broadcast::channel(capacity.max(1));
        let (positions_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            devices_tx,
            positions_tx,
        }
    }

    /// Whether anybody listens on the device-list channel
    pub fn has_device_subscribers(&self) -> bool {
        self.devices_tx.receiver_count() > 0
    }

    pub fn publish_devices(&self, devices: Vec<PositionRecord>) {
        let update = DeviceListUpdate {
            devices,
            timestamp: Utc::now(),
        };
        if self.devices_tx.send(update).is_err() {
            debug!("No device list subscribers");
        }
    }

    pub fn publish_position(&self, position: PositionRecord) {
        // No subscribers is fine
        let _ = self.positions_tx.send(position);
    }

    pub fn subscribe_devices(&self) -> broadcast::Receiver<DeviceListUpdate> {
        self.devices_tx.subscribe()
    }

    pub fn subscribe_positions(&self) -> broadcast::Receiver<PositionRecord> {
        self.positions_tx.subscribe()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
