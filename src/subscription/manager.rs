use crate::broadcast::DeviceListUpdate;
use crate::position::PositionRecord;
use crate::subscription::protocol::{ClientMessage, DeviceListMessage, ErrorMessage, PositionMessage};
use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Manages a single WebSocket connection with per-device subscriptions
pub struct ConnectionManager {
    /// Device IDs whose position messages this connection receives
    subscriptions: HashSet<String>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: HashSet::new(),
        }
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// Sends `initial` first, then every device-list update and the
    /// positions of subscribed devices.
    pub async fn handle(
        mut self,
        mut socket: WebSocket,
        initial: DeviceListUpdate,
        mut devices_rx: broadcast::Receiver<DeviceListUpdate>,
        mut positions_rx: broadcast::Receiver<PositionRecord>,
    ) {
        info!("WebSocket connection established");

        if let Err(e) = send_json(&mut socket, &DeviceListMessage::from(initial)).await {
            error!(error = %e, "Failed to send initial device list");
            return;
        }

        loop {
            tokio::select! {
                // Handle incoming client messages
                msg = socket.recv() => {
                    let Some(msg) = msg else {
                        info!("WebSocket stream ended");
                        break;
                    };
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Err(e) = self.handle_client_message(&text) {
                                warn!(error = %e, "Invalid client message");
                                let reply = ErrorMessage::new(e.to_string());
                                if send_json(&mut socket, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(Message::Close(_)) => {
                            info!("WebSocket client disconnected");
                            break;
                        }
                        Ok(Message::Ping(data)) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Ok(_) => {
                            // Ignore binary, pong messages
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Full device list on every change
                result = devices_rx.recv() => {
                    match result {
                        Ok(update) => {
                            if let Err(e) = send_json(&mut socket, &DeviceListMessage::from(update)).await {
                                error!(error = %e, "Failed to send device list");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "WebSocket lagged, skipped device lists");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("Device list channel closed");
                            break;
                        }
                    }
                }

                // Per-device positions, filtered by subscription
                result = positions_rx.recv() => {
                    match result {
                        Ok(position) => {
                            if self.should_forward(&position) {
                                if let Err(e) = send_json(&mut socket, &PositionMessage::from(position)).await {
                                    error!(error = %e, "Failed to send position");
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "WebSocket lagged, skipped positions");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("Position channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("WebSocket connection closed");
    }

    /// Handle client message (subscribe/unsubscribe)
    fn handle_client_message(&mut self, text: &str) -> anyhow::Result<()> {
        let msg: ClientMessage = serde_json::from_str(text)?;

        match msg {
            ClientMessage::Subscribe { device_id } => {
                info!(device_id = %device_id, "Client subscribed to device");
                self.subscriptions.insert(device_id);
            }
            ClientMessage::Unsubscribe { device_id } => {
                info!(device_id = %device_id, "Client unsubscribed from device");
                self.subscriptions.remove(&device_id);
            }
        }

        Ok(())
    }

    /// Positions are forwarded only for subscribed devices
    fn should_forward(&self, position: &PositionRecord) -> bool {
        self.subscriptions.contains(&position.device_id)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
