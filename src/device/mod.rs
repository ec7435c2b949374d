//! Per-device background tasks.
//!
//! Each monitored device gets exactly one task, either a position simulator
//! or a raw-socket listener relaying a real device. Tasks feed the device
//! state table and stop cooperatively through a cancellation token.

mod listener;
mod manager;
mod simulator;

pub use listener::ListenerSettings;
pub use manager::{DeviceTaskManager, MonitorSettings, MonitoredDevice, StartOutcome};
pub use simulator::PositionSimulator;

use crate::config::TrackingMode;
use serde::{Deserialize, Serialize};

/// Kind of background producer running for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Synthetic motion generator
    Simulated,
    /// Raw-socket relay for a real device
    Listening,
}

impl From<TrackingMode> for TaskMode {
    fn from(mode: TrackingMode) -> Self {
        match mode {
            TrackingMode::Simulation => TaskMode::Simulated,
            TrackingMode::Real => TaskMode::Listening,
        }
    }
}

/// Caller-supplied override for where a listening task binds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenHint {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ListenHint {
    /// Builds a hint from a loose server URL such as `tcp://10.0.0.5:5055`,
    /// `10.0.0.5` or `0.0.0.0:6000`. An explicit `port` wins over one found
    /// in the URL.
    pub fn from_server_url(server_url: Option<&str>, port: Option<u16>) -> Self {
        let mut hint = ListenHint { host: None, port };

        let Some(url) = server_url.map(str::trim).filter(|u| !u.is_empty()) else {
            return hint;
        };

        let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
        let authority = without_scheme.split('/').next().unwrap_or(without_scheme);

        match authority.rsplit_once(':') {
            Some((host, port_str)) if !host.is_empty() && !host.ends_with(':') => {
                if let Ok(parsed) = port_str.parse::<u16>() {
                    hint.port = hint.port.or(Some(parsed));
                    hint.host = Some(host.to_string());
                } else {
                    hint.host = Some(authority.to_string());
                }
            }
            _ if !authority.is_empty() => hint.host = Some(authority.to_string()),
            _ => {}
        }

        hint
    }
}

#[cfg(test)]
mod tests;
