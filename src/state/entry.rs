use crate::position::{PositionRecord, PowerSignal};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Liveness entry held per device by the state table
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessEntry {
    /// Current position, replaced wholesale on every accepted update
    pub last_position: PositionRecord,

    /// Arrival time of the last accepted update
    pub last_update_at: DateTime<Utc>,

    /// Power signal carried by the last accepted update; never `Off`,
    /// since power-off removes the entry
    pub power: PowerSignal,
}

impl LivenessEntry {
    pub fn new(position: PositionRecord, power: PowerSignal, now: DateTime<Utc>) -> Self {
        Self {
            last_position: position,
            last_update_at: now,
            power,
        }
    }

    /// True when `now - last_update_at` exceeds `threshold`.
    ///
    /// An update stamped after `now` is never stale.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        (now - self.last_update_at)
            .to_std()
            .map(|age| age > threshold)
            .unwrap_or(false)
    }
}

/// Result of a state table update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Entry created or replaced
    Stored,
    /// Power-off signal; `existed` tells whether an entry was removed
    PoweredOff { existed: bool },
}
