use crate::broadcast::{Broadcaster, DeviceListUpdate};
use crate::position::{PositionRecord, PositionReport, PositionStatus, PowerSignal};
use crate::state::entry::{LivenessEntry, UpdateOutcome};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Default staleness threshold (5 minutes)
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(300);

/// Last-known state of every live device.
///
/// Entries are created lazily on the first accepted update and removed on
/// power-off or by the reaper once stale. Each write replaces the whole entry
/// under the shard lock, so readers never see a torn record.
pub struct DeviceStateTable {
    /// Lock-free concurrent map keyed by device id
    pub(crate) entries: DashMap<String, LivenessEntry>,

    /// Silence longer than this makes a device stale
    offline_threshold: Duration,

    /// Fan-out of snapshots and per-device positions
    broadcaster: Broadcaster,
}

impl DeviceStateTable {
    pub fn new(offline_threshold: Duration, broadcaster: Broadcaster) -> Self {
        Self {
            entries: DashMap::new(),
            offline_threshold,
            broadcaster,
        }
    }

    pub fn offline_threshold(&self) -> Duration {
        self.offline_threshold
    }

    /// Upsert the position for `device_id` (core state mutation).
    ///
    /// An explicit power-off deletes the entry instead and publishes nothing;
    /// deletions are only announced by the reaper. Every other update
    /// publishes the full snapshot and the device's own record.
    pub fn update(
        &self,
        device_id: &str,
        mut record: PositionRecord,
        power: PowerSignal,
    ) -> UpdateOutcome {
        if power == PowerSignal::Off {
            let existed = self.entries.remove(device_id).is_some();
            info!(device_id = %device_id, existed, "Device powered off, entry removed");
            return UpdateOutcome::PoweredOff { existed };
        }

        if record.device_id != device_id {
            record.device_id = device_id.to_string();
        }

        self.entries.insert(
            device_id.to_string(),
            LivenessEntry::new(record.clone(), power, Utc::now()),
        );

        debug!(
            device_id = %device_id,
            latitude = record.latitude,
            longitude = record.longitude,
            "Position updated"
        );

        // Shard lock is released above; snapshotting here cannot deadlock
        if self.broadcaster.has_device_subscribers() {
            self.broadcaster.publish_devices(self.snapshot_all());
        }
        self.broadcaster.publish_position(record);

        UpdateOutcome::Stored
    }

    /// Apply an adapter report keyed by the device id it carries
    pub fn apply(&self, report: PositionReport) -> UpdateOutcome {
        let device_id = report.position.device_id.clone();
        self.update(&device_id, report.position, report.power)
    }

    /// Copy of every current position, sorted by device id.
    ///
    /// Status is `inactive` only for entries already past the offline
    /// threshold that the reaper has not swept yet.
    pub fn snapshot_all(&self) -> Vec<PositionRecord> {
        let now = Utc::now();
        let mut positions: Vec<PositionRecord> = self
            .entries
            .iter()
            .map(|entry| self.derive_position(entry.value(), now))
            .collect();
        positions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        positions
    }

    /// `None` when the device is unknown or was evicted
    pub fn status_of(&self, device_id: &str) -> Option<PositionStatus> {
        let now = Utc::now();
        self.entries
            .get(device_id)
            .map(|entry| self.derive_status(entry.value(), now))
    }

    /// Copy of a single liveness entry
    pub fn get(&self, device_id: &str) -> Option<LivenessEntry> {
        self.entries.get(device_id).map(|e| e.clone())
    }

    /// Copy of every liveness entry keyed by device id
    pub fn statuses(&self) -> HashMap<String, LivenessEntry> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict stale entries as of now
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Utc::now())
    }

    /// Evict entries that are stale as of `now`.
    ///
    /// Candidates are collected first, then each one is re-checked while
    /// holding its shard lock, so a device that reported after `now` is
    /// kept. Each eviction publishes one post-eviction snapshot.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let threshold = self.offline_threshold;

        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_stale(now, threshold))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for device_id in candidates {
            let removed = self
                .entries
                .remove_if(&device_id, |_, entry| entry.is_stale(now, threshold));

            if let Some((_, entry)) = removed {
                info!(
                    device_id = %device_id,
                    last_update = %entry.last_update_at,
                    power = ?entry.power,
                    "Device removed"
                );
                self.broadcaster.publish_devices(self.snapshot_all());
                evicted.push(device_id);
            }
        }

        evicted
    }

    pub fn subscribe_devices(&self) -> broadcast::Receiver<DeviceListUpdate> {
        self.broadcaster.subscribe_devices()
    }

    pub fn subscribe_positions(&self) -> broadcast::Receiver<PositionRecord> {
        self.broadcaster.subscribe_positions()
    }

    fn derive_status(&self, entry: &LivenessEntry, now: DateTime<Utc>) -> PositionStatus {
        if entry.is_stale(now, self.offline_threshold) {
            PositionStatus::Inactive
        } else {
            PositionStatus::Active
        }
    }

    fn derive_position(&self, entry: &LivenessEntry, now: DateTime<Utc>) -> PositionRecord {
        entry
            .last_position
            .clone()
            .with_status(self.derive_status(entry, now))
    }
}

impl Default for DeviceStateTable {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_THRESHOLD, Broadcaster::default())
    }
}
