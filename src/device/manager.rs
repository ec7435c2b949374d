use crate::config::{SimulationConfig, TrackerConfig};
use crate::device::listener::{run_listener, ListenerSettings};
use crate::device::simulator::run_simulated;
use crate::device::{ListenHint, TaskMode};
use crate::state::DeviceStateTable;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `stop_monitoring` waits for a cancelled task before aborting it
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every device task
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Simulated position period
    pub update_interval: Duration,
    pub simulation: SimulationConfig,
    pub listener: ListenerSettings,
}

impl MonitorSettings {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            update_interval: config.tracking.update_interval(),
            simulation: config.simulation.clone(),
            listener: ListenerSettings::from_config(&config.real),
        }
    }
}

/// Running background task for one device
struct DeviceTask {
    mode: TaskMode,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry view of a running task
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredDevice {
    pub device_id: String,
    pub mode: TaskMode,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A task for the device was already running; nothing changed
    AlreadyRunning,
}

/// Device task manager - owns the per-device producers.
///
/// # Responsibilities
/// - At most one task per device id
/// - Spawn simulated or listening tasks on demand
/// - Cancel and join tasks on stop, releasing sockets
/// - Graceful shutdown
pub struct DeviceTaskManager {
    /// State table every task feeds
    table: Arc<DeviceStateTable>,
    settings: MonitorSettings,
    /// Per-device task handles keyed by device id
    tasks: DashMap<String, DeviceTask>,
}

impl DeviceTaskManager {
    pub fn new(table: Arc<DeviceStateTable>, settings: MonitorSettings) -> Self {
        Self {
            table,
            settings,
            tasks: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Start a task for `device_id` unless one is already running.
    ///
    /// Must be called from within a tokio runtime. A task that already ended
    /// on its own (listener gave up binding) is replaced.
    pub fn start_monitoring(
        &self,
        device_id: &str,
        mode: TaskMode,
        hint: Option<ListenHint>,
    ) -> StartOutcome {
        match self.tasks.entry(device_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().handle.is_finished() {
                    info!(
                        device_id = %device_id,
                        mode = ?occupied.get().mode,
                        "Device already monitored, ignoring start"
                    );
                    return StartOutcome::AlreadyRunning;
                }

                info!(device_id = %device_id, "Previous task ended, restarting");
                occupied.insert(self.spawn_task(device_id, mode, hint.as_ref()));
                StartOutcome::Started
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.spawn_task(device_id, mode, hint.as_ref()));
                StartOutcome::Started
            }
        }
    }

    /// Cancel and join the task for `device_id`.
    ///
    /// Returns false when no task was registered.
    pub async fn stop_monitoring(&self, device_id: &str) -> bool {
        let Some((_, task)) = self.tasks.remove(device_id) else {
            debug!(device_id = %device_id, "Stop requested for unmonitored device");
            return false;
        };

        task.cancel.cancel();
        join_task(device_id, task.handle).await;
        info!(device_id = %device_id, mode = ?task.mode, "Monitoring stopped");
        true
    }

    pub fn is_monitoring(&self, device_id: &str) -> bool {
        self.tasks
            .get(device_id)
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Running tasks sorted by device id
    pub fn monitored(&self) -> Vec<MonitoredDevice> {
        let mut devices: Vec<MonitoredDevice> = self
            .tasks
            .iter()
            .filter(|task| !task.handle.is_finished())
            .map(|task| MonitoredDevice {
                device_id: task.key().clone(),
                mode: task.mode,
                started_at: task.started_at,
            })
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Stop every task
    pub async fn shutdown(&self) {
        let device_ids: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        if !device_ids.is_empty() {
            info!(task_count = device_ids.len(), "Stopping device tasks");
        }
        for device_id in device_ids {
            self.stop_monitoring(&device_id).await;
        }
    }

    fn spawn_task(&self, device_id: &str, mode: TaskMode, hint: Option<&ListenHint>) -> DeviceTask {
        let cancel = CancellationToken::new();
        let table = Arc::clone(&self.table);

        let handle = match mode {
            TaskMode::Simulated => tokio::spawn(run_simulated(
                device_id.to_string(),
                table,
                self.settings.simulation.clone(),
                self.settings.update_interval,
                cancel.clone(),
            )),
            TaskMode::Listening => {
                let settings = match hint {
                    Some(hint) => self.settings.listener.with_hint(hint),
                    None => self.settings.listener.clone(),
                };
                tokio::spawn(run_listener(device_id.to_string(), table, settings, cancel.clone()))
            }
        };

        info!(device_id = %device_id, mode = ?mode, "Monitoring started");

        DeviceTask {
            mode,
            started_at: Utc::now(),
            cancel,
            handle,
        }
    }
}

async fn join_task(device_id: &str, mut handle: JoinHandle<()>) {
    match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(device_id = %device_id, error = %e, "Device task failed"),
        Err(_) => {
            warn!(device_id = %device_id, "Device task ignored cancellation, aborting");
            handle.abort();
        }
    }
}

impl Drop for DeviceTaskManager {
    fn drop(&mut self) {
        // Best-effort: signal every task, then abort in case it is mid-I/O
        for task in self.tasks.iter() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}
