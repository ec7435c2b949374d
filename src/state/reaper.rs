use crate::state::DeviceStateTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically evict stale devices.
///
/// Runs until `shutdown` is cancelled. Each sweep is synchronous and short;
/// eviction broadcasts never block.
pub async fn run_reaper(
    table: Arc<DeviceStateTable>,
    sweep_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(sweep_interval);

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately; nothing can be stale yet
    ticker.tick().await;

    info!(
        interval_secs = sweep_interval.as_secs(),
        threshold_secs = table.offline_threshold().as_secs(),
        "Reaper started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = table.sweep();
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "Reaper evicted devices");
                } else {
                    debug!(devices = table.len(), "Reaper sweep, nothing to evict");
                }
            }
        }
    }

    info!("Reaper stopped");
}
