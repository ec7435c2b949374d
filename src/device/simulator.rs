use crate::config::SimulationConfig;
use crate::position::{now_ms, PositionRecord, PowerSignal};
use crate::state::DeviceStateTable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Meters per degree of latitude (equirectangular approximation)
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Maximum simulated speed (km/h)
const MAX_SPEED: f64 = 60.0;

/// Generates positions uniformly distributed within a disc around a center.
pub struct PositionSimulator {
    center_latitude: f64,
    center_longitude: f64,
    radius_meters: f64,
    rng: StdRng,
}

impl PositionSimulator {
    pub fn new(config: &SimulationConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic simulator for reproducible runs
    pub fn with_seed(config: &SimulationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SimulationConfig, rng: StdRng) -> Self {
        Self {
            center_latitude: config.center_latitude,
            center_longitude: config.center_longitude,
            radius_meters: config.radius_meters.max(0.0),
            rng,
        }
    }

    /// Next synthetic fix for `device_id`
    pub fn next_position(&mut self, device_id: &str, timestamp_ms: i64) -> PositionRecord {
        // sqrt keeps the density uniform over the disc area
        let distance = self.radius_meters * self.rng.gen::<f64>().sqrt();
        let angle = self.rng.gen_range(0.0..2.0 * PI);

        let north_m = distance * angle.cos();
        let east_m = distance * angle.sin();

        let lon_scale = self.center_latitude.to_radians().cos().abs().max(1e-6);
        let latitude = (self.center_latitude + north_m / METERS_PER_DEGREE).clamp(-90.0, 90.0);
        let longitude = wrap_longitude(
            self.center_longitude + east_m / (METERS_PER_DEGREE * lon_scale),
        );

        PositionRecord::new(device_id, latitude, longitude, timestamp_ms)
            .with_speed(self.rng.gen_range(0.0..=MAX_SPEED))
            .with_bearing(self.rng.gen_range(0.0..360.0))
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Simulated device task: one synthetic position per tick until cancelled.
pub(crate) async fn run_simulated(
    device_id: String,
    table: Arc<DeviceStateTable>,
    config: SimulationConfig,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut simulator = PositionSimulator::new(&config);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        device_id = %device_id,
        period_ms = period.as_millis() as u64,
        radius_m = config.radius_meters,
        "Simulation started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let position = simulator.next_position(&device_id, now_ms());
                debug!(
                    device_id = %device_id,
                    latitude = position.latitude,
                    longitude = position.longitude,
                    "Simulated position"
                );
                table.update(&device_id, position, PowerSignal::On);
            }
        }
    }

    info!(device_id = %device_id, "Simulation stopped");
}
