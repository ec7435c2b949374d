use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Complete geotrack configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub real: RealConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// HTTP server bind address
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
        }
    }
}

/// Where device positions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Synthetic positions around a configured center
    #[default]
    Simulation,
    /// Raw-socket feed from real hardware
    Real,
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulation" => Ok(TrackingMode::Simulation),
            "real" => Ok(TrackingMode::Real),
            other => Err(format!("unknown tracking mode '{}'", other)),
        }
    }
}

/// Tracking mode and per-device task cadence
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub mode: TrackingMode,
    /// Simulated position period (milliseconds)
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

fn default_update_interval_ms() -> u64 {
    5000
}

impl TrackingConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            mode: TrackingMode::default(),
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

/// Area simulated devices wander in
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_center_latitude")]
    pub center_latitude: f64,
    #[serde(default = "default_center_longitude")]
    pub center_longitude: f64,
    #[serde(default = "default_radius_meters")]
    pub radius_meters: f64,
}

fn default_center_latitude() -> f64 {
    48.8566
}

fn default_center_longitude() -> f64 {
    2.3522
}

fn default_radius_meters() -> f64 {
    1000.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            center_latitude: default_center_latitude(),
            center_longitude: default_center_longitude(),
            radius_meters: default_radius_meters(),
        }
    }
}

/// Raw-socket listener for real devices
#[derive(Debug, Clone, Deserialize)]
pub struct RealConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_real_port")]
    pub port: u16,
    /// Pause before retrying a failed bind or accept (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Bind attempts before the listening task gives up
    #[serde(default = "default_bind_attempts")]
    pub bind_attempts: u32,
}

fn default_real_port() -> u16 {
    5055
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_bind_attempts() -> u32 {
    5
}

impl RealConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RealConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_real_port(),
            retry_delay_ms: default_retry_delay_ms(),
            bind_attempts: default_bind_attempts(),
        }
    }
}

/// Device state table and reaper
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_offline_threshold_seconds")]
    pub offline_threshold_seconds: u64,
    #[serde(default = "default_reaper_interval_seconds")]
    pub reaper_interval_seconds: u64,
    /// Buffered messages per broadcast channel before slow receivers lag
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_offline_threshold_seconds() -> u64 {
    300
}

fn default_reaper_interval_seconds() -> u64 {
    60
}

fn default_broadcast_capacity() -> usize {
    256
}

impl StateConfig {
    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_seconds)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds.max(1))
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            offline_threshold_seconds: default_offline_threshold_seconds(),
            reaper_interval_seconds: default_reaper_interval_seconds(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl TrackerConfig {
    /// Apply `GEOTRACK_*` environment overrides; unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GEOTRACK_MODE") {
            if let Ok(mode) = v.parse::<TrackingMode>() {
                self.tracking.mode = mode;
            }
        }
        if let Ok(v) = std::env::var("GEOTRACK_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("GEOTRACK_REAL_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.real.port = port;
            }
        }
        if let Ok(v) = std::env::var("GEOTRACK_UPDATE_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.tracking.update_interval_ms = ms;
            }
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<TrackerConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: TrackerConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(config)
}

/// Load `path` if it exists (defaults otherwise), then apply env overrides
pub fn load_or_default(path: impl AsRef<Path>) -> Result<TrackerConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        info!(path = %path.display(), "Loading configuration");
        load_config(path)?
    } else {
        info!(path = %path.display(), "No config file, using defaults");
        TrackerConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tracking.mode, TrackingMode::Simulation);
        assert_eq!(config.tracking.update_interval(), Duration::from_secs(5));
        assert_eq!(config.real.port, 5055);
        assert_eq!(config.real.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.state.offline_threshold(), Duration::from_secs(300));
        assert_eq!(config.state.reaper_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [tracking]
            mode = "real"
            update_interval_ms = 250

            [simulation]
            center_latitude = 40.0
            center_longitude = -3.7
            radius_meters = 500.0

            [real]
            port = 6000
            bind_attempts = 2

            [state]
            offline_threshold_seconds = 120
            reaper_interval_seconds = 10
        "#;

        let config: TrackerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.tracking.mode, TrackingMode::Real);
        assert_eq!(config.tracking.update_interval(), Duration::from_millis(250));
        assert_eq!(config.simulation.center_longitude, -3.7);
        assert_eq!(config.real.port, 6000);
        assert_eq!(config.real.bind_attempts, 2);
        assert_eq!(config.real.retry_delay_ms, 1000); // Default
        assert_eq!(config.state.offline_threshold_seconds, 120);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [simulation]
            radius_meters = 50.0
        "#;

        let config: TrackerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.simulation.radius_meters, 50.0);
        assert_eq!(config.simulation.center_latitude, 48.8566); // Default
        assert_eq!(config.tracking.mode, TrackingMode::Simulation); // Default
    }

    #[test]
    fn test_tracking_mode_from_str() {
        assert_eq!("REAL".parse::<TrackingMode>(), Ok(TrackingMode::Real));
        assert_eq!(" simulation ".parse::<TrackingMode>(), Ok(TrackingMode::Simulation));
        assert!("gps".parse::<TrackingMode>().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tracking]\nupdate_interval_ms = 1000").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tracking.update_interval_ms, 1000);
    }

    #[test]
    fn test_load_config_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tracking\nmode = ").unwrap();

        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.simulation.radius_meters, 1000.0);
    }
}
