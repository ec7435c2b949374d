use super::listener::{serve_connection, MAX_LINE_BYTES};
use super::simulator::METERS_PER_DEGREE;
use super::*;
use crate::broadcast::Broadcaster;
use crate::config::{SimulationConfig, TrackerConfig};
use crate::state::{DeviceStateTable, DEFAULT_OFFLINE_THRESHOLD};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

fn simulation() -> SimulationConfig {
    SimulationConfig {
        center_latitude: 45.0,
        center_longitude: 7.0,
        radius_meters: 250.0,
    }
}

fn distance_from_center(config: &SimulationConfig, lat: f64, lon: f64) -> f64 {
    let north = (lat - config.center_latitude) * METERS_PER_DEGREE;
    let east = (lon - config.center_longitude)
        * METERS_PER_DEGREE
        * config.center_latitude.to_radians().cos();
    (north * north + east * east).sqrt()
}

fn table() -> Arc<DeviceStateTable> {
    Arc::new(DeviceStateTable::new(
        DEFAULT_OFFLINE_THRESHOLD,
        Broadcaster::new(64),
    ))
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn settings(port: u16) -> MonitorSettings {
    let mut config = TrackerConfig::default();
    config.tracking.update_interval_ms = 20;
    config.simulation = simulation();
    config.real.host = "127.0.0.1".to_string();
    config.real.port = port;
    config.real.retry_delay_ms = 20;
    config.real.bind_attempts = 2;
    MonitorSettings::from_config(&config)
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ── Simulator ─────────────────────────────────────────────────────────────────

#[test]
fn test_simulated_positions_stay_within_radius() {
    let config = simulation();
    let mut simulator = PositionSimulator::with_seed(&config, 7);

    for i in 0..1000 {
        let p = simulator.next_position("sim", 1_000 + i);
        assert!(distance_from_center(&config, p.latitude, p.longitude) <= config.radius_meters + 1e-6);
        assert!((0.0..=60.0).contains(&p.speed));
        assert!((0.0..360.0).contains(&p.bearing));
        assert_eq!(p.device_id, "sim");
        assert!(crate::position::validate(&p).is_ok());
    }
}

#[test]
fn test_simulated_positions_actually_move() {
    let config = simulation();
    let mut simulator = PositionSimulator::with_seed(&config, 11);

    let a = simulator.next_position("sim", 1);
    let b = simulator.next_position("sim", 2);
    assert!(a.latitude != b.latitude || a.longitude != b.longitude);
}

#[test]
fn test_zero_radius_stays_on_center() {
    let config = SimulationConfig {
        radius_meters: 0.0,
        ..simulation()
    };
    let p = PositionSimulator::with_seed(&config, 1).next_position("sim", 1);
    assert_eq!(p.latitude, config.center_latitude);
    assert_eq!(p.longitude, config.center_longitude);
}

// ── Listen hints ──────────────────────────────────────────────────────────────

#[test]
fn test_listen_hint_from_server_url() {
    assert_eq!(
        ListenHint::from_server_url(Some("tcp://10.0.0.5:6000/path"), None),
        ListenHint {
            host: Some("10.0.0.5".to_string()),
            port: Some(6000)
        }
    );
    assert_eq!(
        ListenHint::from_server_url(Some("10.0.0.5:6000"), Some(7000)),
        ListenHint {
            host: Some("10.0.0.5".to_string()),
            port: Some(7000)
        }
    );
    assert_eq!(
        ListenHint::from_server_url(Some("localhost"), None),
        ListenHint {
            host: Some("localhost".to_string()),
            port: None
        }
    );
    assert_eq!(ListenHint::from_server_url(None, Some(1)).port, Some(1));
    assert_eq!(ListenHint::from_server_url(Some("  "), None), ListenHint::default());
}

#[test]
fn test_listener_settings_with_hint() {
    let base = settings(5055).listener;
    let hinted = base.with_hint(&ListenHint {
        host: None,
        port: Some(6001),
    });
    assert_eq!(hinted.address(), "127.0.0.1:6001");
    assert_eq!(hinted.retry_delay, base.retry_delay);
}

// ── Task manager ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_simulated_then_stop() {
    let table = table();
    let manager = DeviceTaskManager::new(Arc::clone(&table), settings(free_port()));

    assert_eq!(
        manager.start_monitoring("dev1", TaskMode::Simulated, None),
        StartOutcome::Started
    );
    assert!(manager.is_monitoring("dev1"));

    assert!(wait_for(|| table.get("dev1").is_some()).await);
    let position = table
        .snapshot_all()
        .into_iter()
        .find(|p| p.device_id == "dev1")
        .unwrap();
    let config = simulation();
    assert!(distance_from_center(&config, position.latitude, position.longitude) <= config.radius_meters + 1e-6);

    assert!(manager.stop_monitoring("dev1").await);
    assert!(!manager.is_monitoring("dev1"));

    // No further updates once stopped
    let last_update = table.get("dev1").unwrap().last_update_at;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(table.get("dev1").unwrap().last_update_at, last_update);
}

#[tokio::test]
async fn test_start_twice_is_noop() {
    let manager = DeviceTaskManager::new(table(), settings(free_port()));

    assert_eq!(
        manager.start_monitoring("dev1", TaskMode::Simulated, None),
        StartOutcome::Started
    );
    assert_eq!(
        manager.start_monitoring("dev1", TaskMode::Listening, None),
        StartOutcome::AlreadyRunning
    );

    let monitored = manager.monitored();
    assert_eq!(monitored.len(), 1);
    assert_eq!(monitored[0].mode, TaskMode::Simulated);

    manager.shutdown().await;
    assert!(manager.monitored().is_empty());
}

#[tokio::test]
async fn test_stop_unknown_device_is_noop() {
    let manager = DeviceTaskManager::new(table(), settings(free_port()));
    assert!(!manager.stop_monitoring("ghost").await);
}

#[tokio::test]
async fn test_listening_task_relays_lines_and_survives_malformed_input() {
    let port = free_port();
    let table = table();
    let manager = DeviceTaskManager::new(Arc::clone(&table), settings(port));

    manager.start_monitoring("dev9", TaskMode::Listening, None);

    let mut stream = None;
    for _ in 0..50 {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut stream = stream.expect("listener never came up");

    stream.write_all(b"abc,1.0\n").await.unwrap();
    stream
        .write_all(b"dev9,10.5,20.5,12.0,1700000000000\n")
        .await
        .unwrap();
    stream.flush().await.unwrap();

    assert!(wait_for(|| table.get("dev9").is_some()).await);
    let entry = table.get("dev9").unwrap();
    assert_eq!(entry.last_position.latitude, 10.5);
    assert_eq!(entry.last_position.speed, 12.0);
    assert!(manager.is_monitoring("dev9"));

    drop(stream);
    assert!(manager.stop_monitoring("dev9").await);

    // Port released once the task is stopped
    assert!(tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok());
}

#[tokio::test]
async fn test_listener_accepts_next_connection_after_disconnect() {
    let port = free_port();
    let table = table();
    let manager = DeviceTaskManager::new(Arc::clone(&table), settings(port));
    manager.start_monitoring("dev9", TaskMode::Listening, None);

    assert!(wait_for(|| std::net::TcpStream::connect(("127.0.0.1", port)).is_ok()).await);

    let mut first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    first.write_all(b"dev9,1.0,1.0,0.0,1000\n").await.unwrap();
    drop(first);
    assert!(wait_for(|| table.get("dev9").map(|e| e.last_position.latitude) == Some(1.0)).await);

    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    second.write_all(b"dev9,2.0,2.0,0.0,2000\n").await.unwrap();
    assert!(wait_for(|| table.get("dev9").map(|e| e.last_position.latitude) == Some(2.0)).await);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_listener_gives_up_when_port_is_taken() {
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let manager = DeviceTaskManager::new(table(), settings(port));
    manager.start_monitoring("dev9", TaskMode::Listening, None);

    assert!(wait_for(|| !manager.is_monitoring("dev9")).await);

    // A finished task does not block a fresh start
    drop(blocker);
    assert_eq!(
        manager.start_monitoring("dev9", TaskMode::Listening, None),
        StartOutcome::Started
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn test_serve_connection_drops_bad_lines() {
    let table = table();
    let cancel = CancellationToken::new();
    let input: &[u8] = b"abc,1.0\n\nother,1.0,2.0,3.0,4\ndev9,3.0,4.0,5.0,6000\n";

    serve_connection("dev9", input, &table, &cancel).await.unwrap();

    assert_eq!(table.len(), 1);
    let entry = table.get("dev9").unwrap();
    assert_eq!(entry.last_position.longitude, 4.0);
    assert_eq!(entry.last_position.timestamp_ms, 6000);
}

#[tokio::test]
async fn test_serve_connection_survives_invalid_utf8() {
    let table = table();
    let cancel = CancellationToken::new();
    let input: &[u8] = b"dev9,\xff\xfe,1.0,0.0,1000\ndev9,3.0,4.0,5.0,6000\n";

    serve_connection("dev9", input, &table, &cancel).await.unwrap();

    let entry = table.get("dev9").unwrap();
    assert_eq!(entry.last_position.latitude, 3.0);
    assert_eq!(entry.last_position.timestamp_ms, 6000);
}

#[tokio::test]
async fn test_serve_connection_drops_oversized_line() {
    let table = table();
    let cancel = CancellationToken::new();

    let mut input = vec![b'9'; MAX_LINE_BYTES * 8];
    input.extend_from_slice(b"\ndev9,3.0,4.0,5.0,6000\r\n");

    serve_connection("dev9", input.as_slice(), &table, &cancel)
        .await
        .unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.get("dev9").unwrap().last_position.longitude, 4.0);
}

#[tokio::test]
async fn test_serve_connection_accepts_unterminated_last_line() {
    let table = table();
    let cancel = CancellationToken::new();
    let input: &[u8] = b"dev9,3.0,4.0,5.0,6000";

    serve_connection("dev9", input, &table, &cancel).await.unwrap();

    assert_eq!(table.get("dev9").unwrap().last_position.speed, 5.0);
}

#[tokio::test]
async fn test_serve_connection_stops_on_cancel() {
    let table = table();
    let cancel = CancellationToken::new();
    // Duplex stream that never receives data
    let (_writer, reader) = tokio::io::duplex(64);

    cancel.cancel();
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        serve_connection("dev9", reader, &table, &cancel),
    )
    .await;

    assert!(matches!(result, Ok(Ok(()))));
}
