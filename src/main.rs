use anyhow::{Context, Result};
use geotrack::api::{create_router, AppState};
use geotrack::broadcast::Broadcaster;
use geotrack::config::load_or_default;
use geotrack::device::{DeviceTaskManager, MonitorSettings};
use geotrack::state::{run_reaper, DeviceStateTable};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geotrack=info".into()),
        )
        .init();

    info!("Geotrack starting...");

    let config_path =
        std::env::var("GEOTRACK_CONFIG").unwrap_or_else(|_| "geotrack.toml".to_string());
    let config = load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    info!(
        config_path = %config_path,
        mode = ?config.tracking.mode,
        port = config.server.port,
        update_interval_ms = config.tracking.update_interval_ms,
        offline_threshold_s = config.state.offline_threshold_seconds,
        "Configuration loaded"
    );

    // State table and the broadcaster it publishes through
    let broadcaster = Broadcaster::new(config.state.broadcast_capacity);
    let table = Arc::new(DeviceStateTable::new(
        config.state.offline_threshold(),
        broadcaster,
    ));

    let shutdown = CancellationToken::new();
    let reaper_handle = tokio::spawn(run_reaper(
        Arc::clone(&table),
        config.state.reaper_interval(),
        shutdown.clone(),
    ));
    info!(
        interval_s = config.state.reaper_interval_seconds,
        "Staleness reaper started"
    );

    let tasks = Arc::new(DeviceTaskManager::new(
        Arc::clone(&table),
        MonitorSettings::from_config(&config),
    ));

    let router = create_router(AppState {
        table: Arc::clone(&table),
        tasks: Arc::clone(&tasks),
        default_mode: config.tracking.mode,
    });

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", address))?;
    info!(address = %address, "HTTP API listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("Shutdown signal received");

    // Graceful shutdown
    shutdown.cancel();
    tasks.shutdown().await;
    let _ = reaper_handle.await;
    info!("Geotrack stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
    }
}
