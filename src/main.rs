//! Face Attendance Service
//!
//! Matches probe faces against the enrolled gallery and logs attendance
//! events, at most once per employee per cooldown window.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use facegate::api::rest::{create_rest_router, AppState};
use facegate::config::Config;
use facegate::engine::OpenVinoEngine;
use facegate::service::AttendanceService;
use facegate::storage::SqliteStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Face Attendance Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Similarity threshold: {}", config.recognition.similarity_threshold);
    info!("  Cooldown window: {}s", config.attendance.cooldown_seconds);

    // Initialize storage
    let storage = Arc::new(SqliteStorage::new(&config.storage.sqlite_path.to_string_lossy()).await?);
    info!("SQLite storage initialized at: {}", config.storage.sqlite_path.display());

    // Initialize the inference engine
    let engine = Arc::new(OpenVinoEngine::new(&config)?);

    // Create the service and preload the gallery from the store
    let service = Arc::new(AttendanceService::new(engine, storage, config.clone()));
    let loaded = service.load_gallery().await?;
    info!("Preloaded {} enrolled identities", loaded);

    // Create REST app state and router
    let app_state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });
    let router = create_rest_router(app_state);

    // Start REST server
    let port = config.server.port;
    let _rest_handle = tokio::spawn(async move {
        let addr = format!("0.0.0.0:{}", port);
        info!("REST API listening on http://{}", addr);

        let listener = TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, router).await.unwrap();
    });

    info!("Face Attendance Service is ready!");
    info!("REST: http://localhost:{}/health", port);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, goodbye!");

    Ok(())
}
