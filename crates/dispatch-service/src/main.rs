//! Dispatch Service
//!
//! Main entry point: HTTP API plus the background sweeps.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_service::{create_router, AppState, Config, Dispatcher, Stores, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dispatch_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dispatch Service");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Store backend: {:?}", config.store_backend);
    info!("  API address: {}", config.api_address());
    info!("  Selection policy: {:?}", config.selection_policy);
    info!(
        "  Sweep intervals: completion {}s, assignment {}s",
        config.completion_sweep_interval_secs, config.assignment_sweep_interval_secs
    );

    let stores = Stores::connect(&config).await?;
    let dispatcher = Dispatcher::new(stores, Arc::new(SystemClock), config.selection_policy);

    // Start sweeps in background
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = dispatcher.sweeper(config.sweep_schedule());
    let sweep_tasks = sweeper.spawn(shutdown_rx);

    let app = create_router(AppState { dispatcher });

    let api_addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on {}", api_addr);

    let api_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {:#}", e);
        }
    });

    info!("Dispatch Service is running");

    tokio::select! {
        _ = api_task => {
            error!("API task terminated unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    // Let in-flight sweep passes finish
    let _ = shutdown_tx.send(true);
    for task in sweep_tasks {
        if let Err(e) = task.await {
            error!("Sweep task panicked: {}", e);
        }
    }

    info!("Shutting down Dispatch Service");

    Ok(())
}
