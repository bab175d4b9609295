//! Roastify Server - Main entry point

use std::net::SocketAddr;

use anyhow::Context;
use roastify_core::{
    api::{self, AppState},
    config::Config,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("ROASTIFY_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    }
    .context("Failed to load configuration")?;

    // Initialize telemetry
    let metrics = telemetry::init_telemetry(&config.logging, "roastify-server")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Roastify Server"
    );

    let state = AppState::from_config(&config, metrics)?;
    let sweeper = state.start_sweepers(&config);

    tracing::info!(
        api_limit = config.limits.api.max_requests,
        ai_limit = config.limits.ai.max_requests,
        provider_limit = config.limits.provider.max_requests,
        upstream_quota = config.limits.upstream_quota_per_minute,
        cache_max_entries = config.cache.max_entries,
        "Request shaping configured"
    );

    let app = api::build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
