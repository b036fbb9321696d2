//! # Journey Gateway Server
//!
//! Binary entry point for the gateway service.

use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use journey_gateway::{build_router, Config, GatewayContextBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        version = journey_gateway::VERSION,
        "Starting Journey Gateway"
    );

    if config.store.url.is_none() {
        tracing::warn!("STORE_URL not set; cache and rate limiting run fail-open");
    }

    // Connection is lazy; the first request (or this probe) dials the store
    let ctx = GatewayContextBuilder::new()
        .with_store_config(config.store.clone())
        .with_rate_limit(config.rate_limit.clone())
        .build();

    if ctx.connection.is_configured() {
        let available = ctx.connection.is_available().await;
        tracing::info!(available, "Store probe complete");
    }

    tracing::info!(
        limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window_secs,
        prefix = %config.rate_limit.key_prefix,
        "Rate limiting configured"
    );

    // Build router
    let app = build_router(
        ctx.clone(),
        Router::new().route("/", axum::routing::get(|| async { "Journey Gateway" })),
        &config.cors_origins,
    );

    // Start server
    let addr = config.server_addr;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.connection.close().await;
    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Graceful shutdown signal handler
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
