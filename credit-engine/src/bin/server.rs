//! Credit engine server binary

use anyhow::Context;
use credit_engine::{http, store::Store, Config, CreditEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting Kredit Plus credit engine");

    // Load configuration
    let config = match std::env::var("CREDIT_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    let engine = CreditEngine::connect(&config)
        .await
        .context("Failed to connect to database")?;
    engine
        .store()
        .health_check()
        .await
        .context("Database health check failed")?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Credit engine ready"
    );

    let listener = TcpListener::bind(&config.metrics_listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.metrics_listen_addr))?;
    tracing::info!(addr = %config.metrics_listen_addr, "Serving /metrics and /health");

    axum::serve(listener, http::router(Arc::new(engine)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shutting down credit engine");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if std::env::var("CREDIT_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
