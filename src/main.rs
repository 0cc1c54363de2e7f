//! ProxyLens Server - Entry Point
//!
//! Starts the API server with graceful shutdown support.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxylens::api::server::AppState;
use proxylens::api::ApiServer;
use proxylens::config::{Config, LogConfig};
use proxylens::filter::LazyEngine;
use proxylens::services::{ProxyListProvider, ProxySource};
use proxylens::FetchOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config.log);
    info!("Starting ProxyLens");

    // Filter rules are compiled on the first filtered request.
    let engine = Arc::new(LazyEngine::new(config.rule_source()));
    let orchestrator = Arc::new(
        FetchOrchestrator::from_config(&config, engine).context("Failed to create fetch pipeline")?,
    );
    let proxy_source: Arc<dyn ProxySource> = Arc::new(
        ProxyListProvider::new(&config.proxy_list).context("Failed to create proxy list provider")?,
    );

    let api_server = ApiServer::new(
        config.server.clone(),
        AppState::new(orchestrator, proxy_source),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(shutdown_rx).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started on {}", config.server_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = api_task.await;

    info!("ProxyLens stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "proxylens=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
}
