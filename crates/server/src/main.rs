mod bootstrap;
mod health;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parley_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use parley_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = routes::router(app.state.clone()).merge(health::router(health::HealthState {
        db_pool: app.db_pool.clone(),
        model: app.model.clone(),
    }));
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "parley-server listening"
    );

    let stop = Arc::new(Notify::new());
    let stop_signal = stop.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop_signal.notified().await })
            .await
    });

    wait_for_shutdown().await;
    stop.notify_one();
    tracing::info!(event_name = "system.server.stopping", "closing http connections");

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(result)) => result?,
        Ok(Err(error)) => tracing::warn!(
            event_name = "system.server.task_failed",
            error = %error,
            "http server task failed"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            grace_secs = grace.as_secs(),
            "open http connections outlived the grace period"
        ),
    }

    tracing::info!(event_name = "system.server.draining", "draining background jobs");
    let outcome = app.shutdown().await;
    tracing::info!(
        event_name = "system.server.stopped",
        outcome = ?outcome,
        "parley-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_error",
            error = %error,
            "could not listen for ctrl-c; shutting down"
        );
    }
}
