//! portfolio-dash -- crypto portfolio analytics dashboard.
//!
//! This crate serves the dashboard, runs the external data-generation script
//! under supervision when a refresh is requested, and turns the CSV files the
//! script writes into chart descriptions and SVG charts.

pub mod api;
pub mod charts;
pub mod config;
pub mod logging;
pub mod refresh;

use anyhow::{Context, Result};

use crate::config::DashboardConfig;
use crate::refresh::{RefreshService, RefreshSettings};

/// Start the dashboard HTTP service and run until Ctrl-C.
pub async fn serve(config: DashboardConfig) -> Result<()> {
    let settings = RefreshSettings::from(&config.refresh);
    tracing::info!(
        interpreter = %settings.interpreter,
        script = %settings.script.display(),
        timeout_sec = settings.timeout.as_secs(),
        concurrency = ?settings.concurrency,
        "refresh service configured"
    );
    let refresh = RefreshService::new(settings);
    let state = api::state::AppState::new(refresh, config.charts.clone());
    let app = api::router(state);

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, reports = %config.charts.output_dir.display(), "portfolio dashboard listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("portfolio dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
