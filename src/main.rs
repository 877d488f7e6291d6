// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::chart_service::ChartService;
use crate::domain::time::LocalZone;
use crate::infrastructure::backend_repository::BackendRepository;
use crate::infrastructure::config::{load_backend_config, load_dashboard_config};
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{boxplots, health_check, metric_chart, thresholds};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let backend_config = load_backend_config().context("Failed to load config/backend")?;
    let dashboard_config = load_dashboard_config().context("Failed to load config/dashboard")?;
    let zone = LocalZone::from_offset_minutes(dashboard_config.dashboard.utc_offset_minutes);

    // Create repository (infrastructure layer)
    let repository = Arc::new(BackendRepository::new(&backend_config.backend, zone)?);

    // Create services (application layer)
    let chart_service = ChartService::new(repository, dashboard_config.dashboard);

    // Create application state
    let state = Arc::new(AppState { chart_service });

    // Build router (presentation layer)
    // Responses are Brotli-encoded by the handlers, so no CompressionLayer here
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/nodes/:node_id/charts/:metric", get(metric_chart))
        .route("/nodes/:node_id/thresholds/:metric", get(thresholds))
        .route("/nodes/:node_id/boxplots", get(boxplots))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = backend_config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", backend_config.server.bind))?;
    tracing::info!("Starting agro-telemetry service on {} (backend {})", addr, backend_config.backend.base_url);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
