use anyhow::{Context, Result};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{app_state::AppState, config};

pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

pub fn init_env() {
    if let Err(err) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {err}");
    }
}

/// Builds the shared state, wires request tracing and serves the app until shutdown.
pub async fn bootstrap(service_name: &str, app: Router<AppState>) -> Result<()> {
    let config = config::load()?;
    let state = AppState::init(&config).await?;

    let app = app
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.service.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.service.bind_addr))?;

    tracing::info!("{service_name} listening on {}", config.service.bind_addr);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
