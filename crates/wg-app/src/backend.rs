mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;
use wg_core::StageWeights;
use wg_core::gallery::Gallery;

use crate::backend::routes::api_routes;
use crate::backend::state::AppState;
use crate::config::AppConfig;
use crate::generator::{build_orchestrator, generation_defaults};
use crate::worker::PipelineWorker;

/// Opens the gallery, starts the pipeline worker and builds the shared state.
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let gallery = Gallery::open(&config.output_dir)
        .with_context(|| format!("Failed to open output directory {}", config.output_dir.display()))?;

    let worker_config = config.clone();
    let worker = PipelineWorker::spawn(
        move || build_orchestrator(&worker_config),
        StageWeights::default(),
    )?;

    Ok(AppState::new(gallery, generation_defaults(config), worker))
}

pub async fn serve(config: &AppConfig, state: AppState) -> anyhow::Result<()> {
    let app = Router::new()
        .merge(api_routes())
        .with_state(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Starting backend server on port {}", config.port);
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
