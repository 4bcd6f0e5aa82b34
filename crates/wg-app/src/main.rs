mod backend;
mod config;
mod error;
mod events;
mod gate;
mod generator;
mod worker;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    info!(
        backend = ?config.backend,
        output_dir = %config.output_dir.display(),
        "Loaded configuration"
    );

    let state = backend::build_state(&config)?;
    backend::serve(&config, state).await
}
