use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use api::{config::Config, state::AppState, telemetry};
use store::InMemStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    telemetry::init(config.log_format);

    let store = match &config.seed_file {
        Some(path) => InMemStore::from_json_file(path)?,
        None => InMemStore::new(),
    };
    tracing::info!(
        seed = ?config.seed_file,
        weighting = ?config.weighting,
        "store ready"
    );

    let app = api::app(AppState::new(Arc::new(store), &config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;
    Ok(())
}

async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl-c handler failed");
    }
    tracing::info!("shutting down");
}
