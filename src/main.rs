use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use lineup_cohesion::api::{AppState, create_router};
use lineup_cohesion::config::{EngineConfig, ServerConfig};
use lineup_cohesion::service::CohesionService;
use lineup_cohesion::sqlite_store::SqliteSnapStore;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let engine = EngineConfig::from_env()?;
    let server = ServerConfig::from_env();
    let db_path = server
        .db_path
        .clone()
        .context("unable to resolve sqlite path (set COHESION_DB)")?;
    let store = SqliteSnapStore::open(&db_path)?;
    tracing::info!(
        db = %db_path.display(),
        build_timeout_secs = engine.cache.build_timeout.as_secs(),
        "snap store opened"
    );

    let service = Arc::new(CohesionService::new(Arc::new(store), engine));
    let app = create_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(server.bind_addr)
        .await
        .with_context(|| format!("bind {}", server.bind_addr))?;
    tracing::info!(addr = %server.bind_addr, "lineup cohesion API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
