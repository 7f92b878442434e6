use anyhow::Result;
use clap::Parser;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod api;
mod config;
mod db;
mod error;
mod live_scores;
mod points;
mod worker;

use api::AppState;
use config::Config;
use db::{Database, FixtureStore};
use live_scores::{FixtureSource, FotMob};
use points::{PointsSettler, Settler};
use worker::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let source: Arc<dyn FixtureSource> = Arc::new(FotMob::new(
        &config.fotmob_api_url,
        config.league_ids.iter().copied().collect(),
        Duration::from_secs(config.request_timeout_secs),
    )?);
    let store: Arc<dyn FixtureStore> = Arc::new(db.clone());
    let settler: Arc<dyn Settler> = Arc::new(PointsSettler::new(db));
    info!(
        "Tracking {} leagues via {}",
        config.league_ids.len(),
        source.name()
    );

    let orchestrator = Orchestrator::new(&config, source.clone(), store.clone(), settler);

    let app = api::router(AppState {
        source,
        store,
        scheduler: orchestrator.scheduler(),
    });
    let addr: SocketAddr = config.http_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Sync API listening on http://{}", addr);

    tokio::select! {
        result = orchestrator.run(shutdown_signal()) => result?,
        result = axum::serve(listener, app).into_future() => {
            result?;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
    }

    info!("Worker stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
