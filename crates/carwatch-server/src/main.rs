use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use carwatch_client::build_sources;
use carwatch_core::{
    Deduplicator, FetchOrchestrator, MonitorConfig, MonitorService, TieredScheduler,
    TracingSchedulerReporter,
};
use carwatch_db::{Database, DatabaseConfig};
use carwatch_server::routes;
use carwatch_server::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("carwatch=info".parse()?))
        .with_target(false)
        .init();

    let api_key =
        std::env::var("CARWATCH_SERVER_API_KEY").context("CARWATCH_SERVER_API_KEY must be set")?;
    let port = std::env::var("CARWATCH_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let run_scheduler = std::env::var("CARWATCH_SERVER_SCHEDULER")
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
        .unwrap_or(true);
    let addr = format!("0.0.0.0:{port}");

    let config = MonitorConfig::from_env()?;
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let sources = build_sources(&config).await?;
    let orchestrator = FetchOrchestrator::new(sources, config.orchestrator_config());
    let monitor = Arc::new(
        MonitorService::new(orchestrator, db.listing_repo())
            .with_dedup(Deduplicator::new(&config.dedup_config()))
            .with_warm_dedup(config.warm_dedup),
    );

    let cancel = CancellationToken::new();
    let scheduler = if run_scheduler {
        let scheduler = TieredScheduler::new(
            db.search_repo(),
            Arc::clone(&monitor),
            config.scheduler_config(),
        );
        let token = cancel.clone();
        Some(tokio::spawn(async move {
            scheduler.run(token, &TracingSchedulerReporter).await
        }))
    } else {
        tracing::info!("Scheduler disabled, serving on-demand requests only");
        None
    };

    let state = Arc::new(AppState {
        db,
        monitor,
        api_key,
    });

    let app = routes::router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = scheduler {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Scheduler exited with error"),
            Err(e) => tracing::error!(error = %e, "Scheduler task panicked"),
        }
    }

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
