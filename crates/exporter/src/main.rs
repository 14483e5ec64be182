//! zVirt exporter
//!
//! Keeps a pre-rendered Prometheus snapshot of the engine inventory in
//! memory, refreshed in the background, and serves it on `/metrics`.

use anyhow::{anyhow, Context, Result};
use exporter_lib::{
    api::{self, AppState},
    client::EngineClient,
    collector::{Aggregator, CollectorSet, RefreshLoopBuilder},
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    snapshot::SnapshotCache,
    token::TokenCache,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting zvirt-exporter");

    let config = config::ExporterConfig::load().context("invalid exporter configuration")?;
    info!(
        engine = %config.base_url(),
        api_port = config.api_port,
        refresh_interval_secs = config.refresh_interval_secs,
        "Exporter configured"
    );

    let client = Arc::new(
        EngineClient::new(&config.engine_settings()).context("failed to build engine client")?,
    );
    let logger = StructuredLogger::new(client.base_url().as_str());

    let tokens = Arc::new(TokenCache::new(client.clone()).with_logger(logger.clone()));
    let collectors = CollectorSet::engine(client);
    let names = collectors.names();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TOKEN).await;
    health_registry.register(components::REFRESH).await;
    for name in &names {
        health_registry.register(name).await;
    }

    let metrics = ExporterMetrics::new();
    let snapshots = SnapshotCache::new();

    let refresh = RefreshLoopBuilder::new()
        .aggregator(Aggregator::new(tokens, collectors))
        .snapshots(snapshots.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .cadence(config.refresh_interval())
        .build()?;

    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    logger.log_startup(EXPORTER_VERSION, &names);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut refresh_handle = tokio::spawn(refresh.run(shutdown_rx));

    let app_state = Arc::new(AppState::new(snapshots, health_registry, metrics));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let mut refresh_finished = false;
    let result: Result<()> = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            Ok(())
        }
        served = &mut api_handle => {
            let err = api_exit_error(served);
            logger.log_shutdown(&format!("{err:#}"));
            Err(err)
        }
        finished = &mut refresh_handle => {
            refresh_finished = true;
            let err = refresh_exit_error(finished);
            logger.log_shutdown(&format!("{err:#}"));
            Err(err)
        }
    };

    let _ = shutdown_tx.send(());
    api_handle.abort();
    if !refresh_finished {
        if let Err(e) = refresh_handle.await {
            error!(error = %e, "Refresh loop task failed");
        }
    }

    match &result {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => error!(error = %format!("{e:#}"), "Exporter stopped"),
    }
    result
}

/// The API server only returns on failure; any exit stops the exporter
fn api_exit_error(served: Result<std::io::Result<()>, JoinError>) -> anyhow::Error {
    match served {
        Ok(Ok(())) => anyhow!("API server stopped unexpectedly"),
        Ok(Err(e)) => anyhow::Error::new(e).context("API server failed"),
        Err(e) => anyhow::Error::new(e).context("API server task aborted"),
    }
}

/// The refresh loop only returns after shutdown was requested
fn refresh_exit_error(finished: Result<(), JoinError>) -> anyhow::Error {
    match finished {
        Ok(()) => anyhow!("refresh loop stopped unexpectedly"),
        Err(e) => anyhow::Error::new(e).context("refresh loop task failed"),
    }
}
