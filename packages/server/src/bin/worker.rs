//! Standalone job worker
//!
//! Runs pipeline steps without serving HTTP. Start one or more of these and
//! set EMBEDDED_WORKER=false on the API servers to scale steps separately.

use std::sync::Arc;

use anyhow::{Context, Result};
use pricelist_core::kernel::jobs::JobRunner;
use pricelist_core::kernel::store::PostgresStore;
use pricelist_core::server::build_server_deps;
use pricelist_core::{domains, Config};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pricelist_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let store = PostgresStore::connect(&config.database_url, 5)
        .await
        .context("Failed to connect to database")?;
    let deps = Arc::new(build_server_deps(&config, store)?);

    let registry = domains::job_registry();
    tracing::info!(job_types = ?registry.registered_types(), "Starting worker");

    let shutdown = CancellationToken::new();
    let runner = JobRunner::with_config(Arc::new(registry), deps, config.runner_config("worker"))
        .with_shutdown(shutdown.clone());

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    runner.run().await
}
