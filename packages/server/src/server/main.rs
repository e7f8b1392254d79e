// Main entry point for the API server

use std::sync::Arc;

use anyhow::{Context, Result};
use pricelist_core::kernel::jobs::JobRunner;
use pricelist_core::kernel::store::PostgresStore;
use pricelist_core::server::{build_app, build_server_deps, AppState, JwtService};
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

    tracing::info!("Starting price list API");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database (runs migrations)
    tracing::info!("Connecting to database...");
    let store = PostgresStore::connect(&config.database_url, 10)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected, migrations complete");
    let pool = store.pool().clone();

    let deps = Arc::new(build_server_deps(&config, store)?);

    let shutdown = CancellationToken::new();
    let runner_handle = if config.embedded_worker {
        let runner = JobRunner::with_config(
            Arc::new(domains::job_registry()),
            deps.clone(),
            config.runner_config("embedded"),
        )
        .with_shutdown(shutdown.child_token());
        Some(tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                tracing::error!(error = %e, "Job runner exited with error");
            }
        }))
    } else {
        tracing::info!("Embedded worker disabled");
        None
    };

    let state = AppState::new(deps, config.purchase_secret.clone()).with_pool(pool);
    let jwt_service = Arc::new(JwtService::new(&config.jwt_secret, config.jwt_issuer.clone()));
    let app = build_app(state, jwt_service);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = runner_handle {
        let _ = handle.await;
    }

    Ok(())
}
