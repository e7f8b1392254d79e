//! Application setup and router.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::kernel::jobs::{JobQueue, PostgresJobQueue};
use crate::kernel::store::PostgresStore;
use crate::kernel::{
    BaseEmailService, DisabledEmailService, HttpEmailService, HttpProfileScraper, OpenAiAdapter,
    ServerDeps,
};
use crate::server::auth::JwtService;
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    /// Present when running against Postgres; used by the health check.
    pub db_pool: Option<PgPool>,
    pub purchase_secret: Arc<String>,
}

impl AppState {
    pub fn new(deps: Arc<ServerDeps>, purchase_secret: impl Into<String>) -> Self {
        Self {
            deps,
            db_pool: None,
            purchase_secret: Arc::new(purchase_secret.into()),
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}

/// Wire production collaborators around a connected store.
pub fn build_server_deps(config: &Config, store: PostgresStore) -> anyhow::Result<ServerDeps> {
    use anyhow::Context;

    let jobs: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(store.pool().clone()));

    let ai = OpenAiAdapter::new(
        openai_client::OpenAIClient::new(config.openai_api_key.clone()),
        config.openai_model.clone(),
    );

    let scraper = HttpProfileScraper::new(config.scraper_url.clone(), config.scraper_api_key.clone())
        .context("Failed to create profile scraper")?;

    let email: Arc<dyn BaseEmailService> = match config.email() {
        Some((api_key, from)) => Arc::new(
            HttpEmailService::new(api_key.to_string(), from.to_string())
                .context("Failed to create email client")?,
        ),
        None => {
            tracing::warn!("EMAIL_API_KEY or EMAIL_FROM not set, email delivery disabled");
            Arc::new(DisabledEmailService)
        }
    };

    Ok(ServerDeps::new(
        Arc::new(store),
        jobs,
        Arc::new(ai),
        Arc::new(scraper),
        email,
        config.app_base_url.clone(),
    ))
}

/// Build the Axum application router
///
/// The job runner is not started here; the binary decides whether to embed
/// one.
pub fn build_app(state: AppState, jwt_service: Arc<JwtService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(PURCHASE_SECRET_HEADER),
        ]);

    Router::new()
        .route("/health", get(health_handler))
        // Audits
        .route("/audits", get(list_audits_handler).post(create_audit_handler))
        .route("/audits/active", get(active_audit_handler))
        .route("/audits/:id", get(get_audit_handler))
        .route("/audits/:id/start", post(start_audit_handler))
        .route("/audits/:id/retry", post(retry_audit_handler))
        .route("/audits/:id/retry-analysis", post(retry_analysis_handler))
        .route("/audits/:id/force-fail", post(force_fail_audit_handler))
        // Optimizations
        .route(
            "/price-lists/:id/optimizations",
            post(start_optimization_handler),
        )
        .route(
            "/price-lists/:id/optimizations/active",
            get(active_optimization_handler),
        )
        .route("/optimizations/:id", get(get_optimization_handler))
        // Polling
        .route("/jobs/:pipeline/:id", get(get_job_handler))
        .route("/users/:id/active-job", get(user_active_job_handler))
        .route("/notifications", get(list_notifications_handler))
        // Billing
        .route("/purchases", post(purchase_completed_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt_service.clone(), req, next)
        }))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
