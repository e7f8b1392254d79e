use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: DatabaseHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_size: Option<u32>,
}

/// Health check endpoint
///
/// Returns 200 OK when the database answers within five seconds, 503 Service
/// Unavailable otherwise. Without a database pool (in-memory store) the
/// check always passes.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.db_pool {
        None => DatabaseHealth {
            status: "memory",
            error: None,
            pool_size: None,
        },
        Some(pool) => {
            let probe = tokio::time::timeout(
                Duration::from_secs(5),
                sqlx::query("SELECT 1").execute(pool),
            )
            .await;
            let error = match probe {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(format!("Query failed: {}", e)),
                Err(_) => Some("Query timeout (>5s)".to_string()),
            };
            DatabaseHealth {
                status: if error.is_none() { "ok" } else { "error" },
                error,
                pool_size: Some(pool.size()),
            }
        }
    };

    let healthy = database.error.is_none();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            database,
        }),
    )
}
