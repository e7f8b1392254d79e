//! Payment provider callback.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::common::{AuditJobId, OptimizationJobId, PipelineError};
use crate::domains::billing::{self, PurchaseCompleted, PurchaseOutcome};
use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};

pub const PURCHASE_SECRET_HEADER: &str = "x-purchase-secret";

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseResponse {
    AuditCreated { audit_id: AuditJobId },
    Credited { balance: i32 },
    OptimizationLinked { optimization_id: Option<OptimizationJobId> },
    AlreadyProcessed,
}

impl From<PurchaseOutcome> for PurchaseResponse {
    fn from(outcome: PurchaseOutcome) -> Self {
        match outcome {
            PurchaseOutcome::AuditCreated(audit) => PurchaseResponse::AuditCreated {
                audit_id: audit.id,
            },
            PurchaseOutcome::Credited { balance } => PurchaseResponse::Credited { balance },
            PurchaseOutcome::OptimizationLinked(optimization_id) => {
                PurchaseResponse::OptimizationLinked { optimization_id }
            }
            PurchaseOutcome::AlreadyProcessed => PurchaseResponse::AlreadyProcessed,
        }
    }
}

/// `POST /purchases` - authenticated by the shared secret header, not a
/// user token.
pub async fn purchase_completed_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(purchase): Json<PurchaseCompleted>,
) -> ApiResult<(StatusCode, Json<PurchaseResponse>)> {
    let presented = headers
        .get(PURCHASE_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(state.purchase_secret.as_str()) {
        warn!(purchase_id = %purchase.purchase_id, "purchase callback with bad secret");
        return Err(ApiError(PipelineError::AuthenticationRequired));
    }

    let outcome = billing::handle_purchase_completed(purchase, &state.deps).await?;
    let status = match outcome {
        PurchaseOutcome::AlreadyProcessed => StatusCode::OK,
        _ => StatusCode::CREATED,
    };
    Ok((status, Json(outcome.into())))
}
