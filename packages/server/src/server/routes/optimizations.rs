use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::caller;
use crate::common::{Actor, AuditJobId, OptimizationJobId, PriceListId};
use crate::domains::analysis::OptimizationOption;
use crate::domains::optimization::{self, OptimizationJob};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct StartOptimizationRequest {
    pub options: Vec<OptimizationOption>,
    #[serde(default)]
    pub audit_id: Option<AuditJobId>,
}

/// `POST /price-lists/:id/optimizations`
pub async fn start_optimization_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(price_list_id): Path<PriceListId>,
    Json(body): Json<StartOptimizationRequest>,
) -> ApiResult<(StatusCode, Json<OptimizationJob>)> {
    let actor = caller(actor)?;
    let job = optimization::start_optimization(
        actor,
        price_list_id,
        &body.options,
        body.audit_id,
        &state.deps,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn active_optimization_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(price_list_id): Path<PriceListId>,
) -> ApiResult<Json<Option<OptimizationJob>>> {
    let actor = caller(actor)?;
    Ok(Json(
        optimization::active_optimization(actor, price_list_id, &state.deps).await?,
    ))
}

pub async fn get_optimization_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(job_id): Path<OptimizationJobId>,
) -> ApiResult<Json<OptimizationJob>> {
    let actor = caller(actor)?;
    Ok(Json(
        optimization::get_optimization(actor, job_id, &state.deps).await?,
    ))
}
