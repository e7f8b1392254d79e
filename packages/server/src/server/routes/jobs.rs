//! Pipeline-agnostic polling.

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::caller;
use crate::common::{Actor, Id, UserId};
use crate::domains::tracking::{self, JobRef, JobScope, PipelineJob};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Audit,
    Optimization,
}

/// `GET /jobs/:pipeline/:id`
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path((kind, id)): Path<(PipelineKind, Uuid)>,
) -> ApiResult<Json<PipelineJob>> {
    let actor = caller(actor)?;
    let job = match kind {
        PipelineKind::Audit => JobRef::Audit(Id::from_uuid(id)),
        PipelineKind::Optimization => JobRef::Optimization(Id::from_uuid(id)),
    };
    Ok(Json(tracking::get_job(actor, job, &state.deps).await?))
}

/// `GET /users/:id/active-job` - the user's running audit, if any.
pub async fn user_active_job_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<Option<PipelineJob>>> {
    let actor = caller(actor)?;
    Ok(Json(
        tracking::get_active_job_for_scope(actor, JobScope::User(user_id), &state.deps).await?,
    ))
}
