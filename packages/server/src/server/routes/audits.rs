use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::caller;
use crate::common::{Actor, AuditJobId};
use crate::domains::audits::{self, AuditJob};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ProfileUrlRequest {
    pub profile_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceFailRequest {
    #[serde(default)]
    pub refund: bool,
}

/// `POST /audits` - start an audit paid with one credit.
pub async fn create_audit_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<ProfileUrlRequest>,
) -> ApiResult<(StatusCode, Json<AuditJob>)> {
    let actor = caller(actor)?;
    let job = audits::start_direct_audit(actor, &body.profile_url, &state.deps).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `POST /audits/:id/start` - start a purchased audit.
pub async fn start_audit_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(audit_id): Path<AuditJobId>,
    Json(body): Json<ProfileUrlRequest>,
) -> ApiResult<Json<AuditJob>> {
    let actor = caller(actor)?;
    let job = audits::start_audit(actor, audit_id, &body.profile_url, &state.deps).await?;
    Ok(Json(job))
}

pub async fn retry_audit_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(audit_id): Path<AuditJobId>,
) -> ApiResult<Json<AuditJob>> {
    let actor = caller(actor)?;
    Ok(Json(
        audits::retry_stuck_audit(actor, audit_id, &state.deps).await?,
    ))
}

pub async fn retry_analysis_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(audit_id): Path<AuditJobId>,
) -> ApiResult<Json<AuditJob>> {
    let actor = caller(actor)?;
    Ok(Json(audits::retry_analysis(actor, audit_id, &state.deps).await?))
}

/// `POST /audits/:id/force-fail` - body is optional, refund defaults to off.
pub async fn force_fail_audit_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(audit_id): Path<AuditJobId>,
    body: Option<Json<ForceFailRequest>>,
) -> ApiResult<Json<AuditJob>> {
    let actor = caller(actor)?;
    let Json(body) = body.unwrap_or_default();
    Ok(Json(
        audits::force_fail_audit(actor, audit_id, body.refund, &state.deps).await?,
    ))
}

pub async fn get_audit_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
    Path(audit_id): Path<AuditJobId>,
) -> ApiResult<Json<AuditJob>> {
    let actor = caller(actor)?;
    Ok(Json(audits::get_audit(actor, audit_id, &state.deps).await?))
}

pub async fn active_audit_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
) -> ApiResult<Json<Option<AuditJob>>> {
    let actor = caller(actor)?;
    Ok(Json(audits::active_audit(actor, &state.deps).await?))
}

pub async fn list_audits_handler(
    Extension(state): Extension<AppState>,
    actor: Option<Extension<Actor>>,
) -> ApiResult<Json<Vec<AuditJob>>> {
    let actor = caller(actor)?;
    Ok(Json(audits::list_audits(actor, &state.deps).await?))
}
