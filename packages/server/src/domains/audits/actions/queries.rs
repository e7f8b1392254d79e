use crate::common::{Actor, AuditJobId, PipelineResult};
use crate::domains::audits::models::AuditJob;
use crate::kernel::ServerDeps;

use super::load_audit;

/// The audit, for its owner or an admin.
pub async fn get_audit(
    actor: Actor,
    audit_id: AuditJobId,
    deps: &ServerDeps,
) -> PipelineResult<AuditJob> {
    let job = load_audit(audit_id, deps).await?;
    actor.ensure_can_view(job.user_id, "audit")?;
    Ok(job)
}

/// The caller's active audit, if any.
pub async fn active_audit(actor: Actor, deps: &ServerDeps) -> PipelineResult<Option<AuditJob>> {
    Ok(deps.store.active_audit_for_user(actor.user_id).await?)
}

/// The caller's audits, newest first.
pub async fn list_audits(actor: Actor, deps: &ServerDeps) -> PipelineResult<Vec<AuditJob>> {
    Ok(deps.store.list_audits_for_user(actor.user_id).await?)
}
