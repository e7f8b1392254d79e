//! Operator recovery for audits stuck in an active status.

use tracing::info;

use crate::common::{Actor, AuditJobId, PipelineError, PipelineResult};
use crate::domains::audits::jobs::{AnalyzeAuditJob, ScrapeProfileJob};
use crate::domains::audits::models::{AuditJob, AuditPatch, AuditStatus};
use crate::domains::notifications::{
    email_notification, messages, FailureCause, OPERATOR_STOPPED_MESSAGE,
};
use crate::kernel::store::{AuditFailure, AuditGuard};
use crate::kernel::ServerDeps;

use super::{ensure_status, load_audit, transition_lost};

/// Statuses an operator retry may start from.
const RETRYABLE: [AuditStatus; 3] = [
    AuditStatus::Scraping,
    AuditStatus::ScrapingRetry,
    AuditStatus::Analyzing,
];

/// Guard pinned to what the operator saw, so a step that moves the job in
/// between wins and the retry is rejected.
fn pinned(job: &AuditJob, statuses: &[AuditStatus]) -> AuditGuard {
    AuditGuard::from_statuses(statuses).at_attempt(job.retry_count)
}

/// Reset a stuck audit to `scraping` with fresh retry counters and queue the
/// scrape again.
pub async fn retry_stuck_audit(
    actor: Actor,
    audit_id: AuditJobId,
    deps: &ServerDeps,
) -> PipelineResult<AuditJob> {
    actor.ensure_admin()?;
    let job = load_audit(audit_id, deps).await?;
    ensure_status(&job, &RETRYABLE)?;
    if job.source_url.is_none() {
        return Err(PipelineError::InvalidInput(
            "audit has no profile URL to scrape".to_string(),
        ));
    }

    let patch = AuditPatch::builder()
        .status(AuditStatus::Scraping)
        .retry_count(0)
        .progress(5)
        .progress_message("Restarted by an operator")
        .clear_error(true)
        .build();

    let Some(updated) = deps
        .store
        .update_audit(audit_id, pinned(&job, &RETRYABLE), patch)
        .await?
    else {
        return Err(transition_lost(audit_id, &RETRYABLE, deps).await);
    };

    deps.enqueue_step(ScrapeProfileJob::first(audit_id)).await?;

    info!(audit_id = %audit_id, operator = %actor.user_id, from = %job.status, "stuck audit restarted");
    Ok(updated)
}

/// Re-run only the analysis of an audit whose profile was already scraped.
pub async fn retry_analysis(
    actor: Actor,
    audit_id: AuditJobId,
    deps: &ServerDeps,
) -> PipelineResult<AuditJob> {
    actor.ensure_admin()?;
    let job = load_audit(audit_id, deps).await?;
    ensure_status(&job, &RETRYABLE)?;
    if job.scraped_data.is_none() {
        return Err(PipelineError::InvalidInput(
            "audit has no scraped profile to analyze".to_string(),
        ));
    }

    let patch = AuditPatch::builder()
        .status(AuditStatus::Analyzing)
        .progress(50)
        .progress_message("Analysis restarted by an operator")
        .clear_error(true)
        .build();

    let Some(updated) = deps
        .store
        .update_audit(audit_id, pinned(&job, &RETRYABLE), patch)
        .await?
    else {
        return Err(transition_lost(audit_id, &RETRYABLE, deps).await);
    };

    deps.enqueue_step(AnalyzeAuditJob::first(audit_id)).await?;

    info!(audit_id = %audit_id, operator = %actor.user_id, "audit analysis restarted");
    Ok(updated)
}

/// Terminate an active audit as `failed`. With `refund`, a consumed credit
/// goes back to the owner in the same write.
pub async fn force_fail_audit(
    actor: Actor,
    audit_id: AuditJobId,
    refund: bool,
    deps: &ServerDeps,
) -> PipelineResult<AuditJob> {
    actor.ensure_admin()?;
    let job = load_audit(audit_id, deps).await?;
    ensure_status(&job, &AuditStatus::ACTIVE)?;

    let refunded = refund && job.credit_consumed;
    let notification =
        messages::audit_failed(job.user_id, audit_id, FailureCause::StoppedByOperator, refunded);
    let failure = AuditFailure {
        error_message: OPERATOR_STOPPED_MESSAGE.to_string(),
        refund,
        notification: notification.clone(),
    };

    let Some(failed) = deps
        .store
        .fail_audit(audit_id, pinned(&job, &AuditStatus::ACTIVE), failure)
        .await?
    else {
        return Err(transition_lost(audit_id, &AuditStatus::ACTIVE, deps).await);
    };

    info!(
        audit_id = %audit_id,
        operator = %actor.user_id,
        from = %job.status,
        refunded,
        "audit force-failed"
    );
    email_notification(&notification, deps).await;
    Ok(failed)
}
