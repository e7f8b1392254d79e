use chrono::Utc;
use tracing::info;

use crate::common::{Actor, AuditJobId, PipelineError, PipelineResult};
use crate::kernel::scraper_client::validate_profile_url;
use crate::kernel::store::AuditGuard;
use crate::kernel::ServerDeps;

use super::{ensure_status, load_audit, transition_lost};
use crate::domains::audits::jobs::ScrapeProfileJob;
use crate::domains::audits::models::{AuditJob, AuditPatch, AuditStatus, NewAuditJob};

fn parse_profile_url(raw: &str) -> PipelineResult<String> {
    validate_profile_url(raw)
        .map(|url| url.to_string())
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))
}

/// Start a purchased (`pending`) audit with the salon's profile URL.
///
/// The credit was paid for with the purchase, so nothing is debited here.
pub async fn start_audit(
    actor: Actor,
    audit_id: AuditJobId,
    profile_url: &str,
    deps: &ServerDeps,
) -> PipelineResult<AuditJob> {
    let job = load_audit(audit_id, deps).await?;
    actor.ensure_owner(job.user_id, "audit")?;
    ensure_status(&job, &[AuditStatus::Pending])?;
    let source_url = parse_profile_url(profile_url)?;

    let patch = AuditPatch::builder()
        .status(AuditStatus::Scraping)
        .source_url(source_url.clone())
        .started_at(Utc::now())
        .retry_count(0)
        .progress(5)
        .progress_message("Fetching salon profile")
        .clear_error(true)
        .build();

    let Some(job) = deps
        .store
        .update_audit(audit_id, AuditGuard::from_status(AuditStatus::Pending), patch)
        .await?
    else {
        return Err(transition_lost(audit_id, &[AuditStatus::Pending], deps).await);
    };

    deps.enqueue_step(ScrapeProfileJob::first(audit_id)).await?;

    info!(audit_id = %audit_id, user_id = %actor.user_id, url = %source_url, "audit started");
    Ok(job)
}

/// Start an audit straight from a profile URL, paying with one credit.
///
/// Rejected without a write when the caller has no credits, already has an
/// active audit, or submitted the same URL within the last five minutes.
pub async fn start_direct_audit(
    actor: Actor,
    profile_url: &str,
    deps: &ServerDeps,
) -> PipelineResult<AuditJob> {
    let source_url = parse_profile_url(profile_url)?;

    let job = deps
        .store
        .create_audit(NewAuditJob::direct(actor.user_id, source_url.clone()))
        .await?;

    deps.enqueue_step(ScrapeProfileJob::first(job.id)).await?;

    info!(audit_id = %job.id, user_id = %actor.user_id, url = %source_url, "direct audit started");
    Ok(job)
}
