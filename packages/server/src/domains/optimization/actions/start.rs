use tracing::info;

use crate::common::{Actor, AuditJobId, PipelineError, PipelineResult, PriceListId};
use crate::domains::analysis::{normalize_options, validate_optimization_options, OptimizationOption};
use crate::domains::audits::models::{AuditJob, AuditStatus};
use crate::domains::notifications::messages;
use crate::domains::optimization::jobs::ProcessOptimizationJob;
use crate::domains::optimization::models::{AuditContext, NewOptimizationJob, OptimizationJob};
use crate::kernel::ServerDeps;

/// Keywords handed to the optimization prompt.
const SUGGESTED_KEYWORDS: usize = 10;

fn audit_context(audit: &AuditJob) -> AuditContext {
    AuditContext {
        salon_name: audit.salon_name.clone(),
        overall_score: audit.overall_score,
        weaknesses: audit
            .report
            .as_ref()
            .map(|r| r.weaknesses.clone())
            .unwrap_or_default(),
        suggested_keywords: audit
            .keyword_report
            .as_ref()
            .map(|k| k.top_keywords(SUGGESTED_KEYWORDS))
            .unwrap_or_default(),
        category_proposal: audit.category_proposal.clone().filter(|p| !p.is_empty()),
    }
}

/// The completed audit whose findings feed the prompt: the one named by the
/// caller, else the audit the price list came from.
async fn linked_audit(
    actor: Actor,
    requested: Option<AuditJobId>,
    fallback: Option<AuditJobId>,
    deps: &ServerDeps,
) -> PipelineResult<Option<AuditJob>> {
    if let Some(audit_id) = requested {
        let audit = deps
            .store
            .find_audit(audit_id)
            .await?
            .ok_or(PipelineError::NotFound("audit"))?;
        actor.ensure_owner(audit.user_id, "audit")?;
        if audit.status != AuditStatus::Completed {
            return Err(PipelineError::InvalidInput(
                "the linked audit has not completed".to_string(),
            ));
        }
        return Ok(Some(audit));
    }

    let Some(audit_id) = fallback else {
        return Ok(None);
    };
    Ok(deps
        .store
        .find_audit(audit_id)
        .await?
        .filter(|a| a.user_id == actor.user_id && a.status == AuditStatus::Completed))
}

/// Create an optimization job for a price list and queue its processing.
///
/// Options are validated before anything is written: an empty selection, or
/// `categories` without a proposal from the linked audit, is an input error.
pub async fn start_optimization(
    actor: Actor,
    price_list_id: PriceListId,
    options: &[OptimizationOption],
    audit_id: Option<AuditJobId>,
    deps: &ServerDeps,
) -> PipelineResult<OptimizationJob> {
    let price_list = deps
        .store
        .find_price_list(price_list_id)
        .await?
        .ok_or(PipelineError::NotFound("price list"))?;
    actor.ensure_owner(price_list.user_id, "price list")?;

    let options = normalize_options(options);
    let audit = linked_audit(actor, audit_id, price_list.audit_id, deps).await?;
    let context = audit.as_ref().map(audit_context);
    let has_proposal = context
        .as_ref()
        .is_some_and(|c| c.category_proposal.is_some());

    validate_optimization_options(&options, has_proposal)
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
    if price_list.pricing_data.is_empty() {
        return Err(PipelineError::InvalidInput(
            "the price list has no services".to_string(),
        ));
    }

    let new = NewOptimizationJob {
        user_id: actor.user_id,
        price_list_id,
        audit_id: audit.as_ref().map(|a| a.id),
        options,
        input_pricing_data: price_list.pricing_data.clone(),
        audit_context: context,
    };
    let started = messages::optimization_started(actor.user_id, price_list_id, &price_list.name);
    let job = deps.store.create_optimization(new, started).await?;

    deps.enqueue_step(ProcessOptimizationJob::first(job.id)).await?;

    info!(
        job_id = %job.id,
        price_list_id = %price_list_id,
        audit_id = ?job.audit_id,
        options = ?job.options,
        services = job.input_pricing_data.services_count(),
        "optimization started"
    );
    Ok(job)
}
