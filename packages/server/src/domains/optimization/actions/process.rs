//! The processing step and the two ways it settles a job.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::common::PipelineResult;
use crate::domains::analysis::{build_optimization_prompt, validate_optimization_options, PromptContext};
use crate::domains::notifications::{email_notification, messages, FailureCause};
use crate::domains::optimization::jobs::ProcessOptimizationJob;
use crate::domains::optimization::merge::{merge_optimization, MergedPriceList, ModelOptimizationOutput};
use crate::domains::optimization::models::{
    resolve_call_settings, OptimizationJob, OptimizationPatch, OptimizationStatus,
};
use crate::kernel::jobs::RetryDecision;
use crate::kernel::store::{OptimizationCompletion, OptimizationFailure, OptimizationGuard};
use crate::kernel::{parse_model_json, CompletionOptions, ServerDeps};

/// Guard matching the job exactly as it was read.
fn pinned(job: &OptimizationJob) -> OptimizationGuard {
    OptimizationGuard::from_status(job.status).at_attempt(job.retry_count)
}

fn prompt_context(job: &OptimizationJob) -> PromptContext {
    let Some(audit) = &job.audit_context else {
        return PromptContext::default();
    };
    PromptContext {
        salon_name: audit.salon_name.clone(),
        overall_score: audit.overall_score,
        weaknesses: audit.weaknesses.clone(),
        suggested_keywords: audit.suggested_keywords.clone(),
        proposal_is_stale: audit
            .category_proposal
            .as_ref()
            .is_some_and(|p| p.is_stale_for(&job.input_pricing_data)),
        category_proposal: audit.category_proposal.clone(),
    }
}

/// Finish `job` with the merged output.
///
/// In one write: the job becomes `completed`, the target price list takes
/// the output (keeping the job's input as its original) and the "completed"
/// notification is stored. `None` when the job moved on since it was read.
pub async fn complete_job(
    job: &OptimizationJob,
    merged: MergedPriceList,
    deps: &ServerDeps,
) -> PipelineResult<Option<OptimizationJob>> {
    let change_count = merged.result.total_changes();
    let notification =
        messages::optimization_completed(job.user_id, job.price_list_id, job.id, change_count);
    let completion = OptimizationCompletion {
        output: merged.output,
        result: merged.result,
        notification: notification.clone(),
    };

    let Some(done) = deps
        .store
        .complete_optimization(job.id, pinned(job), completion)
        .await?
    else {
        debug!(job_id = %job.id, "optimization moved on, completion dropped");
        return Ok(None);
    };

    info!(
        job_id = %job.id,
        price_list_id = %job.price_list_id,
        changes = change_count,
        "optimization completed"
    );
    email_notification(&notification, deps).await;
    Ok(Some(done))
}

/// Record a failed attempt of `job`.
///
/// With `decision.should_retry` the job stays `processing`, its retry count
/// goes up and the next attempt is scheduled after `decision.delay`.
/// Otherwise the job fails for good on this call and exactly one "failed"
/// notification is stored with it.
pub async fn fail_job(
    job: &OptimizationJob,
    error_message: String,
    cause: FailureCause,
    decision: RetryDecision,
    deps: &ServerDeps,
) -> PipelineResult<Option<OptimizationJob>> {
    if decision.should_retry {
        let next_retry = job.retry_count + 1;
        let patch = OptimizationPatch::builder()
            .status(OptimizationStatus::Processing)
            .retry_count(next_retry)
            .error_message(error_message.clone())
            .progress_message(format!(
                "AI is busy, retrying in {} s",
                decision.delay.as_secs()
            ))
            .build();

        let Some(updated) = deps.store.update_optimization(job.id, pinned(job), patch).await? else {
            debug!(job_id = %job.id, "optimization moved on, retry dropped");
            return Ok(None);
        };

        warn!(
            job_id = %job.id,
            retry_count = next_retry,
            delay_ms = decision.delay_ms(),
            error = %error_message,
            "optimization attempt failed, retry scheduled"
        );
        deps.schedule_step(
            ProcessOptimizationJob::new(job.id, next_retry as u32 + 1),
            decision.delay,
        )
        .await?;
        return Ok(Some(updated));
    }

    let notification = messages::optimization_failed(job.user_id, job.price_list_id, cause);
    let failure = OptimizationFailure {
        error_message: error_message.clone(),
        notification: notification.clone(),
    };

    let Some(failed) = deps
        .store
        .fail_optimization(job.id, pinned(job), failure)
        .await?
    else {
        debug!(job_id = %job.id, "optimization moved on, failure dropped");
        return Ok(None);
    };

    warn!(job_id = %job.id, error = %error_message, "optimization failed");
    email_notification(&notification, deps).await;
    Ok(Some(failed))
}

/// Validate, prompt, call the model once, merge.
pub async fn run_optimization_step(
    command: ProcessOptimizationJob,
    deps: &ServerDeps,
) -> Result<()> {
    let job_id = command.job_id;
    let Some(job) = deps.store.find_optimization(job_id).await? else {
        warn!(job_id = %job_id, "optimization step for missing job");
        return Ok(());
    };

    let current = OptimizationGuard::from_statuses(&OptimizationStatus::ACTIVE)
        .at_attempt(command.expected_retry_count());
    if !current.allows(job.status, job.retry_count) {
        debug!(
            job_id = %job_id,
            attempt = command.attempt,
            status = %job.status,
            "stale optimization step, skipping"
        );
        return Ok(());
    }

    let services = job.input_pricing_data.services_count();
    let patch = OptimizationPatch {
        status: Some(OptimizationStatus::Processing),
        progress: Some(20),
        progress_message: Some(format!("Optimizing {} services", services)),
        current_step: Some(1),
        started_at: job.started_at.is_none().then(Utc::now),
        ..Default::default()
    };
    let Some(job) = deps.store.update_optimization(job_id, pinned(&job), patch).await? else {
        debug!(job_id = %job_id, "optimization moved on, skipping");
        return Ok(());
    };

    let has_proposal = job
        .audit_context
        .as_ref()
        .is_some_and(|c| c.category_proposal.is_some());
    if let Err(e) = validate_optimization_options(&job.options, has_proposal) {
        fail_job(
            &job,
            e.to_string(),
            FailureCause::InvalidOptions,
            RetryDecision::give_up(),
            deps,
        )
        .await?;
        return Ok(());
    }

    let templates = deps.store.templates_for(&job.options).await?;
    let settings = resolve_call_settings(&templates, &job.options);
    let flat = job.input_pricing_data.flat_services();
    let prompt = build_optimization_prompt(&job.options, &prompt_context(&job), &flat);

    let options = CompletionOptions {
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        model: settings.model,
        system: settings.system,
        json: true,
    };

    info!(
        job_id = %job_id,
        attempt = command.attempt,
        services,
        temperature = options.temperature,
        max_tokens = options.max_tokens,
        "calling model for optimization"
    );

    let outcome = match deps.ai.complete(&prompt, &options).await {
        Ok(text) => parse_model_json::<ModelOptimizationOutput>(&text)
            .and_then(|model| merge_optimization(&job.input_pricing_data, &job.options, model)),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(merged) => {
            complete_job(&job, merged, deps).await?;
        }
        Err(error) => {
            let decision = deps.retry_policy.decide(command.attempt, error.class());
            fail_job(
                &job,
                error.to_string(),
                FailureCause::from_ai(&error),
                decision,
                deps,
            )
            .await?;
        }
    }
    Ok(())
}
