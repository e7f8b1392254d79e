//! Scrape and analysis steps, dispatched by the job runner.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domains::analysis::{structural_score, KeywordReport};
use crate::domains::audits::jobs::{AnalyzeAuditJob, ScrapeProfileJob};
use crate::domains::audits::models::{
    AuditJob, AuditPatch, AuditReport, AuditStatus, ModelAuditReport, ScrapedProfile,
};
use crate::domains::audits::prompt::build_audit_prompt;
use crate::domains::notifications::{email_notification, messages, FailureCause};
use crate::kernel::store::{AuditCompletion, AuditFailure, AuditGuard, ScrapeCommit};
use crate::kernel::{parse_model_json, CompletionOptions, ServerDeps};

const AUDIT_TEMPERATURE: f32 = 0.3;
const AUDIT_MAX_TOKENS: u32 = 4000;

fn base_list_name(profile: &ScrapedProfile) -> String {
    match profile.salon_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} (Booksy)", name),
        None => "Imported price list".to_string(),
    }
}

fn pro_list_name(job: &AuditJob) -> String {
    match job.salon_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} Pro", name),
        None => "Optimized price list".to_string(),
    }
}

/// Terminal pipeline failure. Returns the consumed credit, if any.
async fn fail_audit(
    job: &AuditJob,
    guard: AuditGuard,
    error_message: String,
    cause: FailureCause,
    deps: &ServerDeps,
) -> Result<()> {
    let notification = messages::audit_failed(job.user_id, job.id, cause, job.credit_consumed);
    let failure = AuditFailure {
        error_message: error_message.clone(),
        refund: true,
        notification: notification.clone(),
    };

    match deps.store.fail_audit(job.id, guard, failure).await? {
        Some(failed) => {
            warn!(
                audit_id = %job.id,
                error = %error_message,
                refunded = job.credit_consumed && !failed.credit_consumed,
                "audit failed"
            );
            email_notification(&notification, deps).await;
        }
        None => debug!(audit_id = %job.id, "audit already moved on, failure not recorded"),
    }
    Ok(())
}

/// Fetch the profile for attempt `command.attempt`.
///
/// Success stores the snapshot with the base price list and queues the
/// analysis. A failure is retried on the backoff schedule or fails the audit.
pub async fn run_scrape_step(command: ScrapeProfileJob, deps: &ServerDeps) -> Result<()> {
    let audit_id = command.audit_id;
    let attempt = command.attempt;

    let Some(job) = deps.store.find_audit(audit_id).await? else {
        warn!(audit_id = %audit_id, "scrape step for missing audit");
        return Ok(());
    };

    let current = AuditGuard::from_statuses(&[AuditStatus::Scraping, AuditStatus::ScrapingRetry])
        .at_attempt(attempt);
    if !current.allows(job.status, job.retry_count) {
        debug!(
            audit_id = %audit_id,
            attempt,
            status = %job.status,
            retry_count = job.retry_count,
            "stale scrape step, skipping"
        );
        return Ok(());
    }

    if job.status == AuditStatus::ScrapingRetry {
        let patch = AuditPatch::builder()
            .status(AuditStatus::Scraping)
            .progress_message(format!("Fetching salon profile (attempt {})", attempt + 1))
            .build();
        let guard = AuditGuard::from_status(AuditStatus::ScrapingRetry).at_attempt(attempt);
        if deps.store.update_audit(audit_id, guard, patch).await?.is_none() {
            debug!(audit_id = %audit_id, attempt, "retry superseded, skipping");
            return Ok(());
        }
    }

    let scraping = AuditGuard::from_status(AuditStatus::Scraping).at_attempt(attempt);

    let Some(url) = job.source_url.clone() else {
        return fail_audit(
            &job,
            scraping,
            "audit has no profile URL".to_string(),
            FailureCause::InvalidProfileUrl,
            deps,
        )
        .await;
    };

    info!(audit_id = %audit_id, attempt, url = %url, "scraping salon profile");

    let error = match deps.scraper.scrape(&url).await {
        Ok(profile) if profile.services_count() == 0 => {
            return fail_audit(
                &job,
                scraping,
                format!("profile {} lists no services", url),
                FailureCause::EmptyProfile,
                deps,
            )
            .await;
        }
        Ok(profile) => {
            let services = profile.services_count();
            let commit = ScrapeCommit {
                base_list_name: base_list_name(&profile),
                progress_message: format!("Found {} services, analyzing", services),
                profile,
            };
            match deps.store.commit_scrape(audit_id, scraping, commit).await? {
                Some((job, base)) => {
                    info!(
                        audit_id = %audit_id,
                        base_price_list_id = %base.id,
                        categories = job.categories_count,
                        services,
                        "profile scraped"
                    );
                    deps.enqueue_step(AnalyzeAuditJob::first(audit_id)).await?;
                }
                None => debug!(audit_id = %audit_id, "audit moved on during scrape, result dropped"),
            }
            return Ok(());
        }
        Err(error) => error,
    };

    let decision = deps
        .retry_policy
        .decide((attempt + 1) as u32, error.class());

    if !decision.should_retry {
        let cause = FailureCause::from_scrape(&error);
        return fail_audit(&job, scraping, error.to_string(), cause, deps).await;
    }

    let next = attempt + 1;
    let patch = AuditPatch::builder()
        .status(AuditStatus::ScrapingRetry)
        .retry_count(next)
        .last_retry_at(Utc::now())
        .error_message(error.to_string())
        .progress_message(format!(
            "Profile could not be fetched, retrying in {} s",
            decision.delay.as_secs()
        ))
        .build();

    if deps.store.update_audit(audit_id, scraping, patch).await?.is_none() {
        debug!(audit_id = %audit_id, "audit moved on during scrape, retry dropped");
        return Ok(());
    }

    warn!(
        audit_id = %audit_id,
        attempt,
        delay_ms = decision.delay_ms(),
        error = %error,
        "scrape failed, retry scheduled"
    );
    deps.schedule_step(ScrapeProfileJob::new(audit_id, next), decision.delay)
        .await?;
    Ok(())
}

/// Analyze the stored snapshot with one model call and complete the audit.
pub async fn run_analysis_step(command: AnalyzeAuditJob, deps: &ServerDeps) -> Result<()> {
    let audit_id = command.audit_id;
    let analyzing = AuditGuard::from_status(AuditStatus::Analyzing);

    let Some(job) = deps.store.find_audit(audit_id).await? else {
        warn!(audit_id = %audit_id, "analysis step for missing audit");
        return Ok(());
    };
    if job.status != AuditStatus::Analyzing {
        debug!(audit_id = %audit_id, status = %job.status, "stale analysis step, skipping");
        return Ok(());
    }

    let Some(profile) = job.scraped_data.clone() else {
        return fail_audit(
            &job,
            analyzing,
            "audit has no scraped profile".to_string(),
            FailureCause::Unexpected,
            deps,
        )
        .await;
    };

    let data = profile.pricing_data();
    let keyword_report = KeywordReport::analyze(&data);
    let proposal = keyword_report.proposal(&data);
    let breakdown = structural_score(&data);
    let prompt = build_audit_prompt(&profile, &keyword_report, &breakdown, &proposal);

    let options = CompletionOptions {
        temperature: AUDIT_TEMPERATURE,
        max_tokens: AUDIT_MAX_TOKENS,
        ..Default::default()
    };

    info!(
        audit_id = %audit_id,
        attempt = command.attempt,
        keywords = keyword_report.keywords.len(),
        proposed_changes = proposal.changes.len(),
        "running audit analysis"
    );

    let response = match deps.ai.complete(&prompt, &options).await {
        Ok(text) => parse_model_json::<ModelAuditReport>(&text),
        Err(e) => Err(e),
    };

    let error = match response {
        Ok(model) => {
            let report = AuditReport::from_model(model, breakdown);
            let notification = messages::audit_completed(job.user_id, audit_id, report.overall_score);
            let completion = AuditCompletion {
                report,
                keyword_report,
                category_proposal: proposal,
                pro_list_name: pro_list_name(&job),
                notification: notification.clone(),
            };

            match deps.store.complete_audit(audit_id, analyzing, completion).await? {
                Some(done) => {
                    info!(
                        audit_id = %audit_id,
                        overall_score = ?done.overall_score,
                        pro_price_list_id = ?done.pro_price_list_id,
                        "audit completed"
                    );
                    email_notification(&notification, deps).await;
                }
                None => debug!(audit_id = %audit_id, "audit moved on during analysis, result dropped"),
            }
            return Ok(());
        }
        Err(error) => error,
    };

    let decision = deps.retry_policy.decide(command.attempt, error.class());
    if !decision.should_retry {
        let cause = FailureCause::from_ai(&error);
        return fail_audit(&job, analyzing, error.to_string(), cause, deps).await;
    }

    let patch = AuditPatch::builder()
        .progress_message(format!(
            "AI analysis is busy, retrying in {} s",
            decision.delay.as_secs()
        ))
        .build();
    if deps.store.update_audit(audit_id, analyzing, patch).await?.is_none() {
        return Ok(());
    }

    warn!(
        audit_id = %audit_id,
        attempt = command.attempt,
        delay_ms = decision.delay_ms(),
        error = %error,
        "audit analysis failed, retry scheduled"
    );
    deps.schedule_step(
        AnalyzeAuditJob::new(audit_id, command.attempt + 1),
        decision.delay,
    )
    .await?;
    Ok(())
}
