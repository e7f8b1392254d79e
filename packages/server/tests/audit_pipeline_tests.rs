//! Audit pipeline: start, scrape, analyze, retry and operator controls.

mod common;

use std::time::Duration;

use crate::common::{audit_answer, sample_profile, TestHarness, PROFILE_URL};
use pricelist_core::common::PipelineError;
use pricelist_core::domains::audits::{self, AuditStatus};
use pricelist_core::domains::audits::models::AuditJob;
use pricelist_core::domains::notifications::{
    self, NotificationKind, OPERATOR_STOPPED_MESSAGE,
};
use pricelist_core::domains::price_lists::models::PriceListSource;
use pricelist_core::kernel::jobs::JobStatus;
use pricelist_core::kernel::store::{CreditLedger, PriceListStore};
use pricelist_core::kernel::{AiError, ScrapeError};
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn direct_audit_runs_to_completion(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(78));

    let started = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    assert_eq!(started.status, AuditStatus::Scraping);
    assert!(started.credit_consumed);
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 0);

    ctx.settle().await;

    let audit = audits::get_audit(actor, started.id, &ctx.deps).await.unwrap();
    assert_eq!(audit.status, AuditStatus::Completed);
    assert_eq!(audit.progress, 100);
    assert_eq!(audit.overall_score, Some(78));
    assert_eq!(audit.salon_name.as_deref(), Some("Studio Urody Anna"));
    assert_eq!(audit.categories_count, 2);
    assert_eq!(audit.services_count, 5);
    assert!(audit.keyword_report.is_some());
    assert!(audit.error_message.is_none());

    let base = ctx
        .store
        .find_price_list(audit.base_price_list_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(base.source, PriceListSource::Booksy);
    assert_eq!(base.name, "Studio Urody Anna (Booksy)");
    assert_eq!(base.services_count(), 5);

    let pro = ctx
        .store
        .find_price_list(audit.pro_price_list_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pro.source, PriceListSource::Audit);
    assert_eq!(pro.audit_id, Some(audit.id));
    assert_eq!(pro.quality_score, Some(78));
    assert_eq!(base.optimized_version_id, Some(pro.id));

    // Variants survive the scrape untouched
    let manicure = &pro.pricing_data.categories[1].services[0];
    assert_eq!(manicure.variants.as_ref().map(Vec::len), Some(2));

    let inbox = notifications::list_notifications(actor, &ctx.deps).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::AuditCompleted);
    assert!(ctx.mocks.email.was_sent_with_subject("Your audit is ready"));

    assert_eq!(ctx.mocks.scraper.call_count(), 1);
    assert_eq!(ctx.mocks.ai.call_count(), 1);
    assert!(ctx.mocks.ai.was_called_with("Henna brwi"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn audit_without_credits_is_rejected(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);

    let result = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps).await;

    assert!(matches!(result, Err(PipelineError::InsufficientCredits)));
    assert_eq!(ctx.store.audit_count(), 0);
    assert!(ctx.queue.jobs().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn second_active_audit_is_rejected(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(2);
    audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();

    let result =
        audits::start_direct_audit(actor, "https://booksy.com/pl-pl/999_inny", &ctx.deps).await;

    assert!(matches!(result, Err(PipelineError::ActiveJobExists("audit"))));
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 1);
    assert_eq!(ctx.store.audit_count(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invalid_profile_url_is_rejected(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);

    let result = audits::start_direct_audit(actor, "booksy salon", &ctx.deps).await;

    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn anonymous_reads_are_rejected_and_strangers_denied(ctx: &mut TestHarness) {
    let owner = ctx.user_with_credits(1);
    let stranger = ctx.user_with_credits(0);
    let audit = audits::start_direct_audit(owner, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();

    let denied = audits::get_audit(stranger, audit.id, &ctx.deps).await;
    assert!(matches!(denied, Err(PipelineError::PermissionDenied(_))));

    let admin = ctx.admin();
    assert!(audits::get_audit(admin, audit.id, &ctx.deps).await.is_ok());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn transient_scrape_failures_follow_backoff_then_fail(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    for _ in 0..4 {
        ctx.mocks.scraper.push_error(ScrapeError::Timeout);
    }

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();

    ctx.settle().await;
    let current = reload(ctx, &audit).await;
    assert_eq!(current.status, AuditStatus::ScrapingRetry);
    assert_eq!(current.retry_count, 1);
    assert!(current.error_message.is_some());
    assert_eq!(ctx.mocks.scraper.call_count(), 1);

    // Not yet due
    ctx.advance_and_settle(Duration::from_secs(29)).await;
    assert_eq!(ctx.mocks.scraper.call_count(), 1);

    ctx.advance_and_settle(Duration::from_secs(1)).await;
    assert_eq!(ctx.mocks.scraper.call_count(), 2);
    assert_eq!(reload(ctx, &audit).await.retry_count, 2);

    ctx.advance_and_settle(Duration::from_secs(120)).await;
    assert_eq!(ctx.mocks.scraper.call_count(), 3);
    assert_eq!(reload(ctx, &audit).await.retry_count, 3);

    ctx.advance_and_settle(Duration::from_secs(300)).await;
    assert_eq!(ctx.mocks.scraper.call_count(), 4);

    let failed = reload(ctx, &audit).await;
    assert_eq!(failed.status, AuditStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert!(!failed.credit_consumed);
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 1);

    // Nothing else is waiting
    ctx.advance_and_settle(Duration::from_secs(3600)).await;
    assert_eq!(ctx.mocks.scraper.call_count(), 4);

    let inbox = notifications::list_notifications(actor, &ctx.deps).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::System);
    assert!(inbox[0].message.contains("credit has been returned"));
    // The technical error stays on the record, not in the message
    assert!(!inbox[0].message.contains("timed out"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn scrape_recovers_after_one_retry(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_error(ScrapeError::RateLimited);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(64));

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;
    ctx.advance_and_settle(Duration::from_secs(30)).await;

    let done = reload(ctx, &audit).await;
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(done.overall_score, Some(64));
    assert!(done.error_message.is_none());
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn missing_profile_fails_without_retry(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks
        .scraper
        .push_error(ScrapeError::ProfileNotFound("gone".into()));

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;

    let failed = reload(ctx, &audit).await;
    assert_eq!(failed.status, AuditStatus::Failed);
    assert_eq!(failed.retry_count, 0);
    assert_eq!(ctx.mocks.scraper.call_count(), 1);
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn empty_profile_fails(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    // The default mock profile lists no services

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;

    let failed = reload(ctx, &audit).await;
    assert_eq!(failed.status, AuditStatus::Failed);
    assert!(failed.base_price_list_id.is_none());
    assert_eq!(ctx.store.price_list_count(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn malformed_model_output_fails_analysis(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response("I cannot help with that");

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;

    let failed = reload(ctx, &audit).await;
    assert_eq!(failed.status, AuditStatus::Failed);
    assert_eq!(ctx.mocks.ai.call_count(), 1);
    // The base list from the scrape stays
    assert!(failed.base_price_list_id.is_some());
    assert!(failed.pro_price_list_id.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn analysis_retries_transient_model_errors(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_error(AiError::Overloaded("busy".into()));
    ctx.mocks.ai.push_response("```json\n{\"overallScore\": 140}\n```");

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;
    assert_eq!(reload(ctx, &audit).await.status, AuditStatus::Analyzing);

    ctx.advance_and_settle(Duration::from_secs(30)).await;

    let done = reload(ctx, &audit).await;
    assert_eq!(done.status, AuditStatus::Completed);
    // Out-of-range model score falls back to the structural score
    let report = done.report.unwrap();
    assert_eq!(Some(report.overall_score), done.overall_score);
    assert!((0..=100).contains(&report.overall_score));
    assert_eq!(ctx.mocks.ai.call_count(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn force_fail_with_refund_stops_the_pipeline(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    let admin = ctx.admin();
    ctx.mocks.scraper.push_profile(sample_profile());

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    let failed = audits::force_fail_audit(admin, audit.id, true, &ctx.deps)
        .await
        .unwrap();

    assert_eq!(failed.status, AuditStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some(OPERATOR_STOPPED_MESSAGE));
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 1);

    // The queued scrape finds a finished audit and does nothing
    ctx.settle().await;
    assert_eq!(ctx.mocks.scraper.call_count(), 0);
    assert_eq!(reload(ctx, &audit).await.status, AuditStatus::Failed);

    let again = audits::force_fail_audit(admin, audit.id, true, &ctx.deps).await;
    assert!(matches!(again, Err(PipelineError::AlreadyTerminal(_))));
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn force_fail_without_refund_keeps_the_credit_spent(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();

    audits::force_fail_audit(ctx.admin(), audit.id, false, &ctx.deps)
        .await
        .unwrap();

    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 0);
    let inbox = notifications::list_notifications(actor, &ctx.deps).await.unwrap();
    assert!(!inbox[0].message.contains("credit has been returned"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn operator_controls_require_admin(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();

    assert!(matches!(
        audits::force_fail_audit(actor, audit.id, true, &ctx.deps).await,
        Err(PipelineError::AdminRequired)
    ));
    assert!(matches!(
        audits::retry_stuck_audit(actor, audit.id, &ctx.deps).await,
        Err(PipelineError::AdminRequired)
    ));
    assert!(matches!(
        audits::retry_analysis(actor, audit.id, &ctx.deps).await,
        Err(PipelineError::AdminRequired)
    ));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn operator_retry_while_queued_runs_the_scrape_once(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(70));

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    let reset = audits::retry_stuck_audit(ctx.admin(), audit.id, &ctx.deps)
        .await
        .unwrap();
    assert_eq!(reset.status, AuditStatus::Scraping);
    assert_eq!(reset.retry_count, 0);

    ctx.settle().await;

    assert_eq!(ctx.mocks.scraper.call_count(), 1);
    assert_eq!(reload(ctx, &audit).await.status, AuditStatus::Completed);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn operator_retry_cancels_a_scheduled_retry(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_error(ScrapeError::Timeout);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(70));

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;
    assert_eq!(reload(ctx, &audit).await.retry_count, 1);

    audits::retry_stuck_audit(ctx.admin(), audit.id, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;
    assert_eq!(reload(ctx, &audit).await.status, AuditStatus::Completed);
    assert_eq!(ctx.mocks.scraper.call_count(), 2);

    // The step scheduled for the old attempt wakes up and finds nothing to do
    ctx.advance_and_settle(Duration::from_secs(30)).await;
    assert_eq!(ctx.mocks.scraper.call_count(), 2);
    assert_eq!(ctx.queue.count_with_status(JobStatus::Pending), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn operator_rescrape_refreshes_the_existing_base_list(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_error(AiError::Timeout);

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;
    let analyzing = reload(ctx, &audit).await;
    assert_eq!(analyzing.status, AuditStatus::Analyzing);
    let base_id = analyzing.base_price_list_id.unwrap();
    assert_eq!(ctx.store.price_list_count(), 1);

    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(64));
    audits::retry_stuck_audit(ctx.admin(), audit.id, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;

    let done = reload(ctx, &audit).await;
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(ctx.mocks.scraper.call_count(), 2);
    assert_eq!(done.base_price_list_id, Some(base_id));
    // One base list and one pro list
    assert_eq!(ctx.store.price_list_count(), 2);

    let base = ctx.store.find_price_list(base_id).await.unwrap().unwrap();
    assert_eq!(base.optimized_version_id, done.pro_price_list_id);
    assert_eq!(base.services_count(), 5);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn retry_analysis_reuses_the_scraped_profile(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let stuck = AuditJob::builder()
        .user_id(actor.user_id)
        .status(AuditStatus::Analyzing)
        .source_url(PROFILE_URL)
        .salon_name("Studio Urody Anna")
        .scraped_data(sample_profile())
        .build();
    ctx.store.put_audit(stuck.clone());
    ctx.mocks.ai.push_response(audit_answer(55));

    let queued = audits::retry_analysis(ctx.admin(), stuck.id, &ctx.deps)
        .await
        .unwrap();
    assert_eq!(queued.status, AuditStatus::Analyzing);

    ctx.settle().await;

    let done = reload(ctx, &stuck).await;
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(done.overall_score, Some(55));
    assert_eq!(ctx.mocks.scraper.call_count(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn email_failure_does_not_affect_the_audit(ctx: &mut TestHarness) {
    use pricelist_core::kernel::{MockEmailService, TestDependencies};
    use std::sync::Arc;

    let mocks = TestDependencies::new().mock_email(MockEmailService::failing());
    let deps = mocks.into_deps(ctx.store.clone(), ctx.queue.clone());
    let actor = ctx.user_with_credits(1);
    mocks.scraper.push_profile(sample_profile());
    mocks.ai.push_response(audit_answer(90));

    let audit = audits::start_direct_audit(actor, PROFILE_URL, &deps)
        .await
        .unwrap();
    let runner = pricelist_core::kernel::jobs::JobRunner::new(
        Arc::new(pricelist_core::domains::job_registry()),
        deps.clone(),
    );
    runner.drain().await.unwrap();

    let done = audits::get_audit(actor, audit.id, &deps).await.unwrap();
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(mocks.email.sent().len(), 1);
}

async fn reload(ctx: &TestHarness, audit: &AuditJob) -> AuditJob {
    use pricelist_core::kernel::store::AuditStore;
    ctx.store.find_audit(audit.id).await.unwrap().unwrap()
}
