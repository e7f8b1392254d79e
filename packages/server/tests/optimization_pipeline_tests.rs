//! Optimization pipeline: start, model call, merge, retry and failure.

mod common;

use std::time::Duration;

use crate::common::{
    audit_answer, descriptions_answer, sample_profile, small_pricing, truncated_answer,
    TestHarness, PROFILE_URL,
};
use pricelist_core::common::{Actor, PipelineError, PriceListId};
use pricelist_core::domains::analysis::{
    section_marker, CategoryChange, CategoryProposal, OptimizationOption,
};
use pricelist_core::domains::audits::{self, AuditJob, AuditStatus};
use pricelist_core::domains::notifications::{self, FailureCause, NotificationKind};
use pricelist_core::domains::optimization::models::ChangeKind;
use pricelist_core::domains::optimization::{self, OptimizationJob, OptimizationStatus};
use pricelist_core::domains::price_lists::models::NewPriceList;
use pricelist_core::kernel::store::{OptimizationStore, PriceListStore};
use pricelist_core::kernel::jobs::RetryDecision;
use pricelist_core::kernel::AiError;
use serde_json::json;
use test_context::test_context;

/// Runs an audit to completion and returns its pro price list.
async fn audited_price_list(ctx: &TestHarness, actor: Actor) -> PriceListId {
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(70));
    let audit = audits::start_direct_audit(actor, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;
    audits::get_audit(actor, audit.id, &ctx.deps)
        .await
        .unwrap()
        .pro_price_list_id
        .expect("audit produced a pro price list")
}

async fn manual_price_list(ctx: &TestHarness, actor: Actor) -> PriceListId {
    ctx.store
        .create_price_list(NewPriceList::manual(actor.user_id, "Cennik", small_pricing()))
        .await
        .unwrap()
        .id
}

async fn reload(ctx: &TestHarness, job: &OptimizationJob) -> OptimizationJob {
    ctx.store.find_optimization(job.id).await.unwrap().unwrap()
}

async fn count_notifications(ctx: &TestHarness, actor: Actor, kind: NotificationKind) -> usize {
    notifications::list_notifications(actor, &ctx.deps)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == kind)
        .count()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn descriptions_optimization_completes(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);
    let price_list_id = audited_price_list(ctx, actor).await;
    let before = ctx
        .store
        .find_price_list(price_list_id)
        .await
        .unwrap()
        .unwrap();
    ctx.mocks
        .ai
        .push_response(descriptions_answer(&before.pricing_data));

    let job = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Descriptions],
        None,
        &ctx.deps,
    )
    .await
    .unwrap();
    assert_eq!(job.status, OptimizationStatus::Pending);
    // Falls back to the audit that produced the list
    assert!(job.audit_id.is_some());
    assert!(job.audit_context.is_some());

    ctx.settle().await;

    let done = reload(ctx, &job).await;
    assert_eq!(done.status, OptimizationStatus::Completed);
    assert_eq!(done.progress, 100);
    let result = done.optimization_result.unwrap();
    assert_eq!(result.changes_by_kind.get(&ChangeKind::Description), Some(&5));
    assert_eq!(result.changes_by_kind.get(&ChangeKind::Name), None);
    assert_eq!(result.quality_score, 82);

    let after = ctx
        .store
        .find_price_list(price_list_id)
        .await
        .unwrap()
        .unwrap();
    assert!(after.is_optimized);
    assert_eq!(after.optimization_job_id, Some(job.id));
    assert_eq!(Some(after.pricing_data.clone()), done.output_pricing_data);
    assert_eq!(after.original_pricing_data, Some(done.input_pricing_data.clone()));
    assert_eq!(after.original_pricing_data, Some(before.pricing_data.clone()));
    assert_eq!(after.pricing_data.services_count(), 5);
    let manicure = &after.pricing_data.categories[1].services[0];
    assert_eq!(manicure.price, "od 100 zł");
    assert_eq!(manicure.variants.as_ref().map(Vec::len), Some(2));
    assert_eq!(
        manicure.description.as_deref(),
        Some("Manicure hybrydowy w przyjaznej atmosferze.")
    );

    assert_eq!(
        count_notifications(ctx, actor, NotificationKind::OptimizationStarted).await,
        1
    );
    assert_eq!(
        count_notifications(ctx, actor, NotificationKind::OptimizationCompleted).await,
        1
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn one_active_optimization_per_price_list(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;

    optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Seo],
        None,
        &ctx.deps,
    )
    .await
    .unwrap();

    let second = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Prices],
        None,
        &ctx.deps,
    )
    .await;
    assert!(matches!(
        second,
        Err(PipelineError::ActiveJobExists("optimization"))
    ));

    let active = optimization::active_optimization(actor, price_list_id, &ctx.deps)
        .await
        .unwrap();
    assert!(active.is_some());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invalid_selections_are_rejected_before_writing(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;

    let empty = optimization::start_optimization(actor, price_list_id, &[], None, &ctx.deps).await;
    assert!(matches!(empty, Err(PipelineError::InvalidInput(_))));

    // No audit, so no category proposal
    let categories = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Categories],
        None,
        &ctx.deps,
    )
    .await;
    assert!(matches!(categories, Err(PipelineError::InvalidInput(_))));

    let stranger = ctx.user_with_credits(0);
    let foreign = optimization::start_optimization(
        stranger,
        price_list_id,
        &[OptimizationOption::Seo],
        None,
        &ctx.deps,
    )
    .await;
    assert!(matches!(foreign, Err(PipelineError::PermissionDenied(_))));

    assert!(optimization::active_optimization(actor, price_list_id, &ctx.deps)
        .await
        .unwrap()
        .is_none());
    assert!(ctx.queue.jobs().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn transient_model_errors_retry_then_fail_once(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;
    for _ in 0..4 {
        ctx.mocks.ai.push_error(AiError::Timeout);
    }

    let job = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Seo],
        None,
        &ctx.deps,
    )
    .await
    .unwrap();

    ctx.settle().await;
    let current = reload(ctx, &job).await;
    assert_eq!(current.status, OptimizationStatus::Processing);
    assert_eq!(current.retry_count, 1);

    for delay in [30, 120, 300] {
        ctx.advance_and_settle(Duration::from_secs(delay)).await;
    }

    let failed = reload(ctx, &job).await;
    assert_eq!(failed.status, OptimizationStatus::Failed);
    assert_eq!(ctx.mocks.ai.call_count(), 4);
    assert!(failed.error_message.is_some());

    let failures = notifications::list_notifications(actor, &ctx.deps)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::OptimizationFailed)
        .count();
    assert_eq!(failures, 1);

    // The price list is untouched
    let list = ctx
        .store
        .find_price_list(price_list_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!list.is_optimized);
    assert_eq!(list.pricing_data, small_pricing());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn missing_entries_fail_without_retry(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;
    ctx.mocks.ai.push_response(truncated_answer(&small_pricing()));

    let job = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Descriptions],
        None,
        &ctx.deps,
    )
    .await
    .unwrap();
    ctx.settle().await;

    let failed = reload(ctx, &job).await;
    assert_eq!(failed.status, OptimizationStatus::Failed);
    assert_eq!(failed.retry_count, 0);
    assert_eq!(ctx.mocks.ai.call_count(), 1);
    assert!(failed.output_pricing_data.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn prompt_uses_the_selected_options(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;
    ctx.mocks.ai.push_response(descriptions_answer(&small_pricing()));

    optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Descriptions, OptimizationOption::Seo],
        None,
        &ctx.deps,
    )
    .await
    .unwrap();
    ctx.settle().await;

    let calls = ctx.mocks.ai.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].options.json);
    assert!(calls[0].prompt.contains("Strzyżenie damskie"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn giving_up_fails_a_retried_job_on_the_first_call(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;
    ctx.mocks.ai.push_error(AiError::Timeout);

    let job = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Seo],
        None,
        &ctx.deps,
    )
    .await
    .unwrap();
    ctx.settle().await;
    let retrying = reload(ctx, &job).await;
    assert_eq!(retrying.status, OptimizationStatus::Processing);
    assert_eq!(retrying.retry_count, 1);

    let failed = optimization::fail_job(
        &retrying,
        "model refused the request".to_string(),
        FailureCause::ModelOutput,
        RetryDecision::give_up(),
        &ctx.deps,
    )
    .await
    .unwrap()
    .expect("job was still processing");
    assert_eq!(failed.status, OptimizationStatus::Failed);
    assert_eq!(failed.retry_count, 1);
    assert_eq!(
        count_notifications(ctx, actor, NotificationKind::OptimizationFailed).await,
        1
    );

    // The retry scheduled before the failure finds a terminal job
    ctx.advance_and_settle(Duration::from_secs(30)).await;
    assert_eq!(reload(ctx, &job).await.status, OptimizationStatus::Failed);
    assert_eq!(ctx.mocks.ai.call_count(), 1);
    assert_eq!(
        count_notifications(ctx, actor, NotificationKind::OptimizationFailed).await,
        1
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn categories_option_sends_the_proposal_and_regroups(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);
    let price_list_id = manual_price_list(ctx, actor).await;
    let audit = AuditJob::builder()
        .user_id(actor.user_id)
        .status(AuditStatus::Completed)
        .source_url(PROFILE_URL)
        .salon_name("Studio Fryzur")
        .category_proposal(CategoryProposal {
            changes: vec![CategoryChange::CreateCategory {
                name: "Stylizacja".to_string(),
                services: vec!["Modelowanie".to_string()],
                rationale: "Stylizacja to osobna usługa".to_string(),
            }],
            based_on: vec!["Fryzjer".to_string()],
        })
        .build();
    ctx.store.put_audit(audit.clone());
    ctx.mocks.ai.push_response(
        json!({
            "services": [
                { "index": 1, "category": "Stylizacja" },
                { "index": 0, "category": "Fryzjer" }
            ],
            "qualityScore": 75
        })
        .to_string(),
    );

    let job = optimization::start_optimization(
        actor,
        price_list_id,
        &[OptimizationOption::Categories],
        Some(audit.id),
        &ctx.deps,
    )
    .await
    .unwrap();
    ctx.settle().await;

    let prompt = ctx.mocks.ai.last_prompt().unwrap();
    assert!(prompt.contains(section_marker(OptimizationOption::Categories)));
    assert!(prompt.contains("Create category \"Stylizacja\" for: Modelowanie"));

    let done = reload(ctx, &job).await;
    assert_eq!(done.status, OptimizationStatus::Completed);
    let result = done.optimization_result.unwrap();
    assert_eq!(result.changes_by_kind.get(&ChangeKind::Category), Some(&1));

    let after = ctx
        .store
        .find_price_list(price_list_id)
        .await
        .unwrap()
        .unwrap();
    let layout: Vec<(&str, Vec<&str>)> = after
        .pricing_data
        .categories
        .iter()
        .map(|c| {
            (
                c.name.as_str(),
                c.services.iter().map(|s| s.name.as_str()).collect(),
            )
        })
        .collect();
    assert_eq!(
        layout,
        vec![
            ("Stylizacja", vec!["Modelowanie"]),
            ("Fryzjer", vec!["Strzyżenie damskie"]),
        ]
    );
    assert_eq!(after.original_pricing_data, Some(small_pricing()));
}
