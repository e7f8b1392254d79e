//! Payment confirmations and the purchased-audit flow.

mod common;

use crate::common::{audit_answer, sample_profile, TestHarness, PROFILE_URL};
use pricelist_core::common::{PipelineError, UserId};
use pricelist_core::domains::audits::{self, AuditStatus};
use pricelist_core::domains::billing::{self, Product, PurchaseCompleted, PurchaseOutcome};
use pricelist_core::kernel::store::{CreditLedger, UserStore};
use pricelist_core::kernel::ScrapeError;
use test_context::test_context;

fn purchase(id: &str, user_id: UserId, product: Product) -> PurchaseCompleted {
    PurchaseCompleted {
        purchase_id: id.to_string(),
        user_id,
        product,
        price_list_id: None,
        email: Some("anna@salon.test".to_string()),
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn audit_purchase_creates_a_pending_audit_once(ctx: &mut TestHarness) {
    let user_id = UserId::new();

    let outcome = billing::handle_purchase_completed(
        purchase("cs_1", user_id, Product::Audit),
        &ctx.deps,
    )
    .await
    .unwrap();
    let PurchaseOutcome::AuditCreated(audit) = outcome else {
        panic!("expected an audit, got {:?}", outcome);
    };
    assert_eq!(audit.status, AuditStatus::Pending);
    assert_eq!(audit.purchase_id.as_deref(), Some("cs_1"));
    assert!(!audit.credit_consumed);

    // Buyer record created from the checkout email
    let user = ctx.store.find_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.email, "anna@salon.test");

    // Nothing runs until the owner supplies a profile URL
    assert!(ctx.queue.jobs().is_empty());

    let replay = billing::handle_purchase_completed(
        purchase("cs_1", user_id, Product::Audit),
        &ctx.deps,
    )
    .await
    .unwrap();
    assert!(matches!(replay, PurchaseOutcome::AlreadyProcessed));
    assert_eq!(ctx.store.audit_count(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn credit_purchase_adds_to_the_balance(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(1);

    let outcome = billing::handle_purchase_completed(
        purchase("cs_2", actor.user_id, Product::Credits { amount: 3 }),
        &ctx.deps,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, PurchaseOutcome::Credited { balance: 4 }));
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 4);

    let invalid = billing::handle_purchase_completed(
        purchase("cs_3", actor.user_id, Product::Credits { amount: 0 }),
        &ctx.deps,
    )
    .await;
    assert!(matches!(invalid, Err(PipelineError::InvalidInput(_))));
    assert_eq!(ctx.store.balance(actor.user_id).await.unwrap(), 4);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn purchased_audit_runs_after_start(ctx: &mut TestHarness) {
    let user_id = UserId::new();
    let PurchaseOutcome::AuditCreated(audit) = billing::handle_purchase_completed(
        purchase("cs_4", user_id, Product::Audit),
        &ctx.deps,
    )
    .await
    .unwrap() else {
        panic!("expected an audit");
    };
    let owner = pricelist_core::common::Actor::user(user_id);
    ctx.mocks.scraper.push_profile(sample_profile());
    ctx.mocks.ai.push_response(audit_answer(66));

    let stranger = ctx.user_with_credits(0);
    let denied = audits::start_audit(stranger, audit.id, PROFILE_URL, &ctx.deps).await;
    assert!(matches!(denied, Err(PipelineError::PermissionDenied(_))));

    let started = audits::start_audit(owner, audit.id, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    assert_eq!(started.status, AuditStatus::Scraping);
    assert_eq!(started.source_url.as_deref(), Some(PROFILE_URL));

    let twice = audits::start_audit(owner, audit.id, PROFILE_URL, &ctx.deps).await;
    assert!(matches!(twice, Err(PipelineError::InvalidState { .. })));

    ctx.settle().await;
    let done = audits::get_audit(owner, audit.id, &ctx.deps).await.unwrap();
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(done.overall_score, Some(66));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failed_purchased_audit_refunds_nothing(ctx: &mut TestHarness) {
    let user_id = UserId::new();
    let PurchaseOutcome::AuditCreated(audit) = billing::handle_purchase_completed(
        purchase("cs_5", user_id, Product::Audit),
        &ctx.deps,
    )
    .await
    .unwrap() else {
        panic!("expected an audit");
    };
    let owner = pricelist_core::common::Actor::user(user_id);
    ctx.mocks
        .scraper
        .push_error(ScrapeError::ProfileNotFound("404".into()));

    audits::start_audit(owner, audit.id, PROFILE_URL, &ctx.deps)
        .await
        .unwrap();
    ctx.settle().await;

    let failed = audits::get_audit(owner, audit.id, &ctx.deps).await.unwrap();
    assert_eq!(failed.status, AuditStatus::Failed);
    assert_eq!(ctx.store.balance(user_id).await.unwrap(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn optimization_purchase_needs_a_price_list(ctx: &mut TestHarness) {
    let actor = ctx.user_with_credits(0);

    let result = billing::handle_purchase_completed(
        purchase("cs_6", actor.user_id, Product::Optimization),
        &ctx.deps,
    )
    .await;

    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
}
