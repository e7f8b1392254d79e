//! Reactions to confirmed payments.

pub mod models;

pub use models::{Product, PurchaseCompleted, PurchaseEffect, PurchaseOutcome};

use tracing::info;

use crate::common::{PipelineError, PipelineResult};
use crate::kernel::ServerDeps;

fn effect_of(purchase: &PurchaseCompleted) -> PipelineResult<PurchaseEffect> {
    match purchase.product {
        Product::Audit => Ok(PurchaseEffect::CreatePendingAudit),
        Product::Credits { amount } if amount > 0 => Ok(PurchaseEffect::Credit(amount)),
        Product::Credits { amount } => Err(PipelineError::InvalidInput(format!(
            "credit amount must be positive, got {}",
            amount
        ))),
        Product::Optimization => purchase
            .price_list_id
            .map(PurchaseEffect::LinkOptimization)
            .ok_or_else(|| {
                PipelineError::InvalidInput("optimization purchase needs a price list".to_string())
            }),
    }
}

/// Apply a payment confirmation exactly once per purchase id.
///
/// An audit purchase creates a `pending` audit that waits for the profile
/// URL; nothing is scheduled until the owner starts it.
pub async fn handle_purchase_completed(
    purchase: PurchaseCompleted,
    deps: &ServerDeps,
) -> PipelineResult<PurchaseOutcome> {
    let effect = effect_of(&purchase)?;

    if let Some(email) = purchase.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        deps.store.upsert_user(purchase.user_id, email).await?;
    }

    let outcome = deps
        .store
        .apply_purchase(&purchase.purchase_id, purchase.user_id, effect)
        .await?;

    match &outcome {
        PurchaseOutcome::AuditCreated(audit) => {
            info!(purchase_id = %purchase.purchase_id, audit_id = %audit.id, "pending audit created")
        }
        PurchaseOutcome::Credited { balance } => {
            info!(purchase_id = %purchase.purchase_id, user_id = %purchase.user_id, balance, "credits added")
        }
        PurchaseOutcome::OptimizationLinked(job_id) => {
            info!(purchase_id = %purchase.purchase_id, job_id = ?job_id, "purchase linked to optimization")
        }
        PurchaseOutcome::AlreadyProcessed => {
            info!(purchase_id = %purchase.purchase_id, "purchase already processed")
        }
    }
    Ok(outcome)
}
