use serde::{Deserialize, Serialize};

use crate::common::{OptimizationJobId, PriceListId, UserId};
use crate::domains::audits::models::AuditJob;

/// What the customer paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Product {
    Audit,
    Credits { amount: i32 },
    Optimization,
}

/// Payment confirmation delivered by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseCompleted {
    pub purchase_id: String,
    pub user_id: UserId,
    pub product: Product,
    #[serde(default)]
    pub price_list_id: Option<PriceListId>,
    /// Buyer email from checkout; creates or refreshes the user record.
    #[serde(default)]
    pub email: Option<String>,
}

/// Store-level effect of a purchase, applied together with recording the
/// purchase id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseEffect {
    CreatePendingAudit,
    Credit(i32),
    LinkOptimization(PriceListId),
}

#[derive(Debug, Clone)]
pub enum PurchaseOutcome {
    AuditCreated(AuditJob),
    Credited { balance: i32 },
    /// The most recent optimization of the price list, if there is one.
    OptimizationLinked(Option<OptimizationJobId>),
    AlreadyProcessed,
}
