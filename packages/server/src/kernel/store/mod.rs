//! Durable records for users, credits, jobs, price lists and notifications.
//!
//! Every trait method is one atomic unit. Multi-record side effects (debit +
//! insert, completion + derived price lists + notification) are single
//! methods so an implementation can run them inside one transaction or one
//! lock acquisition.
//!
//! Status transitions go through a [`TransitionGuard`]: the write only lands
//! when the record's current status (and, if given, retry count) still
//! matches at write time. A mismatch returns `Ok(None)` and leaves the record
//! untouched.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::common::{AuditJobId, OptimizationJobId, PriceListId, PricingData, UserId};
use crate::domains::analysis::{CategoryProposal, KeywordReport, OptimizationOption};
use crate::domains::audits::models::{
    AuditJob, AuditPatch, AuditReport, AuditStatus, NewAuditJob, ScrapedProfile,
};
use crate::domains::billing::models::{PurchaseEffect, PurchaseOutcome};
use crate::domains::notifications::models::{NewNotification, Notification};
use crate::domains::optimization::models::{
    NewOptimizationJob, OptimizationJob, OptimizationPatch, OptimizationResult,
    OptimizationStatus, PromptTemplate,
};
use crate::domains::price_lists::{NewPriceList, PriceList};
use crate::domains::users::User;

/// Same-URL submissions by one user within this window are rejected.
pub const DUPLICATE_WINDOW_SECS: i64 = 5 * 60;

// =============================================================================
// Errors
// =============================================================================

/// Creation rejected by a capacity rule. Nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("user already has an active audit")]
    ActiveAuditExists,

    #[error("price list already has an active optimization")]
    ActiveOptimizationExists,

    #[error("same profile submitted within the last 5 minutes")]
    DuplicateSubmission,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Transition guard
// =============================================================================

/// Expected source state of a guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionGuard<S> {
    pub statuses: Vec<S>,
    pub retry_count: Option<i32>,
}

impl<S: Copy + PartialEq> TransitionGuard<S> {
    pub fn from_statuses(statuses: &[S]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            retry_count: None,
        }
    }

    pub fn from_status(status: S) -> Self {
        Self::from_statuses(&[status])
    }

    /// Also require the record's retry count, so two scheduled attempts for
    /// the same step cannot both win.
    pub fn at_attempt(mut self, retry_count: i32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn allows(&self, status: S, retry_count: i32) -> bool {
        self.statuses.contains(&status) && self.retry_count.map_or(true, |r| r == retry_count)
    }
}

pub type AuditGuard = TransitionGuard<AuditStatus>;
pub type OptimizationGuard = TransitionGuard<OptimizationStatus>;

// =============================================================================
// Operation inputs
// =============================================================================

/// Successful scrape: the snapshot plus the name of the base price list.
#[derive(Debug, Clone)]
pub struct ScrapeCommit {
    pub profile: ScrapedProfile,
    pub base_list_name: String,
    pub progress_message: String,
}

#[derive(Debug, Clone)]
pub struct AuditCompletion {
    pub report: AuditReport,
    pub keyword_report: KeywordReport,
    pub category_proposal: CategoryProposal,
    /// Name for the optimizable copy of the base list.
    pub pro_list_name: String,
    pub notification: NewNotification,
}

#[derive(Debug, Clone)]
pub struct AuditFailure {
    pub error_message: String,
    /// Return the consumed credit, if any, to the owner.
    pub refund: bool,
    pub notification: NewNotification,
}

#[derive(Debug, Clone)]
pub struct OptimizationCompletion {
    pub output: PricingData,
    pub result: OptimizationResult,
    pub notification: NewNotification,
}

#[derive(Debug, Clone)]
pub struct OptimizationFailure {
    pub error_message: String,
    pub notification: NewNotification,
}

// =============================================================================
// Traits
// =============================================================================

#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically takes one credit. `false` when the balance is zero.
    async fn debit(&self, user_id: UserId) -> StoreResult<bool>;

    /// Adds credits unconditionally and returns the new balance.
    async fn credit(&self, user_id: UserId, amount: i32) -> StoreResult<i32>;

    async fn balance(&self, user_id: UserId) -> StoreResult<i32>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user on first sight; updates the email otherwise.
    async fn upsert_user(&self, user_id: UserId, email: &str) -> StoreResult<User>;

    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Inserts a job, rejecting with a [`CapacityError`] when the user has an
    /// active audit, submitted the same URL recently, or (when
    /// `consume_credit`) has no credits.
    async fn create_audit(&self, new: NewAuditJob) -> StoreResult<AuditJob>;

    async fn find_audit(&self, id: AuditJobId) -> StoreResult<Option<AuditJob>>;

    /// Newest first.
    async fn list_audits_for_user(&self, user_id: UserId) -> StoreResult<Vec<AuditJob>>;

    async fn active_audit_for_user(&self, user_id: UserId) -> StoreResult<Option<AuditJob>>;

    async fn update_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        patch: AuditPatch,
    ) -> StoreResult<Option<AuditJob>>;

    /// Stores the scraped snapshot, creates the base price list and moves the
    /// job to `analyzing`.
    async fn commit_scrape(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        commit: ScrapeCommit,
    ) -> StoreResult<Option<(AuditJob, PriceList)>>;

    /// Marks the job `completed`, creates the pro price list when a base list
    /// exists, links both ways and inserts the notification.
    async fn complete_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        completion: AuditCompletion,
    ) -> StoreResult<Option<AuditJob>>;

    /// Marks the job `failed`, optionally refunding its credit.
    async fn fail_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        failure: AuditFailure,
    ) -> StoreResult<Option<AuditJob>>;
}

#[async_trait]
pub trait OptimizationStore: Send + Sync {
    /// Inserts a job together with its "started" notification, rejecting
    /// when the price list has an active optimization.
    async fn create_optimization(
        &self,
        new: NewOptimizationJob,
        started: NewNotification,
    ) -> StoreResult<OptimizationJob>;

    async fn find_optimization(&self, id: OptimizationJobId)
        -> StoreResult<Option<OptimizationJob>>;

    async fn active_optimization_for_price_list(
        &self,
        price_list_id: PriceListId,
    ) -> StoreResult<Option<OptimizationJob>>;

    async fn update_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        patch: OptimizationPatch,
    ) -> StoreResult<Option<OptimizationJob>>;

    /// Marks the job `completed`, overwrites the price list (keeping the
    /// input snapshot as its original) and inserts the notification.
    async fn complete_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        completion: OptimizationCompletion,
    ) -> StoreResult<Option<OptimizationJob>>;

    async fn fail_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        failure: OptimizationFailure,
    ) -> StoreResult<Option<OptimizationJob>>;
}

#[async_trait]
pub trait PriceListStore: Send + Sync {
    async fn create_price_list(&self, new: NewPriceList) -> StoreResult<PriceList>;

    async fn find_price_list(&self, id: PriceListId) -> StoreResult<Option<PriceList>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Newest first.
    async fn list_notifications(&self, user_id: UserId) -> StoreResult<Vec<Notification>>;
}

#[async_trait]
pub trait PromptTemplateStore: Send + Sync {
    /// Active templates for the given options.
    async fn templates_for(&self, options: &[OptimizationOption])
        -> StoreResult<Vec<PromptTemplate>>;

    async fn upsert_prompt_template(&self, template: PromptTemplate) -> StoreResult<()>;
}

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Records `purchase_id` and applies `effect` in one unit. A purchase id
    /// seen before yields [`PurchaseOutcome::AlreadyProcessed`].
    async fn apply_purchase(
        &self,
        purchase_id: &str,
        user_id: UserId,
        effect: PurchaseEffect,
    ) -> StoreResult<PurchaseOutcome>;
}

/// Everything the pipelines need from persistence.
pub trait Store:
    CreditLedger
    + UserStore
    + AuditStore
    + OptimizationStore
    + PriceListStore
    + NotificationStore
    + PromptTemplateStore
    + PurchaseStore
{
}

impl<T> Store for T where
    T: CreditLedger
        + UserStore
        + AuditStore
        + OptimizationStore
        + PriceListStore
        + NotificationStore
        + PromptTemplateStore
        + PurchaseStore
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_checks_status_and_attempt() {
        let guard = AuditGuard::from_statuses(&[AuditStatus::Scraping, AuditStatus::ScrapingRetry])
            .at_attempt(1);
        assert!(guard.allows(AuditStatus::ScrapingRetry, 1));
        assert!(!guard.allows(AuditStatus::ScrapingRetry, 2));
        assert!(!guard.allows(AuditStatus::Analyzing, 1));

        let any_attempt = AuditGuard::from_status(AuditStatus::Pending);
        assert!(any_attempt.allows(AuditStatus::Pending, 7));
    }
}
