//! In-memory store for tests and local development.
//!
//! All state sits behind one lock; each trait method takes it once, which
//! makes every operation a single atomic unit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    AuditCompletion, AuditFailure, AuditGuard, AuditStore, CapacityError, CreditLedger,
    NotificationStore, OptimizationCompletion, OptimizationFailure, OptimizationGuard,
    OptimizationStore, PriceListStore, PromptTemplateStore, PurchaseStore, ScrapeCommit,
    StoreError, StoreResult, UserStore, DUPLICATE_WINDOW_SECS,
};
use crate::common::{AuditJobId, OptimizationJobId, PriceListId, UserId};
use crate::domains::analysis::OptimizationOption;
use crate::domains::audits::models::{AuditJob, AuditPatch, AuditStatus, NewAuditJob};
use crate::domains::billing::models::{PurchaseEffect, PurchaseOutcome};
use crate::domains::notifications::models::{NewNotification, Notification};
use crate::domains::optimization::models::{
    NewOptimizationJob, OptimizationJob, OptimizationPatch, PromptTemplate,
};
use crate::domains::price_lists::{NewPriceList, PriceList, PriceListSource};
use crate::domains::users::User;

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    audits: HashMap<AuditJobId, AuditJob>,
    optimizations: HashMap<OptimizationJobId, OptimizationJob>,
    price_lists: HashMap<PriceListId, PriceList>,
    notifications: Vec<Notification>,
    templates: HashMap<OptimizationOption, PromptTemplate>,
    purchases: HashSet<String>,
}

impl State {
    fn insert_audit(&mut self, new: NewAuditJob, now: DateTime<Utc>) -> StoreResult<AuditJob> {
        let user_id = new.user_id;
        let mine = || self.audits.values().filter(move |a| a.user_id == user_id);

        if mine().any(|a| a.is_active()) {
            return Err(CapacityError::ActiveAuditExists.into());
        }
        if let Some(url) = &new.source_url {
            let window_start = now - Duration::seconds(DUPLICATE_WINDOW_SECS);
            if mine().any(|a| a.source_url.as_ref() == Some(url) && a.created_at > window_start) {
                return Err(CapacityError::DuplicateSubmission.into());
            }
        }
        if new.consume_credit {
            let user = self
                .users
                .get_mut(&new.user_id)
                .filter(|u| u.credits > 0)
                .ok_or(CapacityError::InsufficientCredits)?;
            user.credits -= 1;
        }

        let job = new.into_job(now);
        self.audits.insert(job.id, job.clone());
        Ok(job)
    }

    fn insert_price_list(&mut self, new: NewPriceList, now: DateTime<Utc>) -> PriceList {
        let list = new.into_price_list(now);
        self.price_lists.insert(list.id, list.clone());
        list
    }

    fn notify(&mut self, notification: NewNotification, now: DateTime<Utc>) {
        self.notifications.push(notification.into_notification(now));
    }

    /// The audit if it exists and the guard allows the write.
    fn guarded_audit(
        &mut self,
        id: AuditJobId,
        guard: &AuditGuard,
    ) -> StoreResult<Option<&mut AuditJob>> {
        let job = self
            .audits
            .get_mut(&id)
            .ok_or(StoreError::NotFound("audit"))?;
        Ok(guard.allows(job.status, job.retry_count).then_some(job))
    }

    fn guarded_optimization(
        &mut self,
        id: OptimizationJobId,
        guard: &OptimizationGuard,
    ) -> StoreResult<Option<&mut OptimizationJob>> {
        let job = self
            .optimizations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("optimization job"))?;
        Ok(guard.allows(job.status, job.retry_count).then_some(job))
    }
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap()
    }

    /// Seeds a user with a credit balance.
    pub fn insert_user(&self, user_id: UserId, email: &str, credits: i32) -> User {
        let user = User {
            id: user_id,
            email: email.to_string(),
            credits,
            is_admin: false,
            created_at: Utc::now(),
        };
        self.write().users.insert(user_id, user.clone());
        user
    }

    /// Overwrites a stored audit. Test setup only.
    pub fn put_audit(&self, job: AuditJob) {
        self.write().audits.insert(job.id, job);
    }

    pub fn audit_count(&self) -> usize {
        self.read().audits.len()
    }

    pub fn price_list_count(&self) -> usize {
        self.read().price_lists.len()
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn debit(&self, user_id: UserId) -> StoreResult<bool> {
        let mut state = self.write();
        match state.users.get_mut(&user_id) {
            Some(user) if user.credits > 0 => {
                user.credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit(&self, user_id: UserId, amount: i32) -> StoreResult<i32> {
        let mut state = self.write();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound("user"))?;
        user.credits += amount;
        Ok(user.credits)
    }

    async fn balance(&self, user_id: UserId) -> StoreResult<i32> {
        Ok(self.read().users.get(&user_id).map_or(0, |u| u.credits))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_user(&self, user_id: UserId, email: &str) -> StoreResult<User> {
        let mut state = self.write();
        let user = state.users.entry(user_id).or_insert_with(|| User {
            id: user_id,
            email: email.to_string(),
            credits: 0,
            is_admin: false,
            created_at: Utc::now(),
        });
        user.email = email.to_string();
        Ok(user.clone())
    }

    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(&user_id).cloned())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn create_audit(&self, new: NewAuditJob) -> StoreResult<AuditJob> {
        self.write().insert_audit(new, Utc::now())
    }

    async fn find_audit(&self, id: AuditJobId) -> StoreResult<Option<AuditJob>> {
        Ok(self.read().audits.get(&id).cloned())
    }

    async fn list_audits_for_user(&self, user_id: UserId) -> StoreResult<Vec<AuditJob>> {
        let mut audits: Vec<AuditJob> = self
            .read()
            .audits
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        audits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(audits)
    }

    async fn active_audit_for_user(&self, user_id: UserId) -> StoreResult<Option<AuditJob>> {
        Ok(self
            .read()
            .audits
            .values()
            .find(|a| a.user_id == user_id && a.is_active())
            .cloned())
    }

    async fn update_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        patch: AuditPatch,
    ) -> StoreResult<Option<AuditJob>> {
        let mut state = self.write();
        let Some(job) = state.guarded_audit(id, &guard)? else {
            return Ok(None);
        };
        patch.apply(job, Utc::now());
        Ok(Some(job.clone()))
    }

    async fn commit_scrape(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        commit: ScrapeCommit,
    ) -> StoreResult<Option<(AuditJob, PriceList)>> {
        let now = Utc::now();
        let mut state = self.write();
        let Some(job) = state.guarded_audit(id, &guard)? else {
            return Ok(None);
        };
        let user_id = job.user_id;
        let existing = job.base_price_list_id;
        let pricing_data = commit.profile.pricing_data();

        // A repeated scrape refreshes the audit's base list in place.
        let base = match existing.filter(|base_id| state.price_lists.contains_key(base_id)) {
            Some(base_id) => {
                let base = state
                    .price_lists
                    .get_mut(&base_id)
                    .ok_or(StoreError::NotFound("price list"))?;
                base.refresh_import(pricing_data, now);
                base.clone()
            }
            None => state.insert_price_list(
                NewPriceList {
                    user_id,
                    name: commit.base_list_name,
                    source: PriceListSource::Booksy,
                    pricing_data,
                    audit_id: Some(id),
                    quality_score: None,
                },
                now,
            ),
        };

        let job = state
            .audits
            .get_mut(&id)
            .ok_or(StoreError::NotFound("audit"))?;
        job.record_scrape(commit.profile, base.id, commit.progress_message, now);

        Ok(Some((job.clone(), base)))
    }

    async fn complete_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        completion: AuditCompletion,
    ) -> StoreResult<Option<AuditJob>> {
        let now = Utc::now();
        let mut state = self.write();
        let Some(job) = state.guarded_audit(id, &guard)? else {
            return Ok(None);
        };
        let user_id = job.user_id;
        let base_id = job.base_price_list_id;
        let score = completion.report.overall_score;

        let base_data = base_id
            .and_then(|base_id| state.price_lists.get(&base_id))
            .map(|base| base.pricing_data.clone());
        let pro = base_data.map(|pricing_data| {
            state.insert_price_list(
                NewPriceList {
                    user_id,
                    name: completion.pro_list_name,
                    source: PriceListSource::Audit,
                    pricing_data,
                    audit_id: Some(id),
                    quality_score: Some(score),
                },
                now,
            )
        });

        if let (Some(base_id), Some(pro)) = (base_id, &pro) {
            if let Some(base) = state.price_lists.get_mut(&base_id) {
                base.optimized_version_id = Some(pro.id);
                base.updated_at = now;
            }
        }

        state.notify(completion.notification, now);

        let job = state
            .audits
            .get_mut(&id)
            .ok_or(StoreError::NotFound("audit"))?;
        job.record_completion(
            completion.report,
            completion.keyword_report,
            completion.category_proposal,
            pro.map(|p| p.id),
            now,
        );

        Ok(Some(job.clone()))
    }

    async fn fail_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        failure: AuditFailure,
    ) -> StoreResult<Option<AuditJob>> {
        let now = Utc::now();
        let mut state = self.write();
        let Some(job) = state.guarded_audit(id, &guard)? else {
            return Ok(None);
        };
        let user_id = job.user_id;
        let refund = job.record_failure(failure.error_message, failure.refund, now);
        let job = job.clone();

        if refund {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.credits += 1;
            }
        }
        state.notify(failure.notification, now);

        Ok(Some(job))
    }
}

#[async_trait]
impl OptimizationStore for MemoryStore {
    async fn create_optimization(
        &self,
        new: NewOptimizationJob,
        started: NewNotification,
    ) -> StoreResult<OptimizationJob> {
        let now = Utc::now();
        let mut state = self.write();
        if state
            .optimizations
            .values()
            .any(|o| o.price_list_id == new.price_list_id && o.is_active())
        {
            return Err(CapacityError::ActiveOptimizationExists.into());
        }

        let job = new.into_job(now);
        state.optimizations.insert(job.id, job.clone());
        state.notify(started, now);
        Ok(job)
    }

    async fn find_optimization(
        &self,
        id: OptimizationJobId,
    ) -> StoreResult<Option<OptimizationJob>> {
        Ok(self.read().optimizations.get(&id).cloned())
    }

    async fn active_optimization_for_price_list(
        &self,
        price_list_id: PriceListId,
    ) -> StoreResult<Option<OptimizationJob>> {
        Ok(self
            .read()
            .optimizations
            .values()
            .find(|o| o.price_list_id == price_list_id && o.is_active())
            .cloned())
    }

    async fn update_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        patch: OptimizationPatch,
    ) -> StoreResult<Option<OptimizationJob>> {
        let mut state = self.write();
        let Some(job) = state.guarded_optimization(id, &guard)? else {
            return Ok(None);
        };
        patch.apply(job, Utc::now());
        Ok(Some(job.clone()))
    }

    async fn complete_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        completion: OptimizationCompletion,
    ) -> StoreResult<Option<OptimizationJob>> {
        let now = Utc::now();
        let mut state = self.write();
        let Some(job) = state.guarded_optimization(id, &guard)? else {
            return Ok(None);
        };
        let price_list_id = job.price_list_id;
        let input = job.input_pricing_data.clone();
        if !state.price_lists.contains_key(&price_list_id) {
            return Err(StoreError::NotFound("price list"));
        }

        let quality_score = completion.result.quality_score;
        let job = state
            .optimizations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("optimization job"))?;
        job.record_completion(completion.output.clone(), completion.result, now);
        let job = job.clone();

        if let Some(list) = state.price_lists.get_mut(&price_list_id) {
            list.apply_optimization(id, input, completion.output, quality_score, now);
        }
        state.notify(completion.notification, now);

        Ok(Some(job))
    }

    async fn fail_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        failure: OptimizationFailure,
    ) -> StoreResult<Option<OptimizationJob>> {
        let now = Utc::now();
        let mut state = self.write();
        let Some(job) = state.guarded_optimization(id, &guard)? else {
            return Ok(None);
        };
        job.record_failure(failure.error_message, now);
        let job = job.clone();

        state.notify(failure.notification, now);
        Ok(Some(job))
    }
}

#[async_trait]
impl PriceListStore for MemoryStore {
    async fn create_price_list(&self, new: NewPriceList) -> StoreResult<PriceList> {
        Ok(self.write().insert_price_list(new, Utc::now()))
    }

    async fn find_price_list(&self, id: PriceListId) -> StoreResult<Option<PriceList>> {
        Ok(self.read().price_lists.get(&id).cloned())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn list_notifications(&self, user_id: UserId) -> StoreResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.reverse();
        Ok(notifications)
    }
}

#[async_trait]
impl PromptTemplateStore for MemoryStore {
    async fn templates_for(
        &self,
        options: &[OptimizationOption],
    ) -> StoreResult<Vec<PromptTemplate>> {
        Ok(self
            .read()
            .templates
            .values()
            .filter(|t| t.active && options.contains(&t.option))
            .cloned()
            .collect())
    }

    async fn upsert_prompt_template(&self, template: PromptTemplate) -> StoreResult<()> {
        self.write().templates.insert(template.option, template);
        Ok(())
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn apply_purchase(
        &self,
        purchase_id: &str,
        user_id: UserId,
        effect: PurchaseEffect,
    ) -> StoreResult<PurchaseOutcome> {
        let now = Utc::now();
        let mut state = self.write();
        if state.purchases.contains(purchase_id) {
            return Ok(PurchaseOutcome::AlreadyProcessed);
        }

        let outcome = match effect {
            PurchaseEffect::CreatePendingAudit => {
                let job = state.insert_audit(
                    NewAuditJob::pending(user_id, Some(purchase_id.to_string())),
                    now,
                )?;
                PurchaseOutcome::AuditCreated(job)
            }
            PurchaseEffect::Credit(amount) => {
                let user = state
                    .users
                    .get_mut(&user_id)
                    .ok_or(StoreError::NotFound("user"))?;
                user.credits += amount;
                PurchaseOutcome::Credited {
                    balance: user.credits,
                }
            }
            PurchaseEffect::LinkOptimization(price_list_id) => {
                let latest = state
                    .optimizations
                    .values_mut()
                    .filter(|o| o.price_list_id == price_list_id && o.user_id == user_id)
                    .max_by_key(|o| o.created_at);
                let linked = latest.map(|job| {
                    job.purchase_id = Some(purchase_id.to_string());
                    job.updated_at = now;
                    job.id
                });
                PurchaseOutcome::OptimizationLinked(linked)
            }
        };

        state.purchases.insert(purchase_id.to_string());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PricingData;
    use crate::domains::notifications::models::NotificationKind;

    fn notification(user_id: UserId, kind: NotificationKind) -> NewNotification {
        NewNotification {
            user_id,
            kind,
            title: "t".into(),
            message: "m".into(),
            link: None,
        }
    }

    #[tokio::test]
    async fn test_debit_never_goes_negative() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_user(user, "a@example.com", 1);

        assert!(store.debit(user).await.unwrap());
        assert!(!store.debit(user).await.unwrap());
        assert_eq!(store.balance(user).await.unwrap(), 0);
        assert!(!store.debit(UserId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_active_audit_per_user() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_user(user, "a@example.com", 5);

        let first = store
            .create_audit(NewAuditJob::direct(user, "https://booksy.com/a"))
            .await
            .unwrap();
        let err = store
            .create_audit(NewAuditJob::direct(user, "https://booksy.com/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Capacity(CapacityError::ActiveAuditExists)));
        assert_eq!(store.balance(user).await.unwrap(), 4);

        store
            .fail_audit(
                first.id,
                AuditGuard::from_statuses(&AuditStatus::ACTIVE),
                AuditFailure {
                    error_message: "x".into(),
                    refund: false,
                    notification: notification(user, NotificationKind::System),
                },
            )
            .await
            .unwrap()
            .unwrap();

        store
            .create_audit(NewAuditJob::direct(user, "https://booksy.com/b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_url_within_window() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_user(user, "a@example.com", 5);

        let mut first = NewAuditJob::direct(user, "https://booksy.com/a").into_job(Utc::now());
        first.status = AuditStatus::Failed;
        store.put_audit(first);

        let err = store
            .create_audit(NewAuditJob::direct(user, "https://booksy.com/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Capacity(CapacityError::DuplicateSubmission)));
        // Rejected before the debit.
        assert_eq!(store.balance(user).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_insufficient_credits_creates_nothing() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_user(user, "a@example.com", 0);

        let err = store
            .create_audit(NewAuditJob::direct(user, "https://booksy.com/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Capacity(CapacityError::InsufficientCredits)));
        assert_eq!(store.audit_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_mismatch_leaves_record() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let job = store
            .create_audit(NewAuditJob::pending(user, None))
            .await
            .unwrap();

        let result = store
            .update_audit(
                job.id,
                AuditGuard::from_status(AuditStatus::Analyzing),
                AuditPatch::builder().status(AuditStatus::Completed).build(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        let stored = store.find_audit(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AuditStatus::Pending);
    }

    #[tokio::test]
    async fn test_refund_only_once() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_user(user, "a@example.com", 1);
        let job = store
            .create_audit(NewAuditJob::direct(user, "https://booksy.com/a"))
            .await
            .unwrap();

        let failed = store
            .fail_audit(
                job.id,
                AuditGuard::from_statuses(&AuditStatus::ACTIVE),
                AuditFailure {
                    error_message: "stopped".into(),
                    refund: true,
                    notification: notification(user, NotificationKind::System),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!failed.credit_consumed);
        assert_eq!(store.balance(user).await.unwrap(), 1);

        let again = store
            .fail_audit(
                job.id,
                AuditGuard::from_statuses(&AuditStatus::ACTIVE),
                AuditFailure {
                    error_message: "stopped".into(),
                    refund: true,
                    notification: notification(user, NotificationKind::System),
                },
            )
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(store.balance(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purchase_redelivery_is_noop() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_user(user, "a@example.com", 0);

        let first = store
            .apply_purchase("cs_1", user, PurchaseEffect::Credit(3))
            .await
            .unwrap();
        assert!(matches!(first, PurchaseOutcome::Credited { balance: 3 }));

        let second = store
            .apply_purchase("cs_1", user, PurchaseEffect::Credit(3))
            .await
            .unwrap();
        assert!(matches!(second, PurchaseOutcome::AlreadyProcessed));
        assert_eq!(store.balance(user).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_one_active_optimization_per_price_list() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let list = store
            .create_price_list(NewPriceList::manual(user, "Cennik", PricingData::default()))
            .await
            .unwrap();
        let new = || NewOptimizationJob {
            user_id: user,
            price_list_id: list.id,
            audit_id: None,
            options: vec![OptimizationOption::Seo],
            input_pricing_data: PricingData::default(),
            audit_context: None,
        };

        store
            .create_optimization(new(), notification(user, NotificationKind::OptimizationStarted))
            .await
            .unwrap();
        let err = store
            .create_optimization(new(), notification(user, NotificationKind::OptimizationStarted))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Capacity(CapacityError::ActiveOptimizationExists)
        ));
        assert_eq!(store.list_notifications(user).await.unwrap().len(), 1);
    }
}
