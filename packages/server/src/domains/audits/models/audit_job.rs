use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

use crate::common::{AuditJobId, PriceListId, UserId};
use crate::domains::analysis::{CategoryProposal, KeywordReport};

use super::report::AuditReport;
use super::scraped_profile::ScrapedProfile;

// ============================================================================
// Status
// ============================================================================

/// Audit lifecycle.
///
/// The legacy tag `processing` is accepted on input and normalized to
/// `Scraping` before any transition logic sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    #[default]
    Pending,
    #[serde(alias = "processing")]
    Scraping,
    ScrapingRetry,
    Analyzing,
    Completed,
    Failed,
}

impl AuditStatus {
    pub const ACTIVE: [AuditStatus; 4] = [
        AuditStatus::Pending,
        AuditStatus::Scraping,
        AuditStatus::ScrapingRetry,
        AuditStatus::Analyzing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Scraping => "scraping",
            AuditStatus::ScrapingRetry => "scraping_retry",
            AuditStatus::Analyzing => "analyzing",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditStatus::Completed | AuditStatus::Failed)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "scraping" | "processing" => Ok(AuditStatus::Scraping),
            "scraping_retry" => Ok(AuditStatus::ScrapingRetry),
            "analyzing" => Ok(AuditStatus::Analyzing),
            "completed" => Ok(AuditStatus::Completed),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status: {}", other)),
        }
    }
}

// ============================================================================
// Audit job
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct AuditJob {
    #[builder(default = AuditJobId::new())]
    pub id: AuditJobId,
    pub user_id: UserId,
    #[builder(default, setter(strip_option))]
    pub purchase_id: Option<String>,

    #[builder(default)]
    pub status: AuditStatus,
    #[builder(default, setter(strip_option))]
    pub source_url: Option<String>,
    #[builder(default = 0)]
    pub progress: i32,
    #[builder(default, setter(strip_option))]
    pub progress_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default, setter(strip_option))]
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Whether starting this audit consumed a credit (refundable on force-fail).
    #[builder(default = false)]
    pub credit_consumed: bool,

    #[builder(default, setter(strip_option))]
    pub scraped_data: Option<ScrapedProfile>,
    #[builder(default, setter(strip_option))]
    pub salon_name: Option<String>,
    #[builder(default, setter(strip_option))]
    pub salon_address: Option<String>,
    #[builder(default, setter(strip_option))]
    pub salon_logo_url: Option<String>,
    #[builder(default = 0)]
    pub categories_count: i32,
    #[builder(default = 0)]
    pub services_count: i32,

    #[builder(default, setter(strip_option))]
    pub base_price_list_id: Option<PriceListId>,
    #[builder(default, setter(strip_option))]
    pub pro_price_list_id: Option<PriceListId>,
    #[builder(default, setter(strip_option))]
    pub overall_score: Option<i32>,
    #[builder(default, setter(strip_option))]
    pub report: Option<AuditReport>,
    #[builder(default, setter(strip_option))]
    pub keyword_report: Option<KeywordReport>,
    #[builder(default, setter(strip_option))]
    pub category_proposal: Option<CategoryProposal>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub scraping_completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl AuditJob {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Successful scrape: snapshot, derived salon fields, move to `analyzing`.
    pub fn record_scrape(
        &mut self,
        profile: ScrapedProfile,
        base_price_list_id: PriceListId,
        message: String,
        now: DateTime<Utc>,
    ) {
        self.salon_name = profile.salon_name.clone();
        self.salon_address = profile.address.clone();
        self.salon_logo_url = profile.logo_url.clone();
        self.categories_count = profile.categories.len() as i32;
        self.services_count = profile.services_count() as i32;
        self.scraped_data = Some(profile);
        self.base_price_list_id = Some(base_price_list_id);
        self.status = AuditStatus::Analyzing;
        self.progress = 50;
        self.progress_message = Some(message);
        self.error_message = None;
        self.scraping_completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn record_completion(
        &mut self,
        report: AuditReport,
        keyword_report: KeywordReport,
        category_proposal: CategoryProposal,
        pro_price_list_id: Option<PriceListId>,
        now: DateTime<Utc>,
    ) {
        self.status = AuditStatus::Completed;
        self.progress = 100;
        self.progress_message = Some("Audit complete".to_string());
        self.overall_score = Some(report.overall_score);
        self.report = Some(report);
        self.keyword_report = Some(keyword_report);
        self.category_proposal = Some(category_proposal);
        self.pro_price_list_id = pro_price_list_id;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Terminal failure. Returns whether a consumed credit should be refunded;
    /// the job is marked so the refund can happen only once.
    pub fn record_failure(&mut self, message: String, refund: bool, now: DateTime<Utc>) -> bool {
        let refund = refund && self.credit_consumed;
        self.status = AuditStatus::Failed;
        self.error_message = Some(message);
        self.progress_message = Some("Audit failed".to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
        if refund {
            self.credit_consumed = false;
        }
        refund
    }
}

/// Insert request for an audit job.
///
/// The store rejects the insert atomically when the user already has an
/// active audit, when `source_url` was submitted by the same user within the
/// duplicate window, or when `consume_credit` is set and the balance is zero.
#[derive(Debug, Clone)]
pub struct NewAuditJob {
    pub user_id: UserId,
    pub status: AuditStatus,
    pub source_url: Option<String>,
    pub purchase_id: Option<String>,
    pub consume_credit: bool,
}

impl NewAuditJob {
    /// A purchased audit waiting for the user to supply a profile URL.
    pub fn pending(user_id: UserId, purchase_id: Option<String>) -> Self {
        Self {
            user_id,
            status: AuditStatus::Pending,
            source_url: None,
            purchase_id,
            consume_credit: false,
        }
    }

    /// A credit-funded audit that starts scraping immediately.
    pub fn direct(user_id: UserId, source_url: impl Into<String>) -> Self {
        Self {
            user_id,
            status: AuditStatus::Scraping,
            source_url: Some(source_url.into()),
            purchase_id: None,
            consume_credit: true,
        }
    }

    pub fn into_job(self, now: DateTime<Utc>) -> AuditJob {
        let started_at = (self.status == AuditStatus::Scraping).then_some(now);
        AuditJob {
            id: AuditJobId::new(),
            user_id: self.user_id,
            purchase_id: self.purchase_id,
            status: self.status,
            source_url: self.source_url,
            progress: 0,
            progress_message: None,
            error_message: None,
            retry_count: 0,
            last_retry_at: None,
            credit_consumed: self.consume_credit,
            scraped_data: None,
            salon_name: None,
            salon_address: None,
            salon_logo_url: None,
            categories_count: 0,
            services_count: 0,
            base_price_list_id: None,
            pro_price_list_id: None,
            overall_score: None,
            report: None,
            keyword_report: None,
            category_proposal: None,
            created_at: now,
            started_at,
            scraping_completed_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

/// Partial update applied by a guarded transition. `None` leaves a field as is.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option, into)))]
pub struct AuditPatch {
    pub status: Option<AuditStatus>,
    pub source_url: Option<String>,
    pub progress: Option<i32>,
    pub progress_message: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: Option<i32>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Clears a previous error message (set when re-entering an active state).
    #[builder(setter(!strip_option, !into))]
    pub clear_error: bool,
}

impl AuditPatch {
    pub fn apply(&self, job: &mut AuditJob, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(url) = &self.source_url {
            job.source_url = Some(url.clone());
        }
        if let Some(progress) = self.progress {
            job.progress = progress.clamp(0, 100);
        }
        if let Some(message) = &self.progress_message {
            job.progress_message = Some(message.clone());
        }
        if self.clear_error {
            job.error_message = None;
        }
        if let Some(error) = &self.error_message {
            job.error_message = Some(error.clone());
        }
        if let Some(retry_count) = self.retry_count {
            job.retry_count = retry_count;
        }
        if let Some(at) = self.last_retry_at {
            job.last_retry_at = Some(at);
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        job.updated_at = now;
    }
}
