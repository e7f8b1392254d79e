use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

use crate::common::{AuditJobId, OptimizationJobId, PriceListId, PricingData, UserId};
use crate::domains::analysis::{CategoryProposal, OptimizationOption};

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OptimizationStatus {
    pub const ACTIVE: [OptimizationStatus; 2] =
        [OptimizationStatus::Pending, OptimizationStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStatus::Pending => "pending",
            OptimizationStatus::Processing => "processing",
            OptimizationStatus::Completed => "completed",
            OptimizationStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Completed | OptimizationStatus::Failed
        )
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OptimizationStatus::Pending),
            "processing" => Ok(OptimizationStatus::Processing),
            "completed" => Ok(OptimizationStatus::Completed),
            "failed" => Ok(OptimizationStatus::Failed),
            other => Err(format!("unknown optimization status: {}", other)),
        }
    }
}

// ============================================================================
// Audit context and results
// ============================================================================

/// Findings of the linked audit, captured when the job is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditContext {
    pub salon_name: Option<String>,
    pub overall_score: Option<i32>,
    pub weaknesses: Vec<String>,
    pub suggested_keywords: Vec<String>,
    pub category_proposal: Option<CategoryProposal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Name,
    Description,
    Price,
    Duration,
    Tags,
    Category,
    Order,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationChange {
    pub kind: ChangeKind,
    /// Category the service ends up in.
    pub category: String,
    /// Service name after the change.
    pub service: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub changes: Vec<OptimizationChange>,
    pub changes_by_kind: BTreeMap<ChangeKind, usize>,
    pub quality_score: i32,
    pub recommendations: Vec<String>,
}

impl OptimizationResult {
    pub fn total_changes(&self) -> usize {
        self.changes.len()
    }
}

// ============================================================================
// Optimization job
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationJob {
    pub id: OptimizationJobId,
    pub user_id: UserId,
    pub price_list_id: PriceListId,
    pub audit_id: Option<AuditJobId>,
    pub purchase_id: Option<String>,

    pub status: OptimizationStatus,
    pub options: Vec<OptimizationOption>,
    pub progress: i32,
    pub progress_message: Option<String>,
    pub current_step: i32,
    pub total_steps: i32,
    pub retry_count: i32,
    pub error_message: Option<String>,

    pub input_pricing_data: PricingData,
    pub audit_context: Option<AuditContext>,
    pub output_pricing_data: Option<PricingData>,
    pub optimization_result: Option<OptimizationResult>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OptimizationJob {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn record_completion(
        &mut self,
        output: PricingData,
        result: OptimizationResult,
        now: DateTime<Utc>,
    ) {
        self.status = OptimizationStatus::Completed;
        self.progress = 100;
        self.progress_message = Some("Optimization complete".to_string());
        self.current_step = self.total_steps;
        self.output_pricing_data = Some(output);
        self.optimization_result = Some(result);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn record_failure(&mut self, message: String, now: DateTime<Utc>) {
        self.status = OptimizationStatus::Failed;
        self.error_message = Some(message);
        self.progress_message = Some("Optimization failed".to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct NewOptimizationJob {
    pub user_id: UserId,
    pub price_list_id: PriceListId,
    pub audit_id: Option<AuditJobId>,
    pub options: Vec<OptimizationOption>,
    pub input_pricing_data: PricingData,
    pub audit_context: Option<AuditContext>,
}

impl NewOptimizationJob {
    pub fn into_job(self, now: DateTime<Utc>) -> OptimizationJob {
        let total_steps = self.options.len() as i32;
        OptimizationJob {
            id: OptimizationJobId::new(),
            user_id: self.user_id,
            price_list_id: self.price_list_id,
            audit_id: self.audit_id,
            purchase_id: None,
            status: OptimizationStatus::Pending,
            options: self.options,
            progress: 0,
            progress_message: Some("Queued".to_string()),
            current_step: 0,
            total_steps,
            retry_count: 0,
            error_message: None,
            input_pricing_data: self.input_pricing_data,
            audit_context: self.audit_context,
            output_pricing_data: None,
            optimization_result: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option, into)))]
pub struct OptimizationPatch {
    pub status: Option<OptimizationStatus>,
    pub progress: Option<i32>,
    pub progress_message: Option<String>,
    pub current_step: Option<i32>,
    pub retry_count: Option<i32>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OptimizationPatch {
    pub fn apply(&self, job: &mut OptimizationJob, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress.clamp(0, 100);
        }
        if let Some(message) = &self.progress_message {
            job.progress_message = Some(message.clone());
        }
        if let Some(step) = self.current_step {
            job.current_step = step;
        }
        if let Some(retry_count) = self.retry_count {
            job.retry_count = retry_count;
        }
        if let Some(error) = &self.error_message {
            job.error_message = Some(error.clone());
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
