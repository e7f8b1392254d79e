//! Work item model for background step execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
    /// Job was interrupted by graceful shutdown - will retry
    Shutdown,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Shutdown)
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// One queued step invocation. `reference_id` is the pipeline job the step
/// acts on; `args` is the serialized step command.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub job_type: String,
    pub reference_id: Uuid,
    pub args: serde_json::Value,
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = Utc::now())]
    pub run_at: DateTime<Utc>,
    #[builder(default = 3)]
    pub max_retries: i32,
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,
    #[builder(default)]
    pub idempotency_key: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,
    #[builder(default, setter(strip_option))]
    pub dead_lettered_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => self.run_at <= now,
            JobStatus::Running => self.lease_expires_at.is_some_and(|lease| lease < now),
            _ => false,
        }
    }

    /// A fresh pending copy scheduled for `run_at`, one retry further along.
    pub fn create_retry(&self, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: self.job_type.clone(),
            reference_id: self.reference_id,
            args: self.args.clone(),
            status: JobStatus::Pending,
            run_at,
            max_retries: self.max_retries,
            retry_count: self.retry_count + 1,
            lease_expires_at: None,
            worker_id: None,
            idempotency_key: self.idempotency_key.clone(),
            error_message: None,
            error_kind: None,
            dead_lettered_at: None,
            created_at: run_at,
            updated_at: run_at,
        }
    }
}

/// Infrastructure retry delay: `2^retry_count` seconds, capped at one hour.
pub fn infrastructure_backoff(retry_count: i32) -> chrono::Duration {
    let exponent = retry_count.clamp(0, 12) as u32;
    chrono::Duration::seconds(2i64.pow(exponent).min(3600))
}
