//! Step commands of the audit pipeline.
//!
//! Each command carries the attempt it belongs to. The step checks that
//! attempt against the record at write time, so a superseded command
//! (e.g. after an operator retry) becomes a no-op.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::AuditJobId;
use crate::kernel::jobs::CommandMeta;

/// Fetch the salon profile and store the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeProfileJob {
    pub audit_id: AuditJobId,
    /// Equals the audit's `retry_count` when the command was scheduled.
    pub attempt: i32,
}

impl ScrapeProfileJob {
    pub const JOB_TYPE: &'static str = "scrape_profile";

    pub fn new(audit_id: AuditJobId, attempt: i32) -> Self {
        Self { audit_id, attempt }
    }

    pub fn first(audit_id: AuditJobId) -> Self {
        Self::new(audit_id, 0)
    }
}

impl CommandMeta for ScrapeProfileJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    fn reference_id(&self) -> Uuid {
        self.audit_id.into_uuid()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:{}:{}", Self::JOB_TYPE, self.audit_id, self.attempt))
    }
}

/// Analyze the stored snapshot and complete the audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeAuditJob {
    pub audit_id: AuditJobId,
    /// 1-based model call attempt.
    pub attempt: u32,
}

impl AnalyzeAuditJob {
    pub const JOB_TYPE: &'static str = "analyze_audit";

    pub fn new(audit_id: AuditJobId, attempt: u32) -> Self {
        Self { audit_id, attempt }
    }

    pub fn first(audit_id: AuditJobId) -> Self {
        Self::new(audit_id, 1)
    }
}

impl CommandMeta for AnalyzeAuditJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    fn reference_id(&self) -> Uuid {
        self.audit_id.into_uuid()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:{}:{}", Self::JOB_TYPE, self.audit_id, self.attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_command_meta() {
        let audit_id = AuditJobId::new();
        let job = ScrapeProfileJob::new(audit_id, 2);

        assert_eq!(job.command_type(), "scrape_profile");
        assert_eq!(job.reference_id(), audit_id.into_uuid());
        assert_eq!(
            job.idempotency_key(),
            Some(format!("scrape_profile:{}:2", audit_id))
        );
    }

    #[test]
    fn test_attempts_have_distinct_keys() {
        let audit_id = AuditJobId::new();
        assert_ne!(
            AnalyzeAuditJob::first(audit_id).idempotency_key(),
            AnalyzeAuditJob::new(audit_id, 2).idempotency_key()
        );
    }

    #[test]
    fn test_serialization() {
        let job = ScrapeProfileJob::first(AuditJobId::new());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["attempt"], 0);

        let back: ScrapeProfileJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.audit_id, job.audit_id);
    }
}
