use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::OptimizationJobId;
use crate::kernel::jobs::CommandMeta;

/// Build the prompt, call the model once and merge its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptimizationJob {
    pub job_id: OptimizationJobId,
    /// 1-based; the job record's `retry_count` is `attempt - 1` while this
    /// command is current.
    pub attempt: u32,
}

impl ProcessOptimizationJob {
    pub const JOB_TYPE: &'static str = "process_optimization";

    pub fn new(job_id: OptimizationJobId, attempt: u32) -> Self {
        Self { job_id, attempt }
    }

    pub fn first(job_id: OptimizationJobId) -> Self {
        Self::new(job_id, 1)
    }

    pub fn expected_retry_count(&self) -> i32 {
        self.attempt.saturating_sub(1) as i32
    }
}

impl CommandMeta for ProcessOptimizationJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    fn reference_id(&self) -> Uuid {
        self.job_id.into_uuid()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:{}:{}", Self::JOB_TYPE, self.job_id, self.attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_meta() {
        let job_id = OptimizationJobId::new();
        let job = ProcessOptimizationJob::first(job_id);

        assert_eq!(job.command_type(), "process_optimization");
        assert_eq!(job.reference_id(), job_id.into_uuid());
        assert_eq!(job.expected_retry_count(), 0);
        assert_eq!(ProcessOptimizationJob::new(job_id, 3).expected_retry_count(), 2);
    }
}
