//! Audit pipeline actions.
//!
//! Entry points take the caller's [`Actor`](crate::common::Actor) explicitly.
//! Step functions run inside the job runner and record pipeline failures on
//! the audit itself; only infrastructure errors are returned.

mod operations;
mod queries;
mod start;
mod steps;

pub use operations::{force_fail_audit, retry_analysis, retry_stuck_audit};
pub use queries::{active_audit, get_audit, list_audits};
pub use start::{start_audit, start_direct_audit};
pub use steps::{run_analysis_step, run_scrape_step};

use crate::common::{AuditJobId, PipelineError, PipelineResult};
use crate::kernel::ServerDeps;

use super::models::{AuditJob, AuditStatus};

pub(crate) async fn load_audit(id: AuditJobId, deps: &ServerDeps) -> PipelineResult<AuditJob> {
    deps.store
        .find_audit(id)
        .await?
        .ok_or(PipelineError::NotFound("audit"))
}

/// Rejects terminal jobs as already finished and any other unexpected
/// status as an invalid transition.
pub(crate) fn ensure_status(job: &AuditJob, expected: &[AuditStatus]) -> PipelineResult<()> {
    if expected.contains(&job.status) {
        Ok(())
    } else if job.status.is_terminal() {
        Err(PipelineError::AlreadyTerminal(job.status.to_string()))
    } else {
        Err(PipelineError::invalid_state(expected, job.status))
    }
}

/// Error for a guarded write that lost a race: reports the status the job
/// moved to in the meantime.
pub(crate) async fn transition_lost(
    id: AuditJobId,
    expected: &[AuditStatus],
    deps: &ServerDeps,
) -> PipelineError {
    match load_audit(id, deps).await {
        Ok(job) => match ensure_status(&job, expected) {
            Err(e) => e,
            Ok(()) => PipelineError::invalid_state(expected, job.status),
        },
        Err(e) => e,
    }
}
