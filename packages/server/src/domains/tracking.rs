//! Polling projections across both pipelines.

use serde::Serialize;

use crate::common::{
    Actor, AuditJobId, OptimizationJobId, PipelineError, PipelineResult, PriceListId, UserId,
};
use crate::kernel::ServerDeps;

use super::audits::{self, AuditJob};
use super::optimization::{self, OptimizationJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Audit(AuditJobId),
    Optimization(OptimizationJobId),
}

/// Where the one-active-job rule applies: the user for audits, the price
/// list for optimizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobScope {
    User(UserId),
    PriceList(PriceListId),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum PipelineJob {
    Audit(AuditJob),
    Optimization(OptimizationJob),
}

impl PipelineJob {
    pub fn is_active(&self) -> bool {
        match self {
            PipelineJob::Audit(job) => job.is_active(),
            PipelineJob::Optimization(job) => job.is_active(),
        }
    }
}

pub async fn get_job(actor: Actor, job: JobRef, deps: &ServerDeps) -> PipelineResult<PipelineJob> {
    match job {
        JobRef::Audit(id) => audits::get_audit(actor, id, deps).await.map(PipelineJob::Audit),
        JobRef::Optimization(id) => optimization::get_optimization(actor, id, deps)
            .await
            .map(PipelineJob::Optimization),
    }
}

pub async fn get_active_job_for_scope(
    actor: Actor,
    scope: JobScope,
    deps: &ServerDeps,
) -> PipelineResult<Option<PipelineJob>> {
    match scope {
        JobScope::User(user_id) => {
            if !actor.can_view(user_id) {
                return Err(PipelineError::PermissionDenied(
                    "you can only see your own audits".to_string(),
                ));
            }
            Ok(deps
                .store
                .active_audit_for_user(user_id)
                .await?
                .map(PipelineJob::Audit))
        }
        JobScope::PriceList(price_list_id) => {
            optimization::active_optimization(actor, price_list_id, deps)
                .await
                .map(|job| job.map(PipelineJob::Optimization))
        }
    }
}
