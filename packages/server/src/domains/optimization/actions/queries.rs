use crate::common::{Actor, OptimizationJobId, PipelineError, PipelineResult, PriceListId};
use crate::domains::optimization::models::OptimizationJob;
use crate::kernel::ServerDeps;

/// The job, for its owner or an admin.
pub async fn get_optimization(
    actor: Actor,
    job_id: OptimizationJobId,
    deps: &ServerDeps,
) -> PipelineResult<OptimizationJob> {
    let job = deps
        .store
        .find_optimization(job_id)
        .await?
        .ok_or(PipelineError::NotFound("optimization job"))?;
    actor.ensure_can_view(job.user_id, "optimization job")?;
    Ok(job)
}

/// The price list's active optimization, if any.
pub async fn active_optimization(
    actor: Actor,
    price_list_id: PriceListId,
    deps: &ServerDeps,
) -> PipelineResult<Option<OptimizationJob>> {
    let price_list = deps
        .store
        .find_price_list(price_list_id)
        .await?
        .ok_or(PipelineError::NotFound("price list"))?;
    actor.ensure_can_view(price_list.user_id, "price list")?;
    Ok(deps
        .store
        .active_optimization_for_price_list(price_list_id)
        .await?)
}
