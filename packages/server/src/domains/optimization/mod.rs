//! Optimization pipeline: rewrite a price list with one model call.
//!
//! `pending -> processing -> completed | failed`, with `processing` looping
//! on itself while transient model errors are retried.

pub mod actions;
pub mod jobs;
pub mod merge;
pub mod models;

pub use actions::{
    active_optimization, complete_job, fail_job, get_optimization, run_optimization_step,
    start_optimization,
};
pub use jobs::ProcessOptimizationJob;
pub use merge::{merge_optimization, MergedPriceList, ModelOptimizationOutput, ModelService};
pub use models::{OptimizationJob, OptimizationStatus};

use crate::kernel::jobs::JobRegistry;

pub fn register_jobs(registry: &mut JobRegistry) {
    registry.register::<ProcessOptimizationJob, _, _>(
        ProcessOptimizationJob::JOB_TYPE,
        |job, deps| async move { run_optimization_step(job, &deps).await },
    );
}
