mod optimization_job;
mod prompt_template;

pub use optimization_job::{
    AuditContext, ChangeKind, NewOptimizationJob, OptimizationChange, OptimizationJob,
    OptimizationPatch, OptimizationResult, OptimizationStatus,
};
pub use prompt_template::{
    resolve_call_settings, CallSettings, PromptTemplate, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
