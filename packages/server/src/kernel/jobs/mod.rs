//! Job infrastructure for background step execution.
//!
//! - [`JobQueue`] / [`JobQueueExt`] - enqueue typed step commands
//! - [`PostgresJobQueue`] / [`MemoryJobQueue`] - storage backends
//! - [`JobRegistry`] - job type → handler
//! - [`JobRunner`] - claims, dispatches and settles jobs
//! - [`RetryPolicy`] - pipeline-level retry schedule
//!
//! # Architecture
//!
//! ```text
//! Activity enqueues ScrapeProfileJob { audit_id, attempt }
//!     │
//!     └─► JobQueue.enqueue_spec()  (run_at = notBefore)
//!
//! JobRunner
//!     ├─► claim ready jobs
//!     ├─► JobRegistry.execute(job, deps)
//!     └─► mark succeeded / failed
//! ```
//!
//! Step commands and their handlers live in their domains.

pub mod backoff;
mod job;
mod memory_queue;
mod queue;
mod registry;
mod runner;

pub use backoff::{RetryDecision, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use job::{ErrorKind, Job, JobStatus};
pub use memory_queue::MemoryJobQueue;
pub use queue::{
    ClaimedJob, CommandMeta, EnqueueResult, JobQueue, JobQueueExt, JobSpec, PostgresJobQueue,
};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
