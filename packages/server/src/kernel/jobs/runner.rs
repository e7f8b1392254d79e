//! Job runner service for processing background jobs.
//!
//! ```text
//! JobRunner
//!     │
//!     ├─► Claim ready jobs (JobQueue)
//!     ├─► Execute via JobRegistry (deserialize + call handler)
//!     └─► Mark succeeded/failed (JobQueue handles infrastructure retries)
//! ```
//!
//! A step that fails for a pipeline reason (scrape timeout, bad model
//! output) records that on the pipeline job and returns `Ok`. Only
//! infrastructure errors reach the runner as `Err`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::ErrorKind;
use super::queue::{ClaimedJob, JobQueue};
use super::registry::SharedJobRegistry;
use crate::common::{ErrorCategory, PipelineError};
use crate::kernel::ServerDeps;

/// Upper bound on rounds in [`JobRunner::drain`].
const MAX_DRAIN_ROUNDS: usize = 1_000;

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
    /// How often a running job's lease is renewed. Must stay well below
    /// the queue's lease.
    pub heartbeat_interval: Duration,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("runner-{}", Uuid::new_v4()),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

impl JobRunnerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Background service that processes jobs from the queue.
pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobRunnerConfig,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(registry: SharedJobRegistry, deps: Arc<ServerDeps>) -> Self {
        Self::with_config(registry, deps, JobRunnerConfig::default())
    }

    pub fn with_config(
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            job_queue: deps.jobs.clone(),
            registry,
            deps,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled. Child tokens of a
    /// process-wide token work too.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Claim one batch and execute it. Returns the number of jobs processed.
    pub async fn run_once(&self) -> Result<usize> {
        let jobs = self
            .job_queue
            .claim(&self.config.worker_id, self.config.batch_size)
            .await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        debug!(count = jobs.len(), "claimed jobs");
        let count = jobs.len();
        for job in jobs {
            if self.shutdown.is_cancelled() {
                if let Err(e) = self
                    .job_queue
                    .mark_failed(job.id, "worker shutting down", ErrorKind::Shutdown)
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to release job on shutdown");
                }
                continue;
            }
            // Jobs wait their turn within a batch; skip any whose lease
            // lapsed and went to another worker in the meantime.
            match self.job_queue.heartbeat(job.id, &self.config.worker_id).await {
                Ok(true) => self.execute(job).await,
                Ok(false) => {
                    warn!(job_id = %job.id, job_type = %job.command_type(), "job lease lost before start, skipping");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to renew job lease, skipping");
                }
            }
        }
        Ok(count)
    }

    /// Run batches until nothing is ready. Jobs scheduled in the future stay
    /// queued.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        for _ in 0..MAX_DRAIN_ROUNDS {
            let processed = self.run_once().await?;
            if processed == 0 {
                break;
            }
            total += processed;
        }
        Ok(total)
    }

    async fn execute(&self, job: ClaimedJob) {
        let job_id = job.id;
        let job_type = job.command_type().to_string();

        debug!(job_id = %job_id, job_type = %job_type, reference_id = %job.job.reference_id, "executing job");

        let work = self.registry.execute(&job, self.deps.clone());
        tokio::pin!(work);
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = heartbeat.tick() => {
                    match self.job_queue.heartbeat(job_id, &self.config.worker_id).await {
                        Ok(true) => {}
                        Ok(false) => warn!(job_id = %job_id, job_type = %job_type, "job lease lost while running"),
                        Err(e) => warn!(job_id = %job_id, error = %e, "failed to renew job lease"),
                    }
                }
            }
        };

        match result {
            Ok(()) => {
                debug!(job_id = %job_id, job_type = %job_type, "job succeeded");
                if let Err(e) = self.job_queue.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, job_type = %job_type, error = %e, "job failed");
                let kind = classify_error(&e);
                if let Err(mark_err) = self
                    .job_queue
                    .mark_failed(job_id, &e.to_string(), kind)
                    .await
                {
                    error!(job_id = %job_id, error = %mark_err, "failed to mark job as failed");
                }
            }
        }
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job runner starting"
        );

        while !self.shutdown.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(processed) => processed == 0,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }
}

/// Classify an error to determine retry behavior.
fn classify_error(error: &anyhow::Error) -> ErrorKind {
    if error.downcast_ref::<serde_json::Error>().is_some() {
        return ErrorKind::NonRetryable;
    }
    if let Some(pipeline) = error.downcast_ref::<PipelineError>() {
        return match pipeline.category() {
            ErrorCategory::Internal => ErrorKind::Retryable,
            _ => ErrorKind::NonRetryable,
        };
    }

    let message = error.to_string().to_lowercase();
    if message.contains("unknown job type") || message.contains("deserialize") {
        return ErrorKind::NonRetryable;
    }

    ErrorKind::Retryable
}
