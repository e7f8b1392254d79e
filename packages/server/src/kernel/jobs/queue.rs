//! Work queue for pipeline steps.
//!
//! [`JobQueue`] is object-safe so it can sit behind `Arc<dyn JobQueue>` in
//! [`ServerDeps`](crate::kernel::ServerDeps). Typed step commands go through
//! [`JobQueueExt`], which serializes them into a [`JobSpec`].

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::job::{infrastructure_backoff, ErrorKind, Job, JobStatus};

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Command was enqueued, returns new job ID
    Created(Uuid),
    /// Command already exists (idempotency hit), returns existing job ID
    Duplicate(Uuid),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// A claimed job ready for execution.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    /// Deserialize the command payload.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        serde_json::from_value(self.job.args.clone())
            .map_err(|e| anyhow!("failed to deserialize {}: {}", self.job.job_type, e))
    }

    /// Get the command type (job_type)
    pub fn command_type(&self) -> &str {
        &self.job.job_type
    }
}

/// Metadata a step command provides for queueing.
pub trait CommandMeta {
    /// The command type name (used as job_type).
    fn command_type(&self) -> &'static str;

    /// The pipeline job this command acts on.
    fn reference_id(&self) -> Uuid;

    /// If provided, ensures only one pending/running job exists with this key.
    fn idempotency_key(&self) -> Option<String> {
        None
    }

    /// Infrastructure retries (storage outages, lost leases). Pipeline-level
    /// retries are scheduled by the step itself.
    fn max_retries(&self) -> i32 {
        3
    }
}

/// Untyped enqueue request.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: String,
    pub reference_id: Uuid,
    pub args: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub max_retries: i32,
    /// `None` runs as soon as a worker is free.
    pub run_at: Option<DateTime<Utc>>,
}

impl JobSpec {
    pub fn from_command<C>(command: &C, run_at: Option<DateTime<Utc>>) -> Result<Self>
    where
        C: Serialize + CommandMeta,
    {
        Ok(Self {
            job_type: command.command_type().to_string(),
            reference_id: command.reference_id(),
            args: serde_json::to_value(command)?,
            idempotency_key: command.idempotency_key(),
            max_retries: command.max_retries(),
            run_at,
        })
    }

    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        Job::builder()
            .job_type(self.job_type)
            .reference_id(self.reference_id)
            .args(self.args)
            .idempotency_key(self.idempotency_key)
            .max_retries(self.max_retries)
            .run_at(self.run_at.unwrap_or(now))
            .created_at(now)
            .updated_at(now)
            .build()
    }
}

/// Trait for job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// The queue's notion of the current time. Delayed steps are scheduled
    /// relative to this.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Insert a job. If the spec carries an idempotency key and a matching
    /// pending/running job exists, returns `EnqueueResult::Duplicate`.
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult>;

    /// Claim up to `limit` ready jobs for processing.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;

    /// Mark a job as successfully completed.
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as failed. If retries remain and the kind allows it, a
    /// retry is queued with exponential backoff; otherwise the job is
    /// dead-lettered.
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;

    /// Extend the lease of a running job held by `worker_id`. Returns false
    /// when the lease expired and another worker claimed the job.
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool>;

    /// Find the next scheduled run time (for sleep optimization).
    async fn next_run_time(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Typed helpers over any [`JobQueue`].
#[async_trait]
pub trait JobQueueExt: JobQueue {
    /// Enqueue a command for immediate execution.
    async fn enqueue<C>(&self, command: C) -> Result<EnqueueResult>
    where
        C: Serialize + CommandMeta + Send + Sync + 'static,
    {
        self.enqueue_spec(JobSpec::from_command(&command, None)?).await
    }

    /// Schedule a command for a fixed time.
    async fn schedule<C>(&self, command: C, run_at: DateTime<Utc>) -> Result<EnqueueResult>
    where
        C: Serialize + CommandMeta + Send + Sync + 'static,
    {
        self.enqueue_spec(JobSpec::from_command(&command, Some(run_at))?)
            .await
    }

    /// Schedule a command `delay` from the queue's current time.
    async fn schedule_in<C>(&self, command: C, delay: Duration) -> Result<EnqueueResult>
    where
        C: Serialize + CommandMeta + Send + Sync + 'static,
    {
        let delay = chrono::Duration::from_std(delay)?;
        let run_at = self.now() + delay;
        self.schedule(command, run_at).await
    }
}

impl<Q: JobQueue + ?Sized> JobQueueExt for Q {}

// =============================================================================
// PostgreSQL
// =============================================================================

const JOB_COLUMNS: &str = "id, job_type, reference_id, args, status, run_at, max_retries, \
    retry_count, lease_expires_at, worker_id, idempotency_key, error_message, error_kind, \
    dead_lettered_at, created_at, updated_at";

/// Lease granted by `claim` and renewed by `heartbeat`. The runner renews
/// well inside this window while a step is running.
pub const LEASE_MS: i64 = 60_000;

/// PostgreSQL-backed job queue implementation.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check if a job with the given idempotency key already exists.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE idempotency_key = $1 AND status IN ('pending', 'running') LIMIT 1",
            JOB_COLUMNS
        );
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn find_by_id(&self, job_id: Uuid) -> Result<Job> {
        let sql = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        sqlx::query_as::<_, Job>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", job_id))
    }

    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, reference_id, args, status, run_at, max_retries,
                retry_count, idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(job.reference_id)
        .bind(&job.args)
        .bind(job.status)
        .bind(job.run_at)
        .bind(job.max_retries)
        .bind(job.retry_count)
        .bind(&job.idempotency_key)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult> {
        if let Some(key) = &spec.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let job = spec.into_job(Utc::now());
        // The partial unique index backs up the check above.
        if let Err(e) = self.insert(&job).await {
            if let Some(key) = &job.idempotency_key {
                if let Some(existing) = self.find_by_idempotency_key(key).await? {
                    return Ok(EnqueueResult::Duplicate(existing.id));
                }
            }
            return Err(e);
        }

        debug!(job_id = %job.id, job_type = %job.job_type, run_at = %job.run_at, "job enqueued");
        Ok(EnqueueResult::Created(job.id))
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let sql = format!(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE (status = 'pending' AND run_at <= NOW())
                   OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                worker_id = $3,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(limit)
            .bind(LEASE_MS.to_string())
            .bind(worker_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs
            .into_iter()
            .map(|job| ClaimedJob { id: job.id, job })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = self.find_by_id(job_id).await?;

        if kind.should_retry() && job.retry_count < job.max_retries {
            let retry_job = job.create_retry(Utc::now() + infrastructure_backoff(job.retry_count));

            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    error_message = $1,
                    error_kind = $2,
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                r#"
                INSERT INTO jobs (id, job_type, reference_id, args, status, run_at, max_retries,
                    retry_count, idempotency_key, created_at, updated_at)
                VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, NOW(), NOW())
                "#,
            )
            .bind(retry_job.id)
            .bind(&retry_job.job_type)
            .bind(retry_job.reference_id)
            .bind(&retry_job.args)
            .bind(retry_job.run_at)
            .bind(retry_job.max_retries)
            .bind(retry_job.retry_count)
            .bind(&retry_job.idempotency_key)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            info!(job_id = %job_id, retry_job_id = %retry_job.id, run_at = %retry_job.run_at, "job retry scheduled");
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'dead_letter',
                    error_message = $1,
                    error_kind = $2,
                    lease_expires_at = NULL,
                    dead_lettered_at = NOW(),
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

            info!(job_id = %job_id, job_type = %job.job_type, "job dead-lettered");
        }

        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND status = 'running' AND worker_id = $3
            "#,
        )
        .bind(LEASE_MS.to_string())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn next_run_time(&self) -> Result<Option<DateTime<Utc>>> {
        let next: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MIN(run_at) FROM jobs WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        target: Uuid,
        attempt: u32,
    }

    impl CommandMeta for Ping {
        fn command_type(&self) -> &'static str {
            "ping"
        }

        fn reference_id(&self) -> Uuid {
            self.target
        }

        fn idempotency_key(&self) -> Option<String> {
            Some(format!("ping:{}:{}", self.target, self.attempt))
        }
    }

    #[test]
    fn test_enqueue_result_helpers() {
        let created = EnqueueResult::Created(Uuid::new_v4());
        assert!(created.is_created());

        let duplicate = EnqueueResult::Duplicate(Uuid::new_v4());
        assert!(!duplicate.is_created());
    }

    #[test]
    fn test_spec_from_command_round_trips_args() {
        let ping = Ping {
            target: Uuid::new_v4(),
            attempt: 2,
        };
        let spec = JobSpec::from_command(&ping, None).unwrap();
        assert_eq!(spec.job_type, "ping");
        assert_eq!(spec.reference_id, ping.target);
        assert!(spec.idempotency_key.as_deref().unwrap().ends_with(":2"));

        let now = Utc::now();
        let job = spec.into_job(now);
        assert_eq!(job.run_at, now);
        let claimed = ClaimedJob { id: job.id, job };
        assert_eq!(claimed.deserialize::<Ping>().unwrap(), ping);
    }
}
