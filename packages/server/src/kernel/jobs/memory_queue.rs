//! In-process job queue with a controllable clock.
//!
//! Same claim/retry/dead-letter semantics as [`PostgresJobQueue`](super::PostgresJobQueue),
//! without leases expiring on their own: time only moves when
//! [`advance`](MemoryJobQueue::advance) is called (or when built with
//! [`MemoryJobQueue::system_clock`]).

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{infrastructure_backoff, ErrorKind, Job, JobStatus};
use super::queue::{ClaimedJob, EnqueueResult, JobQueue, JobSpec};

const LEASE: Duration = Duration::from_millis(super::queue::LEASE_MS as u64);

enum Clock {
    System,
    Manual(DateTime<Utc>),
}

pub struct MemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
    clock: Mutex<Clock>,
}

impl MemoryJobQueue {
    /// Queue with a frozen clock starting at the current time.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            clock: Mutex::new(Clock::Manual(Utc::now())),
        }
    }

    /// Queue that follows wall-clock time.
    pub fn system_clock() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            clock: Mutex::new(Clock::System),
        }
    }

    /// Moves a manual clock forward. No effect on a system clock.
    pub fn advance(&self, by: Duration) {
        let mut clock = self.clock.lock().unwrap();
        if let Clock::Manual(now) = &mut *clock {
            *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        }
    }

    /// Snapshot of every job ever enqueued, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    /// Pending jobs of one type.
    pub fn pending_of_type(&self, job_type: &str) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending && j.job_type == job_type)
            .cloned()
            .collect()
    }

    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == status)
            .count()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn now(&self) -> DateTime<Utc> {
        match &*self.clock.lock().unwrap() {
            Clock::System => Utc::now(),
            Clock::Manual(now) => *now,
        }
    }

    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult> {
        let now = self.now();
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(key) = &spec.idempotency_key {
            let existing = jobs.iter().find(|j| {
                j.idempotency_key.as_deref() == Some(key.as_str())
                    && matches!(j.status, JobStatus::Pending | JobStatus::Running)
            });
            if let Some(existing) = existing {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }
        let job = spec.into_job(now);
        let id = job.id;
        jobs.push(job);
        Ok(EnqueueResult::Created(id))
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let now = self.now();
        let lease = chrono::Duration::from_std(LEASE)?;
        let mut jobs = self.jobs.lock().unwrap();

        let mut ready: Vec<&mut Job> = jobs.iter_mut().filter(|j| j.is_ready(now)).collect();
        ready.sort_by_key(|j| j.run_at);

        Ok(ready
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| {
                job.status = JobStatus::Running;
                job.lease_expires_at = Some(now + lease);
                job.worker_id = Some(worker_id.to_string());
                job.updated_at = now;
                ClaimedJob {
                    id: job.id,
                    job: job.clone(),
                }
            })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        let now = self.now();
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;
        job.status = JobStatus::Succeeded;
        job.lease_expires_at = None;
        job.updated_at = now;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let now = self.now();
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        job.error_message = Some(error.to_string());
        job.error_kind = Some(kind);
        job.lease_expires_at = None;
        job.updated_at = now;

        if kind.should_retry() && job.retry_count < job.max_retries {
            job.status = JobStatus::Failed;
            let retry = job.create_retry(now + infrastructure_backoff(job.retry_count));
            jobs.push(retry);
        } else {
            job.status = JobStatus::DeadLetter;
            job.dead_lettered_at = Some(now);
        }
        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let now = self.now();
        let lease = chrono::Duration::from_std(LEASE)?;
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| {
            j.id == job_id
                && j.status == JobStatus::Running
                && j.worker_id.as_deref() == Some(worker_id)
        }) {
            Some(job) => {
                job.lease_expires_at = Some(now + lease);
                job.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn next_run_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.run_at)
            .min())
    }
}
