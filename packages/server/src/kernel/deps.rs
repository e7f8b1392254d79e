//! Server dependencies for pipeline steps (using traits for testability)
//!
//! This module provides the central dependency container handed to every
//! activity and job handler. All external services use trait abstractions so
//! tests can swap in the mocks from [`test_dependencies`](super::test_dependencies).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::error;

use super::jobs::{CommandMeta, JobQueue, JobQueueExt, RetryPolicy};
use super::store::Store;
use super::{BaseAI, BaseEmailService, BaseProfileScraper};
use crate::common::{PipelineError, PipelineResult};

/// Server dependencies accessible to activities and job handlers.
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn Store>,
    pub jobs: Arc<dyn JobQueue>,
    pub ai: Arc<dyn BaseAI>,
    pub scraper: Arc<dyn BaseProfileScraper>,
    pub email: Arc<dyn BaseEmailService>,
    pub retry_policy: RetryPolicy,
    /// Public web app URL, used for deep links in notifications and email.
    pub app_base_url: String,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn Store>,
        jobs: Arc<dyn JobQueue>,
        ai: Arc<dyn BaseAI>,
        scraper: Arc<dyn BaseProfileScraper>,
        email: Arc<dyn BaseEmailService>,
        app_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            jobs,
            ai,
            scraper,
            email,
            retry_policy: RetryPolicy::default(),
            app_base_url: app_base_url.into(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enqueue a step command for immediate execution.
    pub async fn enqueue_step<C>(&self, command: C) -> PipelineResult<()>
    where
        C: Serialize + CommandMeta + Send + Sync + 'static,
    {
        let job_type = command.command_type();
        let reference_id = command.reference_id();
        self.jobs.enqueue(command).await.map(|_| ()).map_err(|e| {
            error!(job_type, %reference_id, error = %e, "failed to enqueue step");
            PipelineError::Scheduling(e.to_string())
        })
    }

    /// Enqueue a step command that must not run before `delay` has passed.
    pub async fn schedule_step<C>(&self, command: C, delay: Duration) -> PipelineResult<()>
    where
        C: Serialize + CommandMeta + Send + Sync + 'static,
    {
        let job_type = command.command_type();
        let reference_id = command.reference_id();
        self.jobs
            .schedule_in(command, delay)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!(job_type, %reference_id, error = %e, "failed to schedule step");
                PipelineError::Scheduling(e.to_string())
            })
    }

    /// Absolute link into the web app.
    pub fn link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.app_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
