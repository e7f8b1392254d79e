//! Audit pipeline: scrape an external salon profile, analyze it, report.
//!
//! ```text
//! pending ──start──► scraping ──ok──► analyzing ──ok──► completed
//!                      │  ▲                │
//!              transient│  │after delay     │permanent / exhausted
//!                      ▼  │                ▼
//!                 scraping_retry ───────► failed
//! ```

pub mod actions;
pub mod jobs;
pub mod models;
pub mod prompt;

pub use actions::{
    active_audit, force_fail_audit, get_audit, list_audits, retry_analysis, retry_stuck_audit,
    run_analysis_step, run_scrape_step, start_audit, start_direct_audit,
};
pub use jobs::{AnalyzeAuditJob, ScrapeProfileJob};
pub use models::{AuditJob, AuditStatus};

use crate::kernel::jobs::JobRegistry;

/// Register the audit step handlers.
pub fn register_jobs(registry: &mut JobRegistry) {
    registry.register::<ScrapeProfileJob, _, _>(ScrapeProfileJob::JOB_TYPE, |job, deps| async move {
        run_scrape_step(job, &deps).await
    });
    registry.register::<AnalyzeAuditJob, _, _>(AnalyzeAuditJob::JOB_TYPE, |job, deps| async move {
        run_analysis_step(job, &deps).await
    });
}
