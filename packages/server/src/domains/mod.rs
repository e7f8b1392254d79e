// Business domains
pub mod analysis;
pub mod audits;
pub mod billing;
pub mod notifications;
pub mod optimization;
pub mod price_lists;
pub mod tracking;
pub mod users;

use crate::kernel::jobs::JobRegistry;

/// Registry with every pipeline step handler.
pub fn job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    audits::register_jobs(&mut registry);
    optimization::register_jobs(&mut registry);
    registry
}
