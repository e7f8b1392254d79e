mod audit_job;
mod report;
mod scraped_profile;

pub use audit_job::{AuditJob, AuditPatch, AuditStatus, NewAuditJob};
pub use report::{AuditReport, ModelAuditReport, ScoreSource};
pub use scraped_profile::ScrapedProfile;
