//! Typed ID definitions for all domain entities.

pub use super::id::Id;

/// Marker type for users (owned by the identity provider).
pub struct User;

/// Marker type for audit jobs.
pub struct AuditJob;

/// Marker type for optimization jobs.
pub struct OptimizationJob;

/// Marker type for price lists.
pub struct PriceList;

/// Marker type for notifications.
pub struct Notification;

/// Marker type for prompt templates.
pub struct PromptTemplate;

pub type UserId = Id<User>;
pub type AuditJobId = Id<AuditJob>;
pub type OptimizationJobId = Id<OptimizationJob>;
pub type PriceListId = Id<PriceList>;
pub type NotificationId = Id<Notification>;
pub type PromptTemplateId = Id<PromptTemplate>;
