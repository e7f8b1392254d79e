//! In-app notifications emitted by pipeline transitions, mirrored by email.

pub mod actions;
pub mod messages;
pub mod models;

pub use actions::{email_notification, list_notifications};
pub use messages::{FailureCause, OPERATOR_STOPPED_MESSAGE};
pub use models::{NewNotification, Notification, NotificationKind};
