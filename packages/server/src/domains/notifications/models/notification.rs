use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::{NotificationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OptimizationStarted,
    OptimizationCompleted,
    OptimizationFailed,
    AuditCompleted,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OptimizationStarted => "optimization_started",
            NotificationKind::OptimizationCompleted => "optimization_completed",
            NotificationKind::OptimizationFailed => "optimization_failed",
            NotificationKind::AuditCompleted => "audit_completed",
            NotificationKind::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimization_started" => Ok(NotificationKind::OptimizationStarted),
            "optimization_completed" => Ok(NotificationKind::OptimizationCompleted),
            "optimization_failed" => Ok(NotificationKind::OptimizationFailed),
            "audit_completed" => Ok(NotificationKind::AuditCompleted),
            "system" => Ok(NotificationKind::System),
            other => Err(format!("unknown notification kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

impl NewNotification {
    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: NotificationId::new(),
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            link: self.link,
            read: false,
            created_at: now,
        }
    }
}
