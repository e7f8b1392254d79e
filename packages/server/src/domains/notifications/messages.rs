//! User-facing notification texts.
//!
//! Technical error text stays on the job record for operators. What the user
//! sees is derived from the error's kind only.

use crate::common::{AuditJobId, OptimizationJobId, PriceListId, UserId};
use crate::kernel::{AiError, ScrapeError};

use super::models::{NewNotification, NotificationKind};

/// Message set when an operator force-fails an audit.
pub const OPERATOR_STOPPED_MESSAGE: &str = "Audit was stopped by an operator";

/// Why a pipeline job failed, as far as the user needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    ProfileNotFound,
    InvalidProfileUrl,
    EmptyProfile,
    InvalidOptions,
    SourceUnavailable,
    ModelUnavailable,
    ModelOutput,
    StoppedByOperator,
    Unexpected,
}

impl FailureCause {
    pub fn from_scrape(error: &ScrapeError) -> Self {
        match error {
            ScrapeError::ProfileNotFound(_) => FailureCause::ProfileNotFound,
            ScrapeError::InvalidUrl(_) => FailureCause::InvalidProfileUrl,
            ScrapeError::Timeout | ScrapeError::Unavailable(_) | ScrapeError::RateLimited => {
                FailureCause::SourceUnavailable
            }
            ScrapeError::Malformed(_) => FailureCause::Unexpected,
        }
    }

    pub fn from_ai(error: &AiError) -> Self {
        match error {
            AiError::RateLimited(_)
            | AiError::Overloaded(_)
            | AiError::Timeout
            | AiError::Network(_) => FailureCause::ModelUnavailable,
            AiError::MalformedOutput(_) => FailureCause::ModelOutput,
            AiError::Rejected(_) => FailureCause::Unexpected,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            FailureCause::ProfileNotFound => {
                "We could not find this salon profile. Check the link and try again."
            }
            FailureCause::InvalidProfileUrl => "The profile link does not look right.",
            FailureCause::EmptyProfile => "This profile has no services listed.",
            FailureCause::InvalidOptions => {
                "The selected optimization options cannot be applied to this price list."
            }
            FailureCause::SourceUnavailable => {
                "The salon profile could not be loaded right now. Please try again later."
            }
            FailureCause::ModelUnavailable => {
                "Our AI service is busy. Please try again in a few minutes."
            }
            FailureCause::ModelOutput => {
                "The AI returned an incomplete result. Please try again."
            }
            FailureCause::StoppedByOperator => OPERATOR_STOPPED_MESSAGE,
            FailureCause::Unexpected => "Something went wrong. Our team has been notified.",
        }
    }
}

pub fn audit_link(audit_id: AuditJobId) -> String {
    format!("/audits/{}", audit_id)
}

pub fn price_list_link(price_list_id: PriceListId) -> String {
    format!("/price-lists/{}", price_list_id)
}

pub fn audit_completed(user_id: UserId, audit_id: AuditJobId, overall_score: i32) -> NewNotification {
    NewNotification {
        user_id,
        kind: NotificationKind::AuditCompleted,
        title: "Your audit is ready".to_string(),
        message: format!("Your price list scored {}/100. See the full report.", overall_score),
        link: Some(audit_link(audit_id)),
    }
}

pub fn audit_failed(
    user_id: UserId,
    audit_id: AuditJobId,
    cause: FailureCause,
    refunded: bool,
) -> NewNotification {
    let refund_note = if refunded {
        " Your credit has been returned."
    } else {
        ""
    };
    NewNotification {
        user_id,
        kind: NotificationKind::System,
        title: "Audit failed".to_string(),
        message: format!("{}{}", cause.user_message(), refund_note),
        link: Some(audit_link(audit_id)),
    }
}

pub fn optimization_started(
    user_id: UserId,
    price_list_id: PriceListId,
    price_list_name: &str,
) -> NewNotification {
    NewNotification {
        user_id,
        kind: NotificationKind::OptimizationStarted,
        title: "Optimization started".to_string(),
        message: format!("We are optimizing \"{}\". This usually takes a minute.", price_list_name),
        link: Some(price_list_link(price_list_id)),
    }
}

pub fn optimization_completed(
    user_id: UserId,
    price_list_id: PriceListId,
    job_id: OptimizationJobId,
    change_count: usize,
) -> NewNotification {
    let message = match change_count {
        0 => "Your price list was reviewed; no changes were needed.".to_string(),
        1 => "Your price list was optimized with 1 change.".to_string(),
        n => format!("Your price list was optimized with {} changes.", n),
    };
    NewNotification {
        user_id,
        kind: NotificationKind::OptimizationCompleted,
        title: "Optimization complete".to_string(),
        message,
        link: Some(format!("{}?optimization={}", price_list_link(price_list_id), job_id)),
    }
}

pub fn optimization_failed(
    user_id: UserId,
    price_list_id: PriceListId,
    cause: FailureCause,
) -> NewNotification {
    NewNotification {
        user_id,
        kind: NotificationKind::OptimizationFailed,
        title: "Optimization failed".to_string(),
        message: cause.user_message().to_string(),
        link: Some(price_list_link(price_list_id)),
    }
}
