use thiserror::Error;

use crate::kernel::store::StoreError;

/// How a failure should be surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Not logged in, not the owner, bad input. Nothing changed.
    Input,
    /// Insufficient credits, duplicate active job or submission. Nothing created.
    Capacity,
    /// Transition attempted from an unexpected status. Record untouched.
    Invariant,
    /// Storage or other infrastructure failure.
    Internal,
}

/// Errors returned by pipeline entry points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Admin access required")]
    AdminRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("An active {0} already exists")]
    ActiveJobExists(&'static str),

    #[error("An audit for this profile was submitted less than 5 minutes ago")]
    DuplicateSubmission,

    #[error("Job is in status '{actual}', expected one of: {expected}")]
    InvalidState { expected: String, actual: String },

    #[error("Job has already finished with status '{0}'")]
    AlreadyTerminal(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("Failed to schedule step: {0}")]
    Scheduling(String),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::AuthenticationRequired
            | PipelineError::PermissionDenied(_)
            | PipelineError::AdminRequired
            | PipelineError::NotFound(_)
            | PipelineError::InvalidInput(_) => ErrorCategory::Input,
            PipelineError::InsufficientCredits
            | PipelineError::ActiveJobExists(_)
            | PipelineError::DuplicateSubmission => ErrorCategory::Capacity,
            PipelineError::InvalidState { .. } | PipelineError::AlreadyTerminal(_) => {
                ErrorCategory::Invariant
            }
            PipelineError::Storage(_) | PipelineError::Scheduling(_) => ErrorCategory::Internal,
        }
    }

    pub fn invalid_state<S: std::fmt::Display>(expected: &[S], actual: impl std::fmt::Display) -> Self {
        PipelineError::InvalidState {
            expected: expected
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            actual: actual.to_string(),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        use crate::kernel::store::CapacityError;

        match err {
            StoreError::NotFound(what) => PipelineError::NotFound(what),
            StoreError::Capacity(CapacityError::InsufficientCredits) => {
                PipelineError::InsufficientCredits
            }
            StoreError::Capacity(CapacityError::ActiveAuditExists) => {
                PipelineError::ActiveJobExists("audit")
            }
            StoreError::Capacity(CapacityError::ActiveOptimizationExists) => {
                PipelineError::ActiveJobExists("optimization")
            }
            StoreError::Capacity(CapacityError::DuplicateSubmission) => {
                PipelineError::DuplicateSubmission
            }
            other => PipelineError::Storage(other),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::store::CapacityError;

    #[test]
    fn test_capacity_errors_map_from_store() {
        let err: PipelineError = StoreError::Capacity(CapacityError::ActiveAuditExists).into();
        assert!(matches!(err, PipelineError::ActiveJobExists("audit")));
        assert_eq!(err.category(), ErrorCategory::Capacity);
    }

    #[test]
    fn test_invalid_state_message() {
        let err = PipelineError::invalid_state(&["pending"], "completed");
        assert_eq!(
            err.to_string(),
            "Job is in status 'completed', expected one of: pending"
        );
        assert_eq!(err.category(), ErrorCategory::Invariant);
    }
}
