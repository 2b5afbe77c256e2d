//! Orchestrator error taxonomy
//!
//! Every component returns typed errors; the lifecycle layer translates
//! driver errors into team status transitions, and the API layer translates
//! whatever remains into HTTP status codes. Nothing is swallowed silently.

use thiserror::Error;

/// Top-level error for orchestrator operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Malformed input; surfaced as 4xx, never logged as an incident
    #[error("validation: {0}")]
    Validation(String),

    /// Resource absent
    #[error("not found: {0}")]
    NotFound(String),

    /// State-machine violation (channel edit on a running team, duplicate
    /// team name, ...)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The container driver could not be reached; retry-safe
    #[error("container driver unavailable: {0}")]
    DriverUnavailable(String),

    /// The driver completed but the operation failed (image missing, port
    /// bind clash); operator intervention expected
    #[error("container driver failure: {0}")]
    DriverFailure(String),

    /// Temporary condition (chat gateway disconnected, send backlog full)
    #[error("transient: {0}")]
    Transient(String),

    /// Subscriber was too slow and its subscription was terminated
    #[error("subscription closed: delivery queue overflowed")]
    OverflowClosed,

    /// Anything else; surfaced as 500
    #[error("internal: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether retrying the same operation without operator intervention
    /// can succeed.
    #[allow(dead_code)] // API completeness
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self,
            OrchestratorError::DriverUnavailable(_) | OrchestratorError::Transient(_)
        )
    }

    /// Process exit code for CLI wrappers.
    ///
    /// 0 success, 64 usage/validation, 69 dependency unavailable,
    /// 70 internal, 75 transient.
    #[allow(dead_code)] // Exit-code contract for CLI wrappers
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::Validation(_)
            | OrchestratorError::NotFound(_)
            | OrchestratorError::Conflict(_) => 64,
            OrchestratorError::DriverUnavailable(_) => 69,
            OrchestratorError::Transient(_) => 75,
            OrchestratorError::DriverFailure(_)
            | OrchestratorError::OverflowClosed
            | OrchestratorError::Internal(_) => 70,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_safety_classification() {
        assert!(OrchestratorError::DriverUnavailable("no socket".into()).is_retry_safe());
        assert!(OrchestratorError::Transient("chat down".into()).is_retry_safe());
        assert!(!OrchestratorError::DriverFailure("no image".into()).is_retry_safe());
        assert!(!OrchestratorError::Conflict("dup name".into()).is_retry_safe());
        assert!(!OrchestratorError::Validation("empty".into()).is_retry_safe());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(OrchestratorError::Validation("x".into()).exit_code(), 64);
        assert_eq!(OrchestratorError::NotFound("x".into()).exit_code(), 64);
        assert_eq!(
            OrchestratorError::DriverUnavailable("x".into()).exit_code(),
            69
        );
        assert_eq!(OrchestratorError::Transient("x".into()).exit_code(), 75);
        assert_eq!(OrchestratorError::Internal("x".into()).exit_code(), 70);
        assert_eq!(OrchestratorError::DriverFailure("x".into()).exit_code(), 70);
    }
}
