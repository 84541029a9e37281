use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the gate's library surface.
#[derive(Debug, Error)]
pub enum GateError {
    /// The original app could not be relaunched because it has no launch entry point.
    #[error("Unable to launch '{package}': {reason}")]
    TargetResolutionFailure { package: String, reason: String },

    /// No puzzle could be obtained for a challenge. The target stays blocked.
    #[error("No challenge available: {0}")]
    ChallengeSourceUnavailable(String),

    /// The configured challenge presentation has no builtin implementation.
    #[error("Challenge presentation not found: {0}")]
    ConfigClassMissing(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid puzzle: {0}")]
    InvalidPuzzle(String),

    /// Session expiry needs a running tokio runtime.
    #[error("Session scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
