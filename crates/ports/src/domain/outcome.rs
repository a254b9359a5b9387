#![forbid(unsafe_code)]

use std::fmt;

/// How one termination attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The process was not running when the attempt started. No signal sent.
    AlreadyGone,
    GracefullyStopped,
    ForceStopped,
    /// The process stopped but came back under a supervisor.
    RespawnedByManager { manager: String, stop_hint: String },
    PermissionDenied(String),
    /// Scheduler state that will not react to signals (`D` or `Z`).
    Unkillable(char),
    VerificationFailed(String),
    Error(String),
}

impl TerminationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::AlreadyGone | Self::GracefullyStopped | Self::ForceStopped
        )
    }

    /// Whether a signal actually ended the process during this attempt.
    pub fn stopped(&self) -> bool {
        matches!(self, Self::GracefullyStopped | Self::ForceStopped)
    }
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyGone => write!(f, "already gone"),
            Self::GracefullyStopped => write!(f, "stopped gracefully"),
            Self::ForceStopped => write!(f, "stopped after force signal"),
            Self::RespawnedByManager { manager, stop_hint } => write!(
                f,
                "respawned (managed by {manager}); stop the service instead: {stop_hint}"
            ),
            Self::PermissionDenied(reason) => write!(f, "permission denied: {reason}"),
            Self::Unkillable(state) => write!(
                f,
                "process is in state {state} and cannot be signalled; \
                 it is usually waiting on kernel I/O and may resolve on its own"
            ),
            Self::VerificationFailed(reason) => write!(
                f,
                "process verification failed (PID may have been reused): {reason}"
            ),
            Self::Error(detail) => write!(f, "{detail}"),
        }
    }
}
