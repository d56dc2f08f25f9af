//! Session errors

use crate::types::SessionState;
use pnl_grid::{GridError, Violation};
use pnl_model::{ModelError, SessionId, TaskId};
use pnl_resolver::ResolveError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the session manager
#[derive(Debug, Error)]
pub enum SessionError {
    /// Observation value failed validation; the session is unchanged
    #[error("validation failed: {0}")]
    Validation(#[from] ModelError),

    /// A non-terminal task already exists for the conversation
    #[error("session {session_id} already runs task {task_id}")]
    TaskAlreadyActive {
        /// Conversation
        session_id: SessionId,
        /// Running task
        task_id: TaskId,
    },

    /// Task reached a terminal state
    #[error("task {task_id} is {state}")]
    SessionNotActive {
        /// Task
        task_id: TaskId,
        /// Terminal state it reached
        state: SessionState,
    },

    /// Task is confirming or building and takes no observations
    #[error("task {task_id} is {state} and not accepting observations")]
    SessionBusy {
        /// Task
        task_id: TaskId,
        /// Current state
        state: SessionState,
    },

    /// Nothing to return for the request
    #[error("not found: {0}")]
    NotFound(String),

    /// State machine refused the transition
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// Build refused while the grid has violations
    #[error("schedule has {} structural violation(s)", violations.len())]
    NotBuildable {
        /// Blocking violations
        violations: Vec<Violation>,
    },

    /// Build was interrupted by a cancel or close
    #[error("build interrupted; task is now {state}")]
    BuildInterrupted {
        /// State found when the export returned
        state: SessionState,
    },

    /// Observation belongs to a different conversation
    #[error("observation from session {got} sent to session {expected}")]
    ForeignObservation {
        /// Session owning the task
        expected: SessionId,
        /// Session on the observation
        got: SessionId,
    },

    /// Command needs a task intent
    #[error("no task intent detected")]
    NoTaskIntent,

    /// Adapter call failed
    #[error("external adapter failure: {0}")]
    ExternalAdapterFailure(#[from] AdapterError),

    /// Durable store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Grid could not be derived
    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Check if the error goes back to the user rather than being absorbed
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::TaskAlreadyActive { .. }
                | Self::SessionNotActive { .. }
                | Self::SessionBusy { .. }
                | Self::NotFound(_)
                | Self::IllegalTransition { .. }
                | Self::NotBuildable { .. }
                | Self::ForeignObservation { .. }
                | Self::NoTaskIntent
        )
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalAdapterFailure(e) => e.is_retryable(),
            Self::Store(StoreError::Io(_)) | Self::SessionBusy { .. } => true,
            _ => false,
        }
    }
}

impl From<ResolveError> for SessionError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Validation(e) => Self::Validation(e),
            other @ ResolveError::InvalidWeight { .. } => Self::Config(other.to_string()),
        }
    }
}

/// Failures from extraction, parsing, template and export collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Collaborator could not be reached
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    /// Collaborator took too long
    #[error("adapter timed out after {secs}s")]
    Timeout {
        /// Seconds waited
        secs: u64,
    },

    /// Collaborator answered with something unusable
    #[error("invalid adapter response: {0}")]
    InvalidResponse(String),

    /// Collaborator refused the input
    #[error("adapter rejected input: {0}")]
    Rejected(String),
}

impl AdapterError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Durable session store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_validation_maps_to_validation() {
        let err: SessionError = ResolveError::Validation(ModelError::OddCircuitCount(41)).into();
        assert!(matches!(err, SessionError::Validation(ModelError::OddCircuitCount(41))));
        assert!(err.is_surfaced());
    }

    #[test]
    fn adapter_timeouts_are_retryable() {
        let err = SessionError::from(AdapterError::Timeout { secs: 30 });
        assert!(err.is_retryable());
        assert!(!err.is_surfaced());
        assert!(!SessionError::from(AdapterError::Rejected("blurry".into())).is_retryable());
    }

    #[test]
    fn not_buildable_message_counts_violations() {
        let err = SessionError::NotBuildable {
            violations: vec![Violation::MissingLoadType { circuit: 3 }],
        };
        assert_eq!(err.to_string(), "schedule has 1 structural violation(s)");
    }
}
