//! Error types for the action engine.

use effector_core::error::EffectorError;

use crate::types::ActionKind;

/// Errors raised by backend collaborators during execution.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend not available: {0}")]
    Unavailable(String),
    #[error("Unknown {kind} command: {command}")]
    UnknownCommand { kind: ActionKind, command: String },
    #[error("Invalid action args: {0}")]
    InvalidArgs(String),
    #[error("Backend execution failed: {0}")]
    Execution(String),
    #[error("Backend call timed out after {0} seconds")]
    Timeout(u64),
    #[error("Storage error: {0}")]
    Storage(#[from] EffectorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors the coordinator surfaces synchronously, at submit or undo time.
///
/// Once an action is queued, failures surface only through the journal;
/// these cover what can be detected before enqueue.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("No backend registered for kind: {0}")]
    UnknownKind(ActionKind),
    #[error("Action denied by policy: {0}")]
    PolicyDenied(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors from queue lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue worker did not stop within {0} seconds")]
    ShutdownTimeout(u64),
    #[error("Queue worker failed: {0}")]
    WorkerFailed(String),
}

impl From<ExecuteError> for EffectorError {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::PolicyDenied(msg) => EffectorError::Policy(msg),
            ExecuteError::Storage(msg) => EffectorError::Storage(msg),
            other => EffectorError::Backend(other.to_string()),
        }
    }
}

impl From<QueueError> for EffectorError {
    fn from(err: QueueError) -> Self {
        EffectorError::Queue(err.to_string())
    }
}
