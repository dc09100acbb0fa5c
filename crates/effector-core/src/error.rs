use thiserror::Error;

/// Top-level error type for the Effector system.
///
/// Each variant wraps a subsystem-specific error. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for
/// EffectorError` so that the `?` operator works seamlessly across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EffectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for EffectorError {
    fn from(err: toml::de::Error) -> Self {
        EffectorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EffectorError {
    fn from(err: toml::ser::Error) -> Self {
        EffectorError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for EffectorError {
    fn from(err: serde_json::Error) -> Self {
        EffectorError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Effector operations.
pub type Result<T> = std::result::Result<T, EffectorError>;
