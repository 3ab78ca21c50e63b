//! Error types for request orchestration.

use switchyard_core::error::SwitchyardError;
use switchyard_memory::MemoryError;

use crate::state_machine::Stage;

/// Input rejected before it reaches any handler. The only error that
/// changes the shape of a `process` result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("query cannot be empty")]
    EmptyQuery,
}

/// Errors from the chat engine's fallible entry points (construction,
/// history, insights). `process` itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid stage transition: {0} on {1}")]
    InvalidTransition(Stage, String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<SwitchyardError> for ChatError {
    fn from(err: SwitchyardError) -> Self {
        match err {
            SwitchyardError::Config(msg) => ChatError::Config(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<MemoryError> for ChatError {
    fn from(err: MemoryError) -> Self {
        ChatError::Storage(err.to_string())
    }
}
