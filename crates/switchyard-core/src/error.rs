use thiserror::Error;

use crate::reasoning::ReasoningError;

/// Top-level error type for Switchyard.
///
/// Subsystem crates define their own error enums and implement
/// `From<SubsystemError> for SwitchyardError` so that `?` crosses crate
/// boundaries without ceremony.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SwitchyardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),
}

impl From<toml::de::Error> for SwitchyardError {
    fn from(err: toml::de::Error) -> Self {
        SwitchyardError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SwitchyardError {
    fn from(err: toml::ser::Error) -> Self {
        SwitchyardError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SwitchyardError {
    fn from(err: serde_json::Error) -> Self {
        SwitchyardError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Switchyard operations.
pub type Result<T> = std::result::Result<T, SwitchyardError>;
