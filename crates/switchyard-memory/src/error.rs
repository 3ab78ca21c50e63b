use thiserror::Error;

use switchyard_core::error::SwitchyardError;

/// Errors raised by the conversation store.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("summarization error: {0}")]
    Summarization(String),
}

impl From<SwitchyardError> for MemoryError {
    fn from(err: SwitchyardError) -> Self {
        MemoryError::Storage(err.to_string())
    }
}

impl From<MemoryError> for SwitchyardError {
    fn from(err: MemoryError) -> Self {
        SwitchyardError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_storage() {
        let e = MemoryError::Storage("db offline".to_string());
        assert_eq!(e.to_string(), "storage error: db offline");
    }

    #[test]
    fn test_error_display_summarization() {
        let e = MemoryError::Summarization("range moved".to_string());
        assert_eq!(e.to_string(), "summarization error: range moved");
    }

    #[test]
    fn test_error_from_switchyard() {
        let e: MemoryError = SwitchyardError::Storage("locked".into()).into();
        assert!(matches!(e, MemoryError::Storage(_)));
        assert!(e.to_string().contains("locked"));
    }
}
