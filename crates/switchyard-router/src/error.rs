//! Error types for routing, handlers and collaboration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use switchyard_core::reasoning::ReasoningError;
use switchyard_core::types::HandlerId;

/// Errors from a specialist handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),
    #[error("Handler not registered: {0}")]
    Unregistered(HandlerId),
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),
    #[error("Domain data unavailable: {0}")]
    Data(#[from] DataError),
    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),
}

/// Errors from a domain data source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("no data for {0}")]
    NotFound(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Why the reasoning path of the classifier could not produce a handler.
/// Never surfaced to callers; the classifier degrades instead.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),
    #[error("Output outside the allowed set: {0:?}")]
    OutOfSet(String),
}

/// A collaborator that did not contribute. Kept as data on the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("collaborator {handler} failed: {message}")]
pub struct CollaborationError {
    pub handler: HandlerId,
    pub message: String,
}

/// A merged answer that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum SynthesisError {
    #[error("response too short ({0} chars)")]
    TooShort(usize),
    #[error("response carries an error marker")]
    ErrorMarker,
    #[error("confidence {0:.2} below threshold")]
    LowConfidence(f64),
}
