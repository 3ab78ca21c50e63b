//! Request processing for Switchyard.
//!
//! Validates a query, routes it to a line specialist (with collaborators when
//! the question spans lines), optionally asks the user to confirm multi-step
//! answers, and records the turn in the conversation store.

pub mod complexity;
pub mod error;
pub mod orchestrator;
pub mod sanitize;
pub mod state_machine;
pub mod types;

pub use complexity::ComplexityDetector;
pub use error::{ChatError, ValidationError};
pub use orchestrator::Orchestrator;
pub use sanitize::{new_thread_id, sanitize_query, sanitize_thread_id};
pub use state_machine::{next_stage, Stage, StageOutcome};
pub use types::{
    Confirmation, OrchestrationState, ProcessContext, ProcessMetadata, ProcessResult, ProcessStatus,
    WorkflowKind,
};
