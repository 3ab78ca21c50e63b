//! Request-processing stages and the pure transition function between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Classify,
    Invoke,
    Confirm,
    /// Terminal for this call: the user must confirm before continuing.
    AwaitingConfirmation,
    Fallback,
    Persist,
    Finalize,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Finalize | Stage::AwaitingConfirmation)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validate => "validate",
            Stage::Classify => "classify",
            Stage::Invoke => "invoke",
            Stage::Confirm => "confirm",
            Stage::AwaitingConfirmation => "awaiting_confirmation",
            Stage::Fallback => "fallback",
            Stage::Persist => "persist",
            Stage::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// What a stage reported when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Input accepted.
    Valid,
    /// Input accepted and carries a confirmation for an earlier answer.
    Resume,
    Invalid,
    Routed,
    Filtered,
    /// No usable handler for the decision.
    Unroutable,
    Answered { needs_confirmation: bool },
    HandlerFailed,
    /// Confirmation required but not supplied.
    NoAnswer,
    Approved,
    Rejected { retry_allowed: bool },
    Degraded { persist: bool },
    Persisted,
}

/// The next stage after `stage` reported `outcome`.
pub fn next_stage(stage: Stage, outcome: StageOutcome) -> Result<Stage, ChatError> {
    use StageOutcome::*;

    let next = match (stage, outcome) {
        (Stage::Validate, Valid) => Stage::Classify,
        (Stage::Validate, Resume) => Stage::Invoke,
        (Stage::Validate, Invalid) => Stage::Fallback,

        (Stage::Classify, Routed) => Stage::Invoke,
        (Stage::Classify, Filtered) => Stage::Persist,
        (Stage::Classify, Unroutable) => Stage::Fallback,

        (Stage::Invoke, Answered { needs_confirmation: true }) => Stage::Confirm,
        (Stage::Invoke, Answered { needs_confirmation: false }) => Stage::Persist,
        (Stage::Invoke, HandlerFailed) => Stage::Fallback,

        (Stage::Confirm, NoAnswer) => Stage::AwaitingConfirmation,
        (Stage::Confirm, Approved) => Stage::Persist,
        (Stage::Confirm, Rejected { retry_allowed: true }) => Stage::Classify,
        (Stage::Confirm, Rejected { retry_allowed: false }) => Stage::Fallback,

        (Stage::Fallback, Degraded { persist: true }) => Stage::Persist,
        (Stage::Fallback, Degraded { persist: false }) => Stage::Finalize,

        (Stage::Persist, Persisted) => Stage::Finalize,

        (stage, outcome) => return Err(ChatError::InvalidTransition(stage, format!("{:?}", outcome))),
    };
    Ok(next)
}
