//! Request and response types for `process`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use switchyard_core::types::{HandlerId, HandlerResponse, RoutingDecision};
use switchyard_router::{CollaborationError, CollaborationKind, SynthesisError};

use crate::error::ValidationError;
use crate::state_machine::Stage;

/// The user's answer to an earlier confirmation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub approved: bool,
    /// Handler whose answer is being confirmed.
    pub handler_id: HandlerId,
}

/// Caller-supplied context for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessContext {
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
}

impl ProcessContext {
    pub fn confirming(handler_id: HandlerId, approved: bool) -> Self {
        Self {
            confirmation: Some(Confirmation { approved, handler_id }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Answered,
    Filtered,
    Fallback,
    AwaitingConfirmation,
    /// The input was rejected; nothing was persisted.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Standard,
    Collaborative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetadata {
    pub stage_trace: Vec<Stage>,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub workflow: WorkflowKind,
    /// Every handler that was invoked, primary first.
    pub handlers_used: Vec<HandlerId>,
    pub requires_collaboration: bool,
    pub collaboration_kind: Option<CollaborationKind>,
    pub collaborators: Vec<HandlerId>,
    pub collaboration_errors: Vec<CollaborationError>,
    pub synthesis_error: Option<SynthesisError>,
    /// Set whenever any degraded path was taken.
    pub fallback: bool,
    pub fallback_reason: Option<String>,
    pub routing_rationale: Option<String>,
    pub multi_step: bool,
}

/// Externally visible result of `process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub response: String,
    /// Handler id, `filtered` or `fallback`.
    pub handler_id: String,
    pub confidence: f64,
    pub structured_data: Option<serde_json::Value>,
    pub requires_confirmation: bool,
    pub status: ProcessStatus,
    pub thread_id: String,
    pub metadata: ProcessMetadata,
}

/// Working state of one request. Created per call and dropped with it.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    pub query: String,
    pub thread_id: String,
    pub context: ProcessContext,
    pub decision: Option<RoutingDecision>,
    /// Responses by handler, collaborators included.
    pub responses: BTreeMap<HandlerId, HandlerResponse>,
    /// The answer to return, after synthesis or fallback.
    pub response: Option<HandlerResponse>,
    pub validation_error: Option<ValidationError>,
    pub error: Option<String>,
    pub requires_collaboration: bool,
    pub collaboration_kind: Option<CollaborationKind>,
    pub collaborators: Vec<HandlerId>,
    pub collaboration_errors: Vec<CollaborationError>,
    pub synthesis_error: Option<SynthesisError>,
    pub handlers_used: Vec<HandlerId>,
    pub excluded: Vec<HandlerId>,
    pub retries: u32,
    pub multi_step: bool,
    pub fallback_used: bool,
    pub trace: Vec<Stage>,
}

impl OrchestrationState {
    pub fn new(query: &str, thread_id: String, context: ProcessContext) -> Self {
        Self {
            query: query.to_string(),
            thread_id,
            context,
            decision: None,
            responses: BTreeMap::new(),
            response: None,
            validation_error: None,
            error: None,
            requires_collaboration: false,
            collaboration_kind: None,
            collaborators: Vec::new(),
            collaboration_errors: Vec::new(),
            synthesis_error: None,
            handlers_used: Vec::new(),
            excluded: Vec::new(),
            retries: 0,
            multi_step: false,
            fallback_used: false,
            trace: Vec::new(),
        }
    }

    pub fn chosen_handler(&self) -> Option<&HandlerId> {
        self.decision.as_ref().and_then(|d| d.handler_id())
    }

    /// Reset the per-attempt fields before a retry after rejection.
    pub fn reset_attempt(&mut self) {
        self.decision = None;
        self.response = None;
        self.error = None;
        self.requires_collaboration = false;
        self.collaboration_kind = None;
        self.collaborators.clear();
        self.collaboration_errors.clear();
        self.synthesis_error = None;
        self.multi_step = false;
    }
}
