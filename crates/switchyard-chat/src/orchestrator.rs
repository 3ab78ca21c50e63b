//! Request orchestrator.
//!
//! Drives one query through the stage machine: validate, classify, invoke
//! (alone or with collaborators), optionally confirm, fall back, persist and
//! finalize. `process` never returns an error; every failure becomes a
//! degraded but well-formed [`ProcessResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use switchyard_core::config::{OrchestrationConfig, RoutingConfig, SwitchyardConfig};
use switchyard_core::reasoning::SharedProvider;
use switchyard_core::types::{
    ConversationSummary, HandlerId, HandlerResponse, MessageMetadata, Role, Route, RoutingDecision,
};
use switchyard_memory::{ConversationInsights, ConversationStore, History, Summarizer, TopicExtractor};
use switchyard_router::{
    confidence, invoke_handler, ClassificationContext, Classifier, CollaborationCoordinator,
    CollaborationPlan, HandlerContext, HandlerError, HandlerRegistry, RoutingTables, SharedDataProvider,
};
use switchyard_storage::{ConversationRepository, Database};

use crate::complexity::ComplexityDetector;
use crate::error::ChatError;
use crate::sanitize::{sanitize_query, sanitize_thread_id};
use crate::state_machine::{next_stage, Stage, StageOutcome};
use crate::types::{
    OrchestrationState, ProcessContext, ProcessMetadata, ProcessResult, ProcessStatus, WorkflowKind,
};

/// Recent messages handed to a handler as context.
const HANDLER_HISTORY: u32 = 10;

/// Ceiling on the reported confidence once any degraded path was taken.
const DEGRADED_CONFIDENCE_CAP: f64 = 0.5;

const FALLBACK_HANDLER: &str = "fallback";

const FALLBACK_MESSAGE: &str = "Sorry, I couldn't get a full answer to that right now. \
    Please try again shortly, or check the live status board for the latest service information.";

const VALIDATION_MESSAGE: &str = "Please ask a question about the London Underground, \
    for example \"Is the Victoria line running?\"";

pub struct Orchestrator {
    classifier: Classifier,
    registry: Arc<HandlerRegistry>,
    coordinator: CollaborationCoordinator,
    store: Arc<ConversationStore>,
    provider: SharedProvider,
    complexity: ComplexityDetector,
    routing: RoutingConfig,
    orchestration: OrchestrationConfig,
    reasoning_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &SwitchyardConfig,
        provider: SharedProvider,
        registry: Arc<HandlerRegistry>,
        store: Arc<ConversationStore>,
    ) -> Result<Self, ChatError> {
        let tables = Arc::new(RoutingTables::compile(&config.catalog)?);
        let classifier = Classifier::new(Arc::clone(&tables), &config.routing, &config.reasoning);
        let coordinator = CollaborationCoordinator::new(
            Arc::clone(&registry),
            tables,
            config.collaboration.clone(),
            config.orchestration.handler_timeout(),
        );

        tracing::info!(handlers = registry.len(), "Orchestrator ready");
        Ok(Self {
            classifier,
            registry,
            coordinator,
            store,
            provider,
            complexity: ComplexityDetector::new(),
            routing: config.routing.clone(),
            orchestration: config.orchestration.clone(),
            reasoning_timeout: config.reasoning.timeout(),
        })
    }

    /// Wire a complete engine over `database`: one line specialist per
    /// catalog profile and a summarizing conversation store.
    pub fn from_parts(
        config: &SwitchyardConfig,
        provider: SharedProvider,
        database: Arc<Database>,
        data: SharedDataProvider,
    ) -> Result<Self, ChatError> {
        let registry = Arc::new(HandlerRegistry::from_catalog(&config.catalog, data));
        let summarizer = Summarizer::new(
            Arc::clone(&provider),
            config.reasoning.timeout(),
            config.memory.max_topics,
            TopicExtractor::from_catalog(&config.catalog),
        );
        let store = Arc::new(ConversationStore::new(
            ConversationRepository::new(database),
            summarizer,
            config.memory.clone(),
        ));
        Self::new(config, provider, registry, store)
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Answer one query within a conversation thread.
    ///
    /// A missing or unusable `thread_id` starts a new thread. Successful
    /// answers are persisted as a user/assistant pair; validation failures
    /// and answers awaiting confirmation are not.
    pub async fn process(&self, query: &str, thread_id: Option<&str>, context: ProcessContext) -> ProcessResult {
        let started = Instant::now();
        let thread_id = sanitize_thread_id(thread_id, self.routing.max_thread_id_chars);
        let mut state = OrchestrationState::new(query, thread_id, context);
        let mut stage = Stage::Validate;

        while !stage.is_terminal() {
            state.trace.push(stage);
            let outcome = match stage {
                Stage::Validate => self.validate(&mut state),
                Stage::Classify => self.classify(&mut state).await,
                Stage::Invoke => self.invoke(&mut state).await,
                Stage::Confirm => self.confirm(&mut state),
                Stage::Fallback => self.fallback(&mut state),
                Stage::Persist => self.persist(&mut state).await,
                Stage::AwaitingConfirmation | Stage::Finalize => break,
            };

            stage = match next_stage(stage, outcome) {
                Ok(next) => {
                    tracing::debug!(thread_id = %state.thread_id, from = %stage, to = %next, "Stage transition");
                    next
                }
                Err(e) => {
                    tracing::error!(thread_id = %state.thread_id, error = %e, "Aborting request");
                    state.fallback_used = true;
                    state.error.get_or_insert_with(|| e.to_string());
                    Stage::Finalize
                }
            };
        }
        state.trace.push(stage);

        let result = self.finalize(state, stage, started);
        tracing::info!(
            thread_id = %result.thread_id,
            handler = %result.handler_id,
            status = ?result.status,
            confidence = result.confidence,
            elapsed_ms = result.metadata.processing_time_ms,
            "Query processed"
        );
        result
    }

    fn validate(&self, state: &mut OrchestrationState) -> StageOutcome {
        let query = match sanitize_query(&state.query, self.routing.max_query_chars) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(thread_id = %state.thread_id, error = %e, "Query rejected");
                state.validation_error = Some(e);
                return StageOutcome::Invalid;
            }
        };
        state.query = query;

        let Some(confirmation) = state.context.confirmation.clone() else {
            return StageOutcome::Valid;
        };
        if !self.registry.contains(&confirmation.handler_id) {
            tracing::warn!(
                thread_id = %state.thread_id,
                handler = %confirmation.handler_id,
                "Confirmation names an unknown handler, classifying afresh"
            );
            state.context.confirmation = None;
            return StageOutcome::Valid;
        }
        if let Some(reason) = self.classifier.filter(&state.query) {
            tracing::info!(
                thread_id = %state.thread_id,
                handler = %confirmation.handler_id,
                reason = %reason,
                "Confirmation dropped for filtered query"
            );
            state.context.confirmation = None;
            return StageOutcome::Valid;
        }

        let scored = confidence::score(self.classifier.tables(), &state.query, &confirmation.handler_id);
        state.decision = Some(RoutingDecision::handler(
            confirmation.handler_id,
            scored.value,
            "resumed after confirmation",
        ));
        StageOutcome::Resume
    }

    async fn classify(&self, state: &mut OrchestrationState) -> StageOutcome {
        let context = ClassificationContext::excluding(state.excluded.clone());
        let decision = self.classifier.classify(&state.query, &self.provider, &context).await;
        tracing::info!(
            thread_id = %state.thread_id,
            handler = %decision.label(),
            confidence = decision.confidence,
            fallback = decision.fallback,
            "Query classified"
        );

        if decision.fallback {
            state.fallback_used = true;
        }
        let outcome = match &decision.route {
            Route::Filtered(reason) => {
                state.response = Some(HandlerResponse::answered(reason.canned_message(), None, decision.confidence));
                StageOutcome::Filtered
            }
            Route::Handler(id) if self.registry.contains(id) => StageOutcome::Routed,
            Route::Handler(id) => {
                state.error = Some(HandlerError::Unregistered(id.clone()).to_string());
                StageOutcome::Unroutable
            }
        };
        state.decision = Some(decision);
        outcome
    }

    async fn invoke(&self, state: &mut OrchestrationState) -> StageOutcome {
        let Some(primary) = state.chosen_handler().cloned() else {
            state.error = Some("no handler chosen".to_string());
            return StageOutcome::HandlerFailed;
        };

        let history = self.store.recent(&state.thread_id, HANDLER_HISTORY).unwrap_or_else(|e| {
            tracing::warn!(thread_id = %state.thread_id, error = %e, "History unavailable for handler context");
            Vec::new()
        });
        let mut context = HandlerContext::new(state.thread_id.clone(), self.reasoning_timeout).with_history(history);
        if let Some(decision) = &state.decision {
            context = context.with_confidence(decision.confidence);
        }

        let result = match self.coordinator.plan(&state.query, &primary) {
            Some(plan) if !plan.collaborators.is_empty() => {
                state.requires_collaboration = true;
                state.collaboration_kind = Some(plan.kind);
                state.collaborators = plan.collaborators.clone();
                self.invoke_collaborative(state, &primary, plan, &context).await
            }
            _ => self.invoke_single(state, &primary, &context).await,
        };

        match result {
            Ok(response) if response.is_error() => {
                tracing::warn!(
                    thread_id = %state.thread_id,
                    handler = %primary,
                    error = response.error.as_deref().unwrap_or_default(),
                    "Handler returned a degraded answer"
                );
                state.error = response.error.clone();
                state.response = Some(response);
                StageOutcome::HandlerFailed
            }
            Ok(response) => {
                state.multi_step = self.complexity.is_multi_step(&state.query, &response.text);
                state.response = Some(response);
                let needs_confirmation = state.retries == 0
                    && (state.context.confirmation.is_some()
                        || (self.orchestration.confirmation_enabled && state.multi_step));
                StageOutcome::Answered { needs_confirmation }
            }
            Err(e) => {
                tracing::warn!(thread_id = %state.thread_id, handler = %primary, error = %e, "Handler failed");
                state.error = Some(e.to_string());
                StageOutcome::HandlerFailed
            }
        }
    }

    async fn invoke_single(
        &self,
        state: &mut OrchestrationState,
        id: &HandlerId,
        context: &HandlerContext,
    ) -> Result<HandlerResponse, HandlerError> {
        state.handlers_used.push(id.clone());
        let handler = self.registry.get(id)?;
        let response = invoke_handler(
            handler.as_ref(),
            &state.query,
            &self.provider,
            context,
            self.orchestration.handler_timeout(),
        )
        .await?;
        state.responses.insert(id.clone(), response.clone());
        Ok(response)
    }

    async fn invoke_collaborative(
        &self,
        state: &mut OrchestrationState,
        primary: &HandlerId,
        plan: CollaborationPlan,
        context: &HandlerContext,
    ) -> Result<HandlerResponse, HandlerError> {
        state.handlers_used.push(primary.clone());
        let outcome = self
            .coordinator
            .run(&state.query, primary, plan, &self.provider, context)
            .await?;

        for id in &outcome.plan.collaborators {
            if outcome.responses.contains_key(id) || outcome.errors.iter().any(|e| &e.handler == id) {
                state.handlers_used.push(id.clone());
            }
        }
        let primary_failed = outcome.primary_failed(primary);
        let error = outcome.responses.get(primary).and_then(|r| r.error.clone());
        state.responses.extend(outcome.responses);
        state.collaboration_errors = outcome.errors;
        if let Some(e) = &outcome.synthesis_error {
            state.fallback_used = true;
            state.error = Some(format!("synthesis rejected: {}", e));
        }
        state.synthesis_error = outcome.synthesis_error;

        let synthesis = outcome.synthesis;
        let mut response = HandlerResponse::answered(synthesis.text, synthesis.structured_data, synthesis.confidence);
        if primary_failed {
            response.error = error.or_else(|| Some("primary handler failed".to_string()));
        }
        Ok(response)
    }

    fn confirm(&self, state: &mut OrchestrationState) -> StageOutcome {
        let Some(confirmation) = state.context.confirmation.take() else {
            return StageOutcome::NoAnswer;
        };
        if confirmation.approved {
            return StageOutcome::Approved;
        }

        let rejected = state.chosen_handler().cloned().unwrap_or(confirmation.handler_id);
        state.retries += 1;
        let retry_allowed = state.retries <= self.orchestration.max_confirmation_retries;
        tracing::info!(
            thread_id = %state.thread_id,
            handler = %rejected,
            retries = state.retries,
            retry_allowed,
            "Answer rejected by user"
        );
        state.excluded.push(rejected);
        if retry_allowed {
            state.reset_attempt();
        } else {
            state.error = Some("answer rejected and no retries left".to_string());
        }
        StageOutcome::Rejected { retry_allowed }
    }

    fn fallback(&self, state: &mut OrchestrationState) -> StageOutcome {
        state.fallback_used = true;

        if let Some(err) = &state.validation_error {
            state.response = Some(HandlerResponse {
                text: VALIDATION_MESSAGE.to_string(),
                structured_data: None,
                confidence: 0.0,
                error: Some(err.to_string()),
            });
            return StageOutcome::Degraded { persist: false };
        }

        let reason = state.error.clone().unwrap_or_else(|| "unknown failure".to_string());
        tracing::warn!(thread_id = %state.thread_id, reason = %reason, "Falling back to a generic answer");
        let partial = state.response.take().and_then(|r| r.structured_data);
        state.response = Some(HandlerResponse::partial(FALLBACK_MESSAGE, partial, reason));
        StageOutcome::Degraded { persist: true }
    }

    async fn persist(&self, state: &mut OrchestrationState) -> StageOutcome {
        let Some(response) = &state.response else {
            return StageOutcome::Persisted;
        };
        let assistant = MessageMetadata {
            handler_id: Some(handler_label(state)),
            confidence: Some(final_confidence(state)),
            structured_data: response.structured_data.clone(),
        };
        let entries = vec![
            (Role::User, state.query.clone(), MessageMetadata::default()),
            (Role::Assistant, response.text.clone(), assistant),
        ];
        if let Err(e) = self.store.append_all(&state.thread_id, entries).await {
            tracing::warn!(thread_id = %state.thread_id, error = %e, "Failed to persist conversation turn");
        }
        StageOutcome::Persisted
    }

    fn finalize(&self, state: OrchestrationState, stage: Stage, started: Instant) -> ProcessResult {
        let awaiting = stage == Stage::AwaitingConfirmation;
        let status = if awaiting {
            ProcessStatus::AwaitingConfirmation
        } else if state.validation_error.is_some() {
            ProcessStatus::Rejected
        } else if state.response.as_ref().map_or(true, |r| r.is_error()) {
            ProcessStatus::Fallback
        } else if state.decision.as_ref().is_some_and(|d| d.filter_reason().is_some()) {
            ProcessStatus::Filtered
        } else {
            ProcessStatus::Answered
        };

        let handler_id = handler_label(&state);
        let confidence = final_confidence(&state);
        let fallback = state.fallback_used || status == ProcessStatus::Fallback;
        let (response, structured_data) = match &state.response {
            Some(r) if awaiting => (self.confirmation_prompt(&handler_id), r.structured_data.clone()),
            Some(r) => (r.text.clone(), r.structured_data.clone()),
            None => (FALLBACK_MESSAGE.to_string(), None),
        };

        let workflow = if state.requires_collaboration && state.handlers_used.len() > 1 {
            WorkflowKind::Collaborative
        } else {
            WorkflowKind::Standard
        };

        ProcessResult {
            response,
            handler_id,
            confidence,
            structured_data,
            requires_confirmation: awaiting,
            status,
            thread_id: state.thread_id,
            metadata: ProcessMetadata {
                stage_trace: state.trace,
                processing_time_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                workflow,
                handlers_used: state.handlers_used,
                requires_collaboration: state.requires_collaboration,
                collaboration_kind: state.collaboration_kind,
                collaborators: state.collaborators,
                collaboration_errors: state.collaboration_errors,
                synthesis_error: state.synthesis_error,
                fallback,
                fallback_reason: if fallback {
                    state.error.or_else(|| state.decision.as_ref().map(|d| d.rationale.clone()))
                } else {
                    None
                },
                routing_rationale: state.decision.map(|d| d.rationale),
                multi_step: state.multi_step,
            },
        }
    }

    fn confirmation_prompt(&self, handler_id: &str) -> String {
        let name = self.classifier.tables().display_name(&HandlerId::new(handler_id));
        format!(
            "This journey involves more than one step on the {} line. \
             Confirm and I'll give you the full answer, or decline and I'll ask another line.",
            name
        )
    }

    // =========================================================================
    // Conversation reads
    // =========================================================================

    /// Recent messages for a thread, or the enriched view (summaries plus
    /// recent messages). `limit` defaults to the configured history size.
    pub fn history(&self, thread_id: &str, limit: Option<u32>, enrich: bool) -> Result<History, ChatError> {
        let limit = limit.unwrap_or(self.store.config().history_limit);
        Ok(self.store.history(thread_id, limit, enrich)?)
    }

    pub fn insights(&self, thread_id: &str) -> Result<Option<ConversationInsights>, ChatError> {
        Ok(self.store.insights(thread_id)?)
    }

    /// Summarize whatever the thread has not yet summarized.
    pub async fn summarize_now(&self, thread_id: &str) -> Result<Option<ConversationSummary>, ChatError> {
        Ok(self.store.summarize_now(thread_id).await?)
    }

    /// Wait for background summarization to finish.
    pub async fn shutdown(&self) {
        self.store.drain_background().await;
    }
}

/// Label stored with the assistant message and returned to the caller.
fn handler_label(state: &OrchestrationState) -> String {
    let degraded = state.response.as_ref().map_or(true, |r| r.is_error());
    match &state.decision {
        Some(decision) if !degraded => decision.label(),
        _ => FALLBACK_HANDLER.to_string(),
    }
}

fn final_confidence(state: &OrchestrationState) -> f64 {
    let raw = state.response.as_ref().map_or(0.0, |r| r.confidence);
    let degraded = state.fallback_used || state.decision.as_ref().is_some_and(|d| d.fallback);
    if degraded {
        raw.min(DEGRADED_CONFIDENCE_CAP)
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::reasoning::ReasoningError;
    use switchyard_core::types::FilterReason;
    use switchyard_llm::{Reply, ScriptedProvider};
    use switchyard_router::{LineSpecialist, StaticDataProvider};

    fn engine(provider: ScriptedProvider, config: SwitchyardConfig) -> (Orchestrator, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let data: SharedDataProvider = Arc::new(StaticDataProvider::for_profiles(&config.catalog.handlers));
        let db = Arc::new(Database::in_memory().unwrap());
        let orchestrator = Orchestrator::from_parts(&config, provider.clone(), db, data).unwrap();
        (orchestrator, provider)
    }

    fn history_len(o: &Orchestrator, thread: &str) -> usize {
        match o.history(thread, None, false).unwrap() {
            History::Messages(m) => m.len(),
            History::Enriched(e) => e.recent_messages.len(),
        }
    }

    // ---- validation ----

    #[tokio::test]
    async fn test_empty_query_rejected_without_persisting() {
        let (o, provider) = engine(ScriptedProvider::echo(), SwitchyardConfig::default());
        let result = o.process("   ", Some("t-empty"), ProcessContext::default()).await;

        assert_eq!(result.status, ProcessStatus::Rejected);
        assert_eq!(result.handler_id, "fallback");
        assert_eq!(result.confidence, 0.0);
        assert!(result.metadata.fallback);
        assert_eq!(result.metadata.stage_trace, vec![Stage::Validate, Stage::Fallback, Stage::Finalize]);
        assert_eq!(provider.call_count(), 0);
        assert_eq!(history_len(&o, "t-empty"), 0);
    }

    #[tokio::test]
    async fn test_thread_id_generated_when_missing() {
        let (o, _) = engine(ScriptedProvider::echo(), SwitchyardConfig::default());
        let result = o.process("Circle line status", None, ProcessContext::default()).await;
        assert!(result.thread_id.starts_with("thread_"));
        assert_eq!(history_len(&o, &result.thread_id), 2);
    }

    // ---- filtering ----

    #[tokio::test]
    async fn test_off_topic_query_filtered_and_persisted() {
        let (o, provider) = engine(ScriptedProvider::echo(), SwitchyardConfig::default());
        let result = o.process("What's the weather tomorrow?", Some("t-filter"), ProcessContext::default()).await;

        assert_eq!(result.status, ProcessStatus::Filtered);
        assert_eq!(result.handler_id, "filtered");
        assert_eq!(result.response, FilterReason::OffTopic.canned_message());
        assert_eq!(
            result.metadata.stage_trace,
            vec![Stage::Validate, Stage::Classify, Stage::Persist, Stage::Finalize]
        );
        assert_eq!(provider.call_count(), 0);
        assert_eq!(history_len(&o, "t-filter"), 2);
    }

    #[tokio::test]
    async fn test_confirmation_does_not_bypass_content_filter() {
        let (o, provider) = engine(ScriptedProvider::echo(), SwitchyardConfig::default());
        let ctx = ProcessContext::confirming(HandlerId::new("CENTRAL"), true);
        let result = o.process("you fucking idiot, Central line", Some("t-abuse"), ctx).await;

        assert_eq!(result.status, ProcessStatus::Filtered);
        assert_eq!(result.handler_id, "filtered");
        assert_eq!(result.response, FilterReason::Inappropriate.canned_message());
        assert_eq!(
            result.metadata.stage_trace,
            vec![Stage::Validate, Stage::Classify, Stage::Persist, Stage::Finalize]
        );
        assert!(result.metadata.handlers_used.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    // ---- handler failure ----

    #[tokio::test]
    async fn test_handler_failure_keeps_partial_data() {
        let provider = ScriptedProvider::echo()
            .on_system("router", Reply::text("CENTRAL"))
            .on_system("specialist", Reply::Fail(ReasoningError::Transport("connection reset".into())));
        let (o, _) = engine(provider, SwitchyardConfig::default());

        let result = o.process("Is it busy around Holborn today?", Some("t-fail"), ProcessContext::default()).await;

        assert_eq!(result.status, ProcessStatus::Fallback);
        assert_eq!(result.handler_id, "fallback");
        assert!((result.confidence - 0.1).abs() < 1e-9);
        assert!(result.structured_data.is_some());
        assert!(result.metadata.fallback);
        assert!(result.metadata.fallback_reason.unwrap().contains("connection reset"));
        assert_eq!(history_len(&o, "t-fail"), 2);
    }

    #[tokio::test]
    async fn test_unregistered_handler_falls_back() {
        let config = SwitchyardConfig::default();
        let provider = Arc::new(ScriptedProvider::echo().on_system("router", Reply::text("JUBILEE")));
        let data: SharedDataProvider = Arc::new(StaticDataProvider::for_profiles(&config.catalog.handlers));

        let mut registry = HandlerRegistry::new();
        let circle = config.catalog.profile("CIRCLE").unwrap().clone();
        registry.register(Arc::new(LineSpecialist::new(circle, data)));

        let summarizer = Summarizer::new(
            provider.clone(),
            config.reasoning.timeout(),
            config.memory.max_topics,
            TopicExtractor::from_catalog(&config.catalog),
        );
        let repo = ConversationRepository::new(Arc::new(Database::in_memory().unwrap()));
        let store = Arc::new(ConversationStore::new(repo, summarizer, config.memory.clone()));
        let o = Orchestrator::new(&config, provider, Arc::new(registry), store).unwrap();

        let result = o.process("Is it busy around Holborn today?", Some("t-unreg"), ProcessContext::default()).await;
        assert_eq!(result.status, ProcessStatus::Fallback);
        assert_eq!(
            result.metadata.stage_trace,
            vec![Stage::Validate, Stage::Classify, Stage::Fallback, Stage::Persist, Stage::Finalize]
        );
        assert!(result.metadata.fallback_reason.unwrap().contains("JUBILEE"));
    }

    // ---- confirmation ----

    fn confirming_config(retries: u32) -> SwitchyardConfig {
        let mut config = SwitchyardConfig::default();
        config.orchestration.confirmation_enabled = true;
        config.orchestration.max_confirmation_retries = retries;
        config
    }

    fn confirming_provider() -> ScriptedProvider {
        ScriptedProvider::echo()
            .on_system("router", Reply::text("BAKERLOO"))
            .on_system(
                "Victoria line specialist",
                Reply::text("Take the Victoria line southbound and change at Green Park for the Jubilee line."),
            )
            .on_system("Bakerloo line specialist", Reply::text("The Bakerloo line runs a good service to Elephant & Castle."))
    }

    #[tokio::test]
    async fn test_multi_step_answer_awaits_confirmation() {
        let (o, _) = engine(confirming_provider(), confirming_config(1));
        let result = o.process("Victoria line towards Brixton please", Some("t-c1"), ProcessContext::default()).await;

        assert_eq!(result.status, ProcessStatus::AwaitingConfirmation);
        assert!(result.requires_confirmation);
        assert_eq!(result.handler_id, "VICTORIA");
        assert!(result.metadata.multi_step);
        assert_eq!(result.metadata.stage_trace.last(), Some(&Stage::AwaitingConfirmation));
        assert_eq!(history_len(&o, "t-c1"), 0);
    }

    #[tokio::test]
    async fn test_approved_confirmation_persists_answer() {
        let (o, _) = engine(confirming_provider(), confirming_config(1));
        let ctx = ProcessContext::confirming(HandlerId::new("VICTORIA"), true);
        let result = o.process("Victoria line towards Brixton please", Some("t-c2"), ctx).await;

        assert_eq!(result.status, ProcessStatus::Answered);
        assert_eq!(result.handler_id, "VICTORIA");
        assert!(result.response.contains("Green Park"));
        assert_eq!(
            result.metadata.stage_trace,
            vec![Stage::Validate, Stage::Invoke, Stage::Confirm, Stage::Persist, Stage::Finalize]
        );
        assert_eq!(history_len(&o, "t-c2"), 2);
    }

    #[tokio::test]
    async fn test_rejected_confirmation_reroutes_once() {
        let (o, _) = engine(confirming_provider(), confirming_config(1));
        let ctx = ProcessContext::confirming(HandlerId::new("VICTORIA"), false);
        let result = o.process("Victoria line towards Brixton please", Some("t-c3"), ctx).await;

        assert_eq!(result.status, ProcessStatus::Answered);
        assert_eq!(result.handler_id, "BAKERLOO");
        assert_eq!(
            result.metadata.stage_trace,
            vec![
                Stage::Validate,
                Stage::Invoke,
                Stage::Confirm,
                Stage::Classify,
                Stage::Invoke,
                Stage::Persist,
                Stage::Finalize
            ]
        );
        assert_eq!(result.metadata.handlers_used, vec![HandlerId::new("VICTORIA"), HandlerId::new("BAKERLOO")]);
    }

    #[tokio::test]
    async fn test_rejection_without_retries_falls_back() {
        let (o, _) = engine(confirming_provider(), confirming_config(0));
        let ctx = ProcessContext::confirming(HandlerId::new("VICTORIA"), false);
        let result = o.process("Victoria line towards Brixton please", Some("t-c4"), ctx).await;

        assert_eq!(result.status, ProcessStatus::Fallback);
        assert_eq!(result.handler_id, "fallback");
        assert!(result.confidence <= 0.5);
        assert_eq!(
            result.metadata.stage_trace,
            vec![Stage::Validate, Stage::Invoke, Stage::Confirm, Stage::Fallback, Stage::Persist, Stage::Finalize]
        );
    }

    // ---- persistence ----

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_request() {
        let config = SwitchyardConfig::default();
        let provider = Arc::new(ScriptedProvider::echo());
        let data: SharedDataProvider = Arc::new(StaticDataProvider::for_profiles(&config.catalog.handlers));
        let db = Arc::new(Database::in_memory().unwrap());
        let o = Orchestrator::from_parts(&config, provider, Arc::clone(&db), data).unwrap();

        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE messages;")
                .map_err(|e| switchyard_core::error::SwitchyardError::Storage(e.to_string()))
        })
        .unwrap();

        let result = o.process("Circle line status", Some("t-nodb"), ProcessContext::default()).await;
        assert_eq!(result.status, ProcessStatus::Answered);
        assert_eq!(result.handler_id, "CIRCLE");
        assert!(o.history("t-nodb", None, false).is_err());
    }
}
