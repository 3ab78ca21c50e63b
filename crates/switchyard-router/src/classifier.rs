//! Query classification.
//!
//! Pipeline:
//! 1. Local content filter.
//! 2. Exactly one explicitly mentioned handler routes to it.
//! 3. A shared entity with an urgency pattern routes to the preferred handler.
//! 4. Otherwise a constrained reasoning call picks one token.
//!
//! Confidence is always recomputed by [`confidence::score`]. The classifier
//! never returns an error: reasoning failures degrade to the default handler.

use std::sync::Arc;
use std::time::Duration;

use switchyard_core::config::{ReasoningConfig, RoutingConfig};
use switchyard_core::reasoning::{coerce_token, invoke_bounded, ReasoningRequest, SharedProvider};
use switchyard_core::types::{FilterReason, HandlerId, RoutingDecision};

use crate::confidence;
use crate::error::ClassificationError;
use crate::filter::ContentFilter;
use crate::tables::RoutingTables;

/// Per-call classification input beyond the query.
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    /// Handlers that must not be chosen, e.g. one the user just rejected.
    pub excluded: Vec<HandlerId>,
}

impl ClassificationContext {
    pub fn excluding(ids: Vec<HandlerId>) -> Self {
        Self { excluded: ids }
    }

    fn allows(&self, id: &HandlerId) -> bool {
        !self.excluded.contains(id)
    }
}

pub struct Classifier {
    tables: Arc<RoutingTables>,
    filter: ContentFilter,
    default_handler: HandlerId,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(tables: Arc<RoutingTables>, routing: &RoutingConfig, reasoning: &ReasoningConfig) -> Self {
        Self {
            tables,
            filter: ContentFilter::new(),
            default_handler: HandlerId::new(&routing.default_handler),
            timeout: reasoning.timeout(),
            temperature: reasoning.temperature,
            max_tokens: reasoning.classifier_max_tokens,
        }
    }

    pub fn tables(&self) -> &Arc<RoutingTables> {
        &self.tables
    }

    /// Run only the local content filter.
    pub fn filter(&self, query: &str) -> Option<FilterReason> {
        self.filter.check(query, &self.tables)
    }

    pub fn default_handler(&self) -> &HandlerId {
        &self.default_handler
    }

    pub async fn classify(
        &self,
        query: &str,
        provider: &SharedProvider,
        context: &ClassificationContext,
    ) -> RoutingDecision {
        if let Some(reason) = self.filter(query) {
            tracing::debug!(reason = %reason, "Query filtered locally");
            return RoutingDecision::filtered(reason, "matched local content filter");
        }

        if let Some(decision) = self.deterministic(query, context) {
            return decision;
        }

        match self.ask_provider(query, provider, context).await {
            Ok(Token::Filter(reason)) => RoutingDecision::filtered(reason, "classified as outside the network"),
            Ok(Token::Handler(id)) => {
                let c = confidence::score(&self.tables, query, &id);
                RoutingDecision::handler(id, c.value, format!("classified; {:?}", c.basis))
            }
            Err(ClassificationError::OutOfSet(raw)) => {
                let id = self.default_for(context);
                tracing::warn!(output = %raw, default = %id, "Classifier output out of set, using default");
                let c = confidence::score(&self.tables, query, &id);
                RoutingDecision::handler(id, c.value, "unrecognised classifier output; default handler")
            }
            Err(ClassificationError::Reasoning(e)) => {
                let id = self.default_for(context);
                tracing::warn!(error = %e, default = %id, "Classification failed, using default");
                RoutingDecision::degraded(id, format!("fallback: {}", e))
            }
        }
    }

    /// The table-driven overrides. `None` when the reasoning call decides.
    fn deterministic(&self, query: &str, context: &ClassificationContext) -> Option<RoutingDecision> {
        let mentioned: Vec<HandlerId> = self
            .tables
            .explicit_mentions(query)
            .into_iter()
            .filter(|id| context.allows(id))
            .collect();
        if let [only] = mentioned.as_slice() {
            let c = confidence::score(&self.tables, query, only);
            return Some(RoutingDecision::handler(only.clone(), c.value, "explicit mention"));
        }

        if self.tables.is_urgent(query) {
            if let Some(hit) = self.tables.shared_entity(query) {
                let preferred = HandlerId::new(&hit.entity.preferred);
                if context.allows(&preferred) && self.tables.is_routable(&preferred) {
                    let c = confidence::score(&self.tables, query, &preferred);
                    return Some(RoutingDecision::handler(
                        preferred,
                        c.value,
                        format!("preferred handler for {}", hit.entity.name),
                    ));
                }
            }
        }
        None
    }

    async fn ask_provider(
        &self,
        query: &str,
        provider: &SharedProvider,
        context: &ClassificationContext,
    ) -> Result<Token, ClassificationError> {
        let mut allowed: Vec<String> = self
            .tables
            .routable_ids()
            .into_iter()
            .filter(|id| context.allows(id))
            .map(|id| id.to_string())
            .collect();
        if allowed.is_empty() {
            return Err(ClassificationError::OutOfSet(String::new()));
        }
        allowed.push(FilterReason::OffTopic.token().to_string());
        allowed.push(FilterReason::Inappropriate.token().to_string());

        let request = ReasoningRequest::new(self.system_prompt(context), query, self.timeout)
            .constrained(allowed.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let raw = invoke_bounded(provider.as_ref(), &request).await?;
        let token = coerce_token(&raw, &allowed).ok_or(ClassificationError::OutOfSet(raw))?;
        Ok(match FilterReason::from_token(&token) {
            Some(reason) => Token::Filter(reason),
            None => Token::Handler(HandlerId::new(token)),
        })
    }

    fn system_prompt(&self, context: &ClassificationContext) -> String {
        let mut prompt = String::from(
            "You are the router for a London Underground travel assistant. \
             Pick the single specialist best placed to answer the question.\n\nSpecialists:\n",
        );
        for profile in self.tables.profiles().filter(|p| p.routable) {
            let id = HandlerId::new(&profile.id);
            if !context.allows(&id) {
                continue;
            }
            prompt.push_str(&format!("- {}: {} line. {}\n", id, profile.name, profile.specialization));
        }
        prompt.push_str(&format!(
            "\nAnswer {} for questions unrelated to the Underground and {} for abusive ones. \
             Reply with the token only.",
            FilterReason::OffTopic.token(),
            FilterReason::Inappropriate.token(),
        ));
        prompt
    }

    /// The configured default, or the first allowed routable handler when the
    /// default is excluded.
    fn default_for(&self, context: &ClassificationContext) -> HandlerId {
        if context.allows(&self.default_handler) {
            return self.default_handler.clone();
        }
        self.tables
            .routable_ids()
            .into_iter()
            .find(|id| context.allows(id))
            .unwrap_or_else(|| self.default_handler.clone())
    }
}

enum Token {
    Handler(HandlerId),
    Filter(FilterReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::config::SwitchyardConfig;
    use switchyard_core::reasoning::ReasoningError;
    use switchyard_core::types::Route;
    use switchyard_llm::{Reply, ScriptedProvider};

    fn classifier() -> Classifier {
        let config = SwitchyardConfig::default();
        let tables = Arc::new(RoutingTables::compile(&config.catalog).unwrap());
        Classifier::new(tables, &config.routing, &config.reasoning)
    }

    fn scripted(reply: Reply) -> (Arc<ScriptedProvider>, SharedProvider) {
        let scripted = Arc::new(ScriptedProvider::new(reply));
        let provider: SharedProvider = scripted.clone();
        (scripted, provider)
    }

    fn handler(decision: &RoutingDecision) -> &str {
        decision.handler_id().map(|id| id.as_str()).unwrap_or("filtered")
    }

    #[tokio::test]
    async fn test_explicit_mention_skips_reasoning() {
        let (scripted, provider) = scripted(Reply::text("JUBILEE"));
        let decision = classifier()
            .classify("Circle line status", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(handler(&decision), "CIRCLE");
        assert_eq!(decision.confidence, 0.95);
        assert!(!decision.fallback);
        assert_eq!(scripted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_entity_with_urgency_uses_preference() {
        let (scripted, provider) = scripted(Reply::text("VICTORIA"));
        let c = classifier();
        for query in [
            "next train at Victoria",
            "When is the next train at Victoria?",
            "next train at Victoria? I could also go via westminster, embankment or monument",
        ] {
            let decision = c.classify(query, &provider, &ClassificationContext::default()).await;
            assert_eq!(handler(&decision), "DISTRICT", "{}", query);
            assert_eq!(decision.confidence, 0.9, "{}", query);
        }
        assert_eq!(scripted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_two_mentions_go_to_reasoning() {
        let (scripted, provider) = scripted(Reply::text("District line"));
        let decision = classifier()
            .classify("Circle or District to Tower Hill?", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(handler(&decision), "DISTRICT");
        assert_eq!(decision.confidence, 0.95);
        assert_eq!(scripted.call_count(), 1);
        assert!(scripted.calls()[0].constrained);
    }

    #[tokio::test]
    async fn test_reasoning_token_is_scored_locally() {
        let (_, provider) = scripted(Reply::text("**NORTHERN**"));
        let decision = classifier()
            .classify("trains to camden town please", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(handler(&decision), "NORTHERN");
        assert!(decision.confidence >= 0.5);
    }

    #[tokio::test]
    async fn test_filter_tokens_from_reasoning() {
        let (_, provider) = scripted(Reply::text("OFF_TOPIC"));
        let decision = classifier()
            .classify("tell me about your day", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(decision.route, Route::Filtered(FilterReason::OffTopic));
        assert_eq!(decision.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_local_filter_short_circuits() {
        let (scripted, provider) = scripted(Reply::text("CENTRAL"));
        let decision = classifier()
            .classify("when is the next 25 bus", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(decision.filter_reason(), Some(FilterReason::OffTopic));
        assert_eq!(scripted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_set_output_uses_default() {
        let (_, provider) = scripted(Reply::text("the monorail, obviously"));
        let decision = classifier()
            .classify("which way to the zoo by train", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(handler(&decision), "CENTRAL");
        assert!(!decision.fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_default() {
        let (_, provider) = scripted(Reply::Hang);
        let decision = classifier()
            .classify("how busy is it", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(handler(&decision), "CENTRAL");
        assert_eq!(decision.confidence, 0.5);
        assert!(decision.fallback);
        assert!(decision.rationale.starts_with("fallback"));
    }

    #[tokio::test]
    async fn test_transport_error_degrades_to_default() {
        let (_, provider) = scripted(Reply::Fail(ReasoningError::Transport("refused".into())));
        let decision = classifier()
            .classify("how busy is it", &provider, &ClassificationContext::default())
            .await;
        assert_eq!(handler(&decision), "CENTRAL");
        assert!(decision.fallback);
    }

    #[tokio::test]
    async fn test_exclusion_removes_handler_everywhere() {
        let (scripted, provider) = scripted(Reply::Echo);
        let c = classifier();
        let context = ClassificationContext::excluding(vec![HandlerId::new("CIRCLE")]);

        // The explicit mention is excluded, so reasoning decides.
        let decision = c.classify("Circle line status", &provider, &context).await;
        assert_ne!(handler(&decision), "CIRCLE");
        let call = &scripted.calls()[0];
        assert!(!call.system_prompt.contains("- CIRCLE:"));

        // Default excluded: first allowed routable handler instead.
        let context = ClassificationContext::excluding(vec![HandlerId::new("CENTRAL")]);
        assert_eq!(c.default_for(&context), HandlerId::new("BAKERLOO"));
    }

    #[test]
    fn test_system_prompt_lists_routable_handlers_only() {
        let prompt = classifier().system_prompt(&ClassificationContext::default());
        assert!(prompt.contains("- CIRCLE: Circle line."));
        assert!(prompt.contains("OFF_TOPIC"));
        assert!(!prompt.contains("- STATUS:"));
    }
}
