//! Specialist handler capability and registry.
//!
//! Every specialist implements [`Handler`]; the registry maps ids to
//! implementations and callers select by id only.

pub mod specialist;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use switchyard_core::catalog::{CatalogConfig, HandlerProfile};
use switchyard_core::reasoning::SharedProvider;
use switchyard_core::types::{HandlerId, HandlerResponse, Message};

use crate::data::SharedDataProvider;
use crate::error::HandlerError;

pub use specialist::LineSpecialist;

/// Per-call context handed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub thread_id: String,
    /// Classifier confidence for this handler, when it was the primary.
    pub routing_confidence: Option<f64>,
    /// Recent messages of the thread, oldest first.
    pub history: Vec<Message>,
    pub reasoning_timeout: Duration,
    /// Set when the handler answers as a collaborator.
    pub collaborating: bool,
}

impl HandlerContext {
    pub fn new(thread_id: impl Into<String>, reasoning_timeout: Duration) -> Self {
        Self {
            thread_id: thread_id.into(),
            routing_confidence: None,
            history: Vec::new(),
            reasoning_timeout,
            collaborating: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.routing_confidence = Some(confidence);
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Copy of this context for a collaborator call.
    pub fn for_collaborator(&self) -> Self {
        Self {
            routing_confidence: None,
            collaborating: true,
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> &HandlerId;

    fn profile(&self) -> &HandlerProfile;

    /// Answer `query` using the shared reasoning provider.
    async fn handle(
        &self,
        query: &str,
        provider: &SharedProvider,
        context: &HandlerContext,
    ) -> Result<HandlerResponse, HandlerError>;
}

/// Registry of handlers keyed by id, in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn Handler>>,
    order: Vec<HandlerId>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`LineSpecialist`] per catalog profile, all sharing `data`.
    pub fn from_catalog(catalog: &CatalogConfig, data: SharedDataProvider) -> Self {
        let mut registry = Self::new();
        for profile in &catalog.handlers {
            registry.register(Arc::new(LineSpecialist::new(profile.clone(), data.clone())));
        }
        registry
    }

    /// Register a handler, replacing any with the same id.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        let id = handler.id().clone();
        if self.handlers.insert(id.clone(), handler).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &HandlerId) -> Result<Arc<dyn Handler>, HandlerError> {
        self.handlers
            .get(id)
            .cloned()
            .ok_or_else(|| HandlerError::Unregistered(id.clone()))
    }

    pub fn contains(&self, id: &HandlerId) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn ids(&self) -> &[HandlerId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.order)
            .finish()
    }
}

/// Run a handler under `timeout`. Expiry is a [`HandlerError::Timeout`].
pub async fn invoke_handler(
    handler: &dyn Handler,
    query: &str,
    provider: &SharedProvider,
    context: &HandlerContext,
    timeout: Duration,
) -> Result<HandlerResponse, HandlerError> {
    match tokio::time::timeout(timeout, handler.handle(query, provider, context)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(handler = %handler.id(), timeout_ms = timeout.as_millis() as u64, "Handler timed out");
            Err(HandlerError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticDataProvider;
    use switchyard_llm::{Reply, ScriptedProvider};

    struct SlowHandler {
        id: HandlerId,
        profile: HandlerProfile,
    }

    #[async_trait]
    impl Handler for SlowHandler {
        fn id(&self) -> &HandlerId {
            &self.id
        }

        fn profile(&self) -> &HandlerProfile {
            &self.profile
        }

        async fn handle(
            &self,
            _query: &str,
            _provider: &SharedProvider,
            _context: &HandlerContext,
        ) -> Result<HandlerResponse, HandlerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(HandlerResponse::answered("late", None, 0.9))
        }
    }

    fn registry() -> HandlerRegistry {
        let catalog = CatalogConfig::default();
        HandlerRegistry::from_catalog(
            &catalog,
            Arc::new(StaticDataProvider::for_profiles(&catalog.handlers)),
        )
    }

    #[test]
    fn test_registry_from_catalog() {
        let registry = registry();
        assert_eq!(registry.len(), 13);
        assert_eq!(registry.ids()[0], HandlerId::new("BAKERLOO"));
        assert!(registry.contains(&HandlerId::new("STATUS")));
        assert!(registry.get(&HandlerId::new("circle")).is_ok());
    }

    #[test]
    fn test_unregistered_lookup() {
        let err = registry().get(&HandlerId::new("MONORAIL")).err().unwrap();
        assert_eq!(err, HandlerError::Unregistered(HandlerId::new("MONORAIL")));
    }

    #[test]
    fn test_register_replaces_without_duplicating_order() {
        let mut registry = registry();
        let catalog = CatalogConfig::default();
        let circle = catalog.profile("CIRCLE").unwrap().clone();
        registry.register(Arc::new(SlowHandler {
            id: HandlerId::new("CIRCLE"),
            profile: circle,
        }));
        assert_eq!(registry.len(), 13);
    }

    #[test]
    fn test_collaborator_context() {
        let ctx = HandlerContext::new("t1", Duration::from_secs(1)).with_confidence(0.9);
        let collab = ctx.for_collaborator();
        assert!(collab.collaborating);
        assert_eq!(collab.routing_confidence, None);
        assert_eq!(collab.thread_id, "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_handler_times_out() {
        let catalog = CatalogConfig::default();
        let handler = SlowHandler {
            id: HandlerId::new("CIRCLE"),
            profile: catalog.profile("CIRCLE").unwrap().clone(),
        };
        let provider: SharedProvider = Arc::new(ScriptedProvider::new(Reply::Echo));
        let ctx = HandlerContext::new("t1", Duration::from_secs(1));
        let err = invoke_handler(&handler, "q", &provider, &ctx, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::Timeout(Duration::from_secs(5)));
    }
}
