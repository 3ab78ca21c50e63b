//! Runs the primary handler, then its collaborators concurrently, and
//! synthesizes one answer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use switchyard_core::config::CollaborationConfig;
use switchyard_core::reasoning::SharedProvider;
use switchyard_core::types::{HandlerId, HandlerResponse};

use crate::collaboration::synthesis::{synthesize, validate, Contribution, Synthesis};
use crate::collaboration::{select_collaborators, CollaborationDetector, CollaborationPlan};
use crate::error::{CollaborationError, HandlerError, SynthesisError};
use crate::handler::{invoke_handler, HandlerContext, HandlerRegistry};
use crate::tables::RoutingTables;

#[derive(Debug, Clone)]
pub struct CollaborationOutcome {
    pub plan: CollaborationPlan,
    pub synthesis: Synthesis,
    /// Every response received, primary included.
    pub responses: BTreeMap<HandlerId, HandlerResponse>,
    pub errors: Vec<CollaborationError>,
    /// Set when the merged answer was rejected and the primary used alone.
    pub synthesis_error: Option<SynthesisError>,
}

impl CollaborationOutcome {
    /// Whether the primary itself only produced a degraded answer.
    pub fn primary_failed(&self, primary: &HandlerId) -> bool {
        self.responses.get(primary).map_or(true, |r| r.is_error())
    }
}

pub struct CollaborationCoordinator {
    registry: Arc<HandlerRegistry>,
    tables: Arc<RoutingTables>,
    detector: CollaborationDetector,
    config: CollaborationConfig,
    handler_timeout: Duration,
}

impl CollaborationCoordinator {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        tables: Arc<RoutingTables>,
        config: CollaborationConfig,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            tables,
            detector: CollaborationDetector::new(),
            config,
            handler_timeout,
        }
    }

    /// Whether `query` needs collaboration around `primary`, and with whom.
    /// A plan may have no collaborators when none qualify.
    pub fn plan(&self, query: &str, primary: &HandlerId) -> Option<CollaborationPlan> {
        if !self.config.enabled {
            return None;
        }
        let kind = self.detector.detect(query)?;
        let collaborators = select_collaborators(
            kind,
            query,
            primary,
            &self.tables,
            self.registry.ids(),
            self.config.max_collaborators,
        );
        tracing::debug!(kind = %kind, collaborators = collaborators.len(), "Collaboration planned");
        Some(CollaborationPlan { kind, collaborators })
    }

    /// Invoke the primary, then every collaborator concurrently.
    ///
    /// Only a primary that fails outright is an error. A degraded primary
    /// skips the collaborators. Collaborator failures are recorded in the
    /// outcome. Dropping the returned future aborts outstanding
    /// collaborators.
    pub async fn run(
        &self,
        query: &str,
        primary: &HandlerId,
        plan: CollaborationPlan,
        provider: &SharedProvider,
        context: &HandlerContext,
    ) -> Result<CollaborationOutcome, HandlerError> {
        let handler = self.registry.get(primary)?;
        let primary_response = invoke_handler(handler.as_ref(), query, provider, context, self.handler_timeout).await?;
        let primary = Contribution::new(primary.clone(), self.tables.display_name(primary), primary_response);

        let mut responses = BTreeMap::new();
        responses.insert(primary.handler.clone(), primary.response.clone());

        if primary.response.is_error() {
            return Ok(CollaborationOutcome {
                plan,
                synthesis: Synthesis::primary_only(&primary),
                responses,
                errors: Vec::new(),
                synthesis_error: None,
            });
        }

        let (contributions, errors) = self.run_collaborators(query, &plan, provider, context).await;
        for c in &contributions {
            responses.insert(c.handler.clone(), c.response.clone());
        }

        let merged = synthesize(&primary, &contributions, self.config.excerpt_chars);
        let (synthesis, synthesis_error) =
            match validate(&merged, self.config.min_response_chars, self.config.min_confidence) {
                Ok(()) => (merged, None),
                Err(e) => {
                    tracing::warn!(error = %e, "Synthesis rejected, using primary only");
                    (Synthesis::primary_only(&primary), Some(e))
                }
            };

        Ok(CollaborationOutcome {
            plan,
            synthesis,
            responses,
            errors,
            synthesis_error,
        })
    }

    async fn run_collaborators(
        &self,
        query: &str,
        plan: &CollaborationPlan,
        provider: &SharedProvider,
        context: &HandlerContext,
    ) -> (Vec<Contribution>, Vec<CollaborationError>) {
        let mut errors = Vec::new();
        let mut tasks = JoinSet::new();

        for id in &plan.collaborators {
            let handler = match self.registry.get(id) {
                Ok(handler) => handler,
                Err(e) => {
                    errors.push(CollaborationError {
                        handler: id.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let focused = plan.focused_query(query, id, &self.tables);
            let provider = provider.clone();
            let context = context.for_collaborator();
            let timeout = self.handler_timeout;
            let id = id.clone();
            tasks.spawn(async move {
                let result = invoke_handler(handler.as_ref(), &focused, &provider, &context, timeout).await;
                (id, result)
            });
        }

        let mut results: HashMap<HandlerId, Result<HandlerResponse, HandlerError>> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    results.insert(id, result);
                }
                Err(e) => tracing::warn!(error = %e, "Collaborator task did not complete"),
            }
        }

        let mut contributions = Vec::new();
        for id in &plan.collaborators {
            let Some(result) = results.remove(id) else {
                if self.registry.contains(id) {
                    errors.push(CollaborationError {
                        handler: id.clone(),
                        message: "task did not complete".to_string(),
                    });
                }
                continue;
            };
            match result {
                Ok(response) => {
                    if let Some(err) = &response.error {
                        errors.push(CollaborationError {
                            handler: id.clone(),
                            message: err.clone(),
                        });
                    }
                    contributions.push(Contribution::new(id.clone(), self.tables.display_name(id), response));
                }
                Err(e) => {
                    tracing::warn!(handler = %id, error = %e, "Collaborator failed");
                    errors.push(CollaborationError {
                        handler: id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        (contributions, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use switchyard_core::catalog::{CatalogConfig, HandlerProfile};
    use switchyard_llm::{Reply, ScriptedProvider};

    use crate::data::StaticDataProvider;
    use crate::handler::Handler;

    /// Stand-in specialist with a fixed behaviour.
    struct Fixed {
        id: HandlerId,
        profile: HandlerProfile,
        behaviour: Behaviour,
        finished: Arc<AtomicBool>,
    }

    enum Behaviour {
        Fail,
        Sleep(Duration),
    }

    #[async_trait]
    impl Handler for Fixed {
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
            match self.behaviour {
                Behaviour::Fail => Err(HandlerError::Failed("feed exploded".into())),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    self.finished.store(true, Ordering::SeqCst);
                    Ok(HandlerResponse::answered("late answer", None, 0.8))
                }
            }
        }
    }

    fn coordinator_with(replace: Vec<(&str, Behaviour)>, finished: Arc<AtomicBool>) -> CollaborationCoordinator {
        let catalog = CatalogConfig::default();
        let mut registry =
            HandlerRegistry::from_catalog(&catalog, Arc::new(StaticDataProvider::for_profiles(&catalog.handlers)));
        for (id, behaviour) in replace {
            registry.register(Arc::new(Fixed {
                id: HandlerId::new(id),
                profile: catalog.profile(id).unwrap().clone(),
                behaviour,
                finished: finished.clone(),
            }));
        }
        CollaborationCoordinator::new(
            Arc::new(registry),
            Arc::new(RoutingTables::compile(&catalog).unwrap()),
            CollaborationConfig::default(),
            Duration::from_secs(30),
        )
    }

    fn coordinator() -> CollaborationCoordinator {
        coordinator_with(Vec::new(), Arc::new(AtomicBool::new(false)))
    }

    fn provider() -> (Arc<ScriptedProvider>, SharedProvider) {
        let scripted = Arc::new(ScriptedProvider::echo());
        let shared: SharedProvider = scripted.clone();
        (scripted, shared)
    }

    fn ctx() -> HandlerContext {
        HandlerContext::new("t1", Duration::from_secs(10)).with_confidence(0.7)
    }

    const JOURNEY: &str = "how do I get from Victoria to Oxford Circus";

    #[test]
    fn test_plan() {
        let c = coordinator();
        let plan = c.plan(JOURNEY, &HandlerId::new("CENTRAL")).unwrap();
        assert_eq!(plan.collaborators.len(), 3);
        assert!(c.plan("Circle line status", &HandlerId::new("CIRCLE")).is_none());
    }

    #[test]
    fn test_plan_disabled() {
        let catalog = CatalogConfig::default();
        let c = CollaborationCoordinator::new(
            Arc::new(HandlerRegistry::new()),
            Arc::new(RoutingTables::compile(&catalog).unwrap()),
            CollaborationConfig {
                enabled: false,
                ..CollaborationConfig::default()
            },
            Duration::from_secs(1),
        );
        assert!(c.plan(JOURNEY, &HandlerId::new("CENTRAL")).is_none());
    }

    #[tokio::test]
    async fn test_journey_collaboration() {
        let c = coordinator();
        let (scripted, provider) = provider();
        let primary = HandlerId::new("CENTRAL");
        let plan = c.plan(JOURNEY, &primary).unwrap();
        let outcome = c.run(JOURNEY, &primary, plan, &provider, &ctx()).await.unwrap();

        assert_eq!(scripted.call_count(), 4);
        assert_eq!(outcome.responses.len(), 4);
        assert!(outcome.errors.is_empty());
        assert!(outcome.synthesis_error.is_none());
        assert!(outcome.synthesis.is_collaborative());
        assert!(outcome.synthesis.text.contains("**Additional Information:**"));
        assert!(outcome.synthesis.text.contains("focus on Victoria line connectivity"));
        // Primary 0.7, collaborators 0.7 each.
        assert!((outcome.synthesis.confidence - 0.7).abs() < 1e-9);
        let data = outcome.synthesis.structured_data.unwrap();
        assert_eq!(data["collaborative"], true);
        assert_eq!(data["handler"], "CENTRAL");
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_isolated() {
        let c = coordinator_with(vec![("VICTORIA", Behaviour::Fail)], Arc::new(AtomicBool::new(false)));
        let (_, provider) = provider();
        let primary = HandlerId::new("CENTRAL");
        let plan = c.plan(JOURNEY, &primary).unwrap();
        let outcome = c.run(JOURNEY, &primary, plan, &provider, &ctx()).await.unwrap();

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].handler, HandlerId::new("VICTORIA"));
        assert!(outcome.errors[0].message.contains("feed exploded"));
        assert!(!outcome.primary_failed(&primary));
        assert_eq!(outcome.synthesis.sources.len(), 3);
    }

    #[tokio::test]
    async fn test_primary_failure_is_an_error() {
        let c = coordinator_with(vec![("CENTRAL", Behaviour::Fail)], Arc::new(AtomicBool::new(false)));
        let (scripted, provider) = provider();
        let primary = HandlerId::new("CENTRAL");
        let plan = c.plan(JOURNEY, &primary).unwrap();
        let err = c.run(JOURNEY, &primary, plan, &provider, &ctx()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
        assert_eq!(scripted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_synthesis_falls_back_to_primary() {
        let catalog = CatalogConfig::default();
        let registry =
            HandlerRegistry::from_catalog(&catalog, Arc::new(StaticDataProvider::for_profiles(&catalog.handlers)));
        let c = CollaborationCoordinator::new(
            Arc::new(registry),
            Arc::new(RoutingTables::compile(&catalog).unwrap()),
            CollaborationConfig {
                min_response_chars: 10_000,
                ..CollaborationConfig::default()
            },
            Duration::from_secs(5),
        );
        let (_, provider) = provider();
        let primary = HandlerId::new("CENTRAL");
        let plan = c.plan(JOURNEY, &primary).unwrap();
        let outcome = c.run(JOURNEY, &primary, plan, &provider, &ctx()).await.unwrap();
        assert!(matches!(outcome.synthesis_error, Some(SynthesisError::TooShort(_))));
        assert!(!outcome.synthesis.is_collaborative());
        assert!(!outcome.synthesis.text.contains("Additional Information"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_collaborator_times_out() {
        let finished = Arc::new(AtomicBool::new(false));
        let c = coordinator_with(vec![("VICTORIA", Behaviour::Sleep(Duration::from_secs(120)))], finished.clone());
        let (_, provider) = provider();
        let primary = HandlerId::new("CENTRAL");
        let plan = c.plan(JOURNEY, &primary).unwrap();
        let outcome = c.run(JOURNEY, &primary, plan, &provider, &ctx()).await.unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("timed out"));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_run_aborts_collaborators() {
        let finished = Arc::new(AtomicBool::new(false));
        let c = coordinator_with(vec![("VICTORIA", Behaviour::Sleep(Duration::from_secs(20)))], finished.clone());
        let (_, provider) = provider();
        let primary = HandlerId::new("CENTRAL");
        let plan = c.plan(JOURNEY, &primary).unwrap();

        let cut = tokio::time::timeout(
            Duration::from_secs(5),
            c.run(JOURNEY, &primary, plan, &provider, &ctx()),
        )
        .await;
        assert!(cut.is_err());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
