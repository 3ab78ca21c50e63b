//! Deterministic reasoning provider driven by substring rules.
//!
//! Used as the test double throughout the workspace and by `--offline` runs
//! of the binary. Rules are checked in insertion order; the first whose
//! needles all match decides the reply.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use switchyard_core::reasoning::{ReasoningError, ReasoningProvider, ReasoningRequest};

/// What the provider does when a rule fires.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Answer with a short paraphrase of the user message.
    Echo,
    Fail(ReasoningError),
    /// Never answer; the caller's timeout must fire.
    Hang,
    /// Answer after a delay.
    Delayed(Duration, String),
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

#[derive(Debug, Clone)]
struct Rule {
    system_contains: Option<String>,
    user_contains: Option<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, request: &ReasoningRequest) -> bool {
        let system_ok = self
            .system_contains
            .as_ref()
            .map_or(true, |n| contains_ci(&request.system_prompt, n));
        let user_ok = self
            .user_contains
            .as_ref()
            .map_or(true, |n| contains_ci(&request.user_message, n));
        system_ok && user_ok
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_message: String,
    pub constrained: bool,
}

#[derive(Debug)]
pub struct ScriptedProvider {
    rules: Vec<Rule>,
    default_reply: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new(default_reply: Reply) -> Self {
        Self {
            rules: Vec::new(),
            default_reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Provider that echoes every prompt; handy offline.
    pub fn echo() -> Self {
        Self::new(Reply::Echo)
    }

    pub fn on_system(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.push(Rule {
            system_contains: Some(needle.into()),
            user_contains: None,
            reply,
        });
        self
    }

    pub fn on_user(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.push(Rule {
            system_contains: None,
            user_contains: Some(needle.into()),
            reply,
        });
        self
    }

    /// Rule requiring both the system prompt and the user message to match.
    pub fn on(mut self, system: impl Into<String>, user: impl Into<String>, reply: Reply) -> Self {
        self.rules.push(Rule {
            system_contains: Some(system.into()),
            user_contains: Some(user.into()),
            reply,
        });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Number of calls whose system prompt contains `needle`.
    pub fn calls_with_system(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| contains_ci(&c.system_prompt, needle))
            .count()
    }

    fn pick(&self, request: &ReasoningRequest) -> Reply {
        self.rules
            .iter()
            .find(|r| r.matches(request))
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

fn echo(request: &ReasoningRequest) -> String {
    match &request.allowed_tokens {
        Some(tokens) => tokens.first().cloned().unwrap_or_default(),
        None => format!(
            "Here is what I found for your question \"{}\". Services are running and \
             the latest information is shown below.",
            request.user_message.trim()
        ),
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedProvider {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                system_prompt: request.system_prompt.clone(),
                user_message: request.user_message.clone(),
                constrained: request.allowed_tokens.is_some(),
            });
        }

        match self.pick(request) {
            Reply::Text(text) => Ok(text),
            Reply::Echo => Ok(echo(request)),
            Reply::Fail(err) => Err(err),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Err(ReasoningError::Timeout(request.timeout))
            }
            Reply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::reasoning::invoke_bounded;

    fn request(system: &str, user: &str) -> ReasoningRequest {
        ReasoningRequest::new(system, user, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let provider = ScriptedProvider::new(Reply::text("default"))
            .on_user("circle", Reply::text("CIRCLE"))
            .on_user("circle line", Reply::text("never reached"));
        assert_eq!(provider.invoke(&request("s", "Circle line status")).await.unwrap(), "CIRCLE");
        assert_eq!(provider.invoke(&request("s", "bank")).await.unwrap(), "default");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_combined_rule_requires_both() {
        let provider = ScriptedProvider::new(Reply::text("no"))
            .on("classifier", "victoria", Reply::text("DISTRICT"));
        assert_eq!(provider.invoke(&request("classifier", "Victoria?")).await.unwrap(), "DISTRICT");
        assert_eq!(provider.invoke(&request("summarizer", "Victoria?")).await.unwrap(), "no");
        assert_eq!(provider.calls_with_system("classifier"), 1);
    }

    #[tokio::test]
    async fn test_failure_reply() {
        let provider = ScriptedProvider::new(Reply::Fail(ReasoningError::Transport("down".into())));
        let err = provider.invoke(&request("s", "u")).await.unwrap_err();
        assert_eq!(err, ReasoningError::Transport("down".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_is_cut_by_bounded_invoke() {
        let provider = ScriptedProvider::new(Reply::Hang);
        let err = invoke_bounded(&provider, &request("s", "u")).await.unwrap_err();
        assert!(matches!(err, ReasoningError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_echo_respects_constraints() {
        let provider = ScriptedProvider::echo();
        let constrained = request("s", "u").constrained(vec!["CENTRAL".into(), "CIRCLE".into()]);
        assert_eq!(provider.invoke(&constrained).await.unwrap(), "CENTRAL");
        let free = provider.invoke(&request("s", "next train")).await.unwrap();
        assert!(free.contains("next train"));
        assert!(provider.calls()[0].constrained);
    }
}
