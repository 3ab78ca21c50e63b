//! The seam between the router/memory subsystems and whatever produces text.
//!
//! Providers are passed explicitly as `Arc<dyn ReasoningProvider>`; nothing in
//! the workspace holds a global client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single reasoning call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReasoningError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One call to a reasoning provider.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub user_message: String,
    /// When set, the provider is asked to answer with exactly one of these
    /// tokens. Callers must still validate the output.
    pub allowed_tokens: Option<Vec<String>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ReasoningRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            allowed_tokens: None,
            temperature: None,
            max_tokens: None,
            timeout,
        }
    }

    /// Constrain output to one token from `tokens`.
    pub fn constrained(mut self, tokens: Vec<String>) -> Self {
        self.allowed_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Something that turns a prompt into text.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

pub type SharedProvider = Arc<dyn ReasoningProvider>;

/// Invoke `provider`, converting an expired `request.timeout` into
/// [`ReasoningError::Timeout`]. The in-flight call is dropped on expiry.
pub async fn invoke_bounded(
    provider: &dyn ReasoningProvider,
    request: &ReasoningRequest,
) -> Result<String, ReasoningError> {
    match tokio::time::timeout(request.timeout, provider.invoke(request)).await {
        Ok(Ok(text)) if text.trim().is_empty() => Err(ReasoningError::EmptyResponse),
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                model = provider.model_name(),
                timeout_ms = request.timeout.as_millis() as u64,
                "Reasoning call timed out"
            );
            Err(ReasoningError::Timeout(request.timeout))
        }
    }
}

/// Map raw constrained output onto one of `allowed`.
///
/// Tolerates case, surrounding punctuation/markdown and trailing words
/// ("Circle line", "**DISTRICT**."). Returns `None` when nothing matches.
pub fn coerce_token(raw: &str, allowed: &[String]) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .to_ascii_uppercase();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(hit) = allowed.iter().find(|t| t.eq_ignore_ascii_case(&cleaned)) {
        return Some(hit.clone());
    }

    let underscored = cleaned
        .replace(" & ", "_")
        .replace(" AND ", "_")
        .replace([' ', '-'], "_");
    if let Some(hit) = allowed.iter().find(|t| t.eq_ignore_ascii_case(&underscored)) {
        return Some(hit.clone());
    }

    let first = cleaned
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default();
    allowed
        .iter()
        .find(|t| t.eq_ignore_ascii_case(first))
        .cloned()
}
