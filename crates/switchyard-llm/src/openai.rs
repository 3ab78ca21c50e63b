use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use switchyard_core::config::ReasoningConfig;
use switchyard_core::reasoning::{ReasoningError, ReasoningProvider, ReasoningRequest};

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Reasoning provider for any OpenAI-compatible `/v1/chat/completions`
/// endpoint.
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    default_temperature: f32,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            default_temperature: 0.2,
            http_client: reqwest::Client::new(),
        }
    }

    /// Build from the `[reasoning]` section, reading the key from the
    /// configured environment variable.
    pub fn from_config(config: &ReasoningConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "No API key set for reasoning provider");
        }
        let mut provider = Self::new(config.base_url.clone(), config.model.clone(), api_key);
        provider.default_temperature = config.temperature;
        provider
    }

    fn build_body(&self, request: &ReasoningRequest) -> ChatRequest {
        let mut system = request.system_prompt.clone();
        if let Some(tokens) = &request.allowed_tokens {
            system.push_str("\n\nRespond with exactly one of: ");
            system.push_str(&tokens.join(", "));
            system.push_str(". No other text.");
        }

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_message.clone(),
                },
            ],
            temperature: Some(request.temperature.unwrap_or(self.default_temperature)),
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiProvider {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(request);

        let mut http_req = self
            .http_client
            .post(&url)
            .timeout(request.timeout)
            .json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req.send().await.map_err(|e| {
            if e.is_timeout() {
                ReasoningError::Timeout(request.timeout)
            } else {
                ReasoningError::Transport(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Transport(format!(
                "API error {status}: {body_text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReasoningError::InvalidResponse("no choices in response".to_string()))?;

        let content = choice.message.content.trim().to_string();
        if content.is_empty() {
            return Err(ReasoningError::EmptyResponse);
        }
        tracing::debug!(model = %self.model, chars = content.len(), "Reasoning call completed");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
