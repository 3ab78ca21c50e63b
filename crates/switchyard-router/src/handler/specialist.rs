//! Data-driven specialist: one implementation, configured per line by its
//! catalog profile.

use async_trait::async_trait;
use serde_json::{json, Value};

use switchyard_core::catalog::HandlerProfile;
use switchyard_core::reasoning::{invoke_bounded, ReasoningRequest, SharedProvider};
use switchyard_core::types::{HandlerId, HandlerResponse};

use crate::data::SharedDataProvider;
use crate::error::HandlerError;
use crate::handler::{Handler, HandlerContext};

/// Confidence reported when the handler was not chosen by the classifier.
const UNROUTED_CONFIDENCE: f64 = 0.7;
const HISTORY_TURNS: usize = 6;

pub struct LineSpecialist {
    id: HandlerId,
    profile: HandlerProfile,
    data: SharedDataProvider,
}

impl LineSpecialist {
    pub fn new(profile: HandlerProfile, data: SharedDataProvider) -> Self {
        Self {
            id: HandlerId::new(&profile.id),
            profile,
            data,
        }
    }

    fn system_prompt(&self, data: Option<&Value>, context: &HandlerContext) -> String {
        let mut prompt = format!(
            "You are the {} specialist for the London Underground. Coverage: {}. \
             Answer the traveller's question concisely and only about your area. \
             Use the live data below when it is relevant.",
            if self.profile.entities.is_empty() {
                self.profile.name.clone()
            } else {
                format!("{} line", self.profile.name)
            },
            self.profile.specialization,
        );
        if context.collaborating {
            prompt.push_str(" Another specialist leads this answer; add only what your line contributes.");
        }
        match data {
            Some(data) => {
                prompt.push_str("\n\nLive data: ");
                prompt.push_str(&data.to_string());
            }
            None => prompt.push_str("\n\nLive data is currently unavailable; say so briefly."),
        }
        if !context.history.is_empty() {
            prompt.push_str("\n\nRecent conversation:\n");
            let skip = context.history.len().saturating_sub(HISTORY_TURNS);
            for message in &context.history[skip..] {
                prompt.push_str(&format!("{}: {}\n", message.role, message.content));
            }
        }
        prompt
    }

    fn shape(&self, data: Option<Value>) -> Value {
        json!({
            "handler": self.id,
            "line": self.profile.name,
            "color": self.profile.color,
            "data": data,
        })
    }
}

#[async_trait]
impl Handler for LineSpecialist {
    fn id(&self) -> &HandlerId {
        &self.id
    }

    fn profile(&self) -> &HandlerProfile {
        &self.profile
    }

    async fn handle(
        &self,
        query: &str,
        provider: &SharedProvider,
        context: &HandlerContext,
    ) -> Result<HandlerResponse, HandlerError> {
        let data = match self.data.fetch(&self.profile, query).await {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(handler = %self.id, error = %e, "Domain data fetch failed");
                None
            }
        };

        let request = ReasoningRequest::new(
            self.system_prompt(data.as_ref(), context),
            query,
            context.reasoning_timeout,
        );

        match invoke_bounded(provider.as_ref(), &request).await {
            Ok(text) => {
                let confidence = context.routing_confidence.unwrap_or(UNROUTED_CONFIDENCE);
                tracing::debug!(handler = %self.id, text_len = text.len(), "Specialist answered");
                Ok(HandlerResponse::answered(text.trim(), Some(self.shape(data)), confidence))
            }
            Err(e) if data.is_some() => {
                tracing::warn!(handler = %self.id, error = %e, "Reasoning failed, returning data only");
                Ok(HandlerResponse::partial(
                    format!("Here is the latest {} information I have.", self.profile.name),
                    Some(self.shape(data)),
                    e.to_string(),
                ))
            }
            Err(e) => Err(HandlerError::Reasoning(e)),
        }
    }
}
