use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Author of a persisted message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Why the content filter refused a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Outside the domain (other transport modes, general chit-chat).
    OffTopic,
    /// Abusive or offensive content.
    Inappropriate,
}

impl FilterReason {
    /// The token the constrained classifier emits for this reason.
    pub fn token(&self) -> &'static str {
        match self {
            FilterReason::OffTopic => "OFF_TOPIC",
            FilterReason::Inappropriate => "INAPPROPRIATE",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "OFF_TOPIC" => Some(FilterReason::OffTopic),
            "INAPPROPRIATE" => Some(FilterReason::Inappropriate),
            _ => None,
        }
    }

    /// Canned reply returned to the user instead of a handler answer.
    pub fn canned_message(&self) -> &'static str {
        match self {
            FilterReason::OffTopic => {
                "I can only help with London Underground questions: line status, \
                 arrivals, stations and journeys on the Tube. Try asking about a \
                 specific line or station."
            }
            FilterReason::Inappropriate => {
                "I'm here to help with London Underground travel. Please keep \
                 questions respectful and I'll do my best to help."
            }
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterReason::OffTopic => "off_topic",
            FilterReason::Inappropriate => "inappropriate",
        };
        write!(f, "{}", s)
    }
}

/// Overall tone of a summarized conversation range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Parse loosely; anything unrecognised is neutral.
    pub fn parse_lenient(s: &str) -> Self {
        s.trim().parse().unwrap_or_default()
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("unknown sentiment: {}", other)),
        }
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Identifier of a specialist handler, e.g. `CIRCLE` or `STATUS`.
///
/// Always stored upper-cased so that catalog data, reasoning output and
/// persisted rows compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(String);

impl HandlerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(s: &str) -> Self {
        HandlerId::new(s)
    }
}

/// Microseconds since the Unix epoch.
///
/// Message ordering and summary ranges are compared at this precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_micros())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.0).unwrap_or_default()
    }

    /// The smallest timestamp strictly after `self`.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Where the classifier sends a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Route {
    Handler(HandlerId),
    Filtered(FilterReason),
}

/// Output of the classifier for one query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub route: Route,
    pub confidence: f64,
    pub rationale: String,
    /// Set when the decision came from a degraded path (reasoning failure).
    pub fallback: bool,
}

impl RoutingDecision {
    pub fn handler(id: HandlerId, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            route: Route::Handler(id),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            fallback: false,
        }
    }

    pub fn filtered(reason: FilterReason, rationale: impl Into<String>) -> Self {
        Self {
            route: Route::Filtered(reason),
            confidence: 1.0,
            rationale: rationale.into(),
            fallback: false,
        }
    }

    /// Decision used when the reasoning call failed or timed out.
    pub fn degraded(default_handler: HandlerId, rationale: impl Into<String>) -> Self {
        Self {
            route: Route::Handler(default_handler),
            confidence: 0.5,
            rationale: rationale.into(),
            fallback: true,
        }
    }

    pub fn handler_id(&self) -> Option<&HandlerId> {
        match &self.route {
            Route::Handler(id) => Some(id),
            Route::Filtered(_) => None,
        }
    }

    pub fn filter_reason(&self) -> Option<FilterReason> {
        match self.route {
            Route::Filtered(reason) => Some(reason),
            Route::Handler(_) => None,
        }
    }

    /// Label recorded against the assistant message: the handler id or
    /// `filtered`.
    pub fn label(&self) -> String {
        match &self.route {
            Route::Handler(id) => id.to_string(),
            Route::Filtered(_) => "filtered".to_string(),
        }
    }
}

/// What a specialist returns for one query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub text: String,
    pub structured_data: Option<serde_json::Value>,
    pub confidence: f64,
    pub error: Option<String>,
}

impl HandlerResponse {
    pub fn answered(
        text: impl Into<String>,
        structured_data: Option<serde_json::Value>,
        confidence: f64,
    ) -> Self {
        Self {
            text: text.into(),
            structured_data,
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    /// A degraded response that still carries whatever data was fetched.
    pub fn partial(
        text: impl Into<String>,
        structured_data: Option<serde_json::Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            structured_data,
            confidence: 0.1,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// A persistent conversation keyed by an opaque id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub thread_id: String,
    pub created_at: Timestamp,
}

/// Optional attributes recorded alongside a message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub handler_id: Option<String>,
    pub confidence: Option<f64>,
    pub structured_data: Option<serde_json::Value>,
}

/// One append-only entry in a thread's log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
    pub handler_id: Option<String>,
    pub confidence: Option<f64>,
    pub structured_data: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

/// Compressed record of the messages in `(start_ts, end_ts]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub thread_id: String,
    pub summary_text: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub message_count: u32,
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
    pub created_at: Timestamp,
}

impl ConversationSummary {
    /// Whether a message timestamp falls inside this summary's half-open range.
    pub fn covers(&self, ts: Timestamp) -> bool {
        ts > self.start_ts && ts <= self.end_ts
    }
}

// =============================================================================
// Tests
// =============================================================================
