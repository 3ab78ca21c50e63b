//! Summarization of an exact range of messages.
//!
//! The reasoning provider is asked for a JSON synthesis. A reply that does not
//! parse is kept as free text; a failed call produces a templated summary.
//! Either way topics come from the fixed vocabulary, so a draft is always
//! produced.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use switchyard_core::reasoning::{invoke_bounded, ReasoningRequest, SharedProvider};
use switchyard_core::types::{Message, Sentiment};

use crate::topics::TopicExtractor;

const SYSTEM_PROMPT: &str = "You summarize conversations between a traveller and a \
London Underground assistant. Reply with a single JSON object and nothing else: \
{\"summary\": string, \"topics\": [string], \"sentiment\": \"positive\" | \"neutral\" | \"negative\", \
\"insights\": [string]}. Keep the summary under 80 words. Topics are short lower-case phrases \
such as \"circle line\" or \"journey planning\".";

const MAX_TRANSCRIPT_ENTRY_CHARS: usize = 500;
const MAX_RAW_SUMMARY_CHARS: usize = 1000;

/// What a summarization run produced, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub text: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
}

#[derive(Deserialize)]
struct SummaryPayload {
    summary: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    insights: Vec<String>,
}

pub struct Summarizer {
    provider: SharedProvider,
    timeout: Duration,
    max_topics: usize,
    extractor: TopicExtractor,
    positive: Regex,
    negative: Regex,
}

impl Summarizer {
    pub fn new(
        provider: SharedProvider,
        timeout: Duration,
        max_topics: usize,
        extractor: TopicExtractor,
    ) -> Self {
        Self {
            provider,
            timeout,
            max_topics,
            extractor,
            positive: Regex::new(r"(?i)\b(thanks|thank you|great|perfect|helpful|brilliant|good service)\b")
                .expect("Invalid sentiment regex"),
            negative: Regex::new(
                r"(?i)\b(delayed|delays|cancelled|suspended|terrible|awful|useless|annoying|frustrat\w*|late)\b",
            )
            .expect("Invalid sentiment regex"),
        }
    }

    /// Summarize `messages` (already ordered oldest first). Never fails.
    pub async fn summarize(&self, messages: &[Message]) -> SummaryDraft {
        let transcript = build_transcript(messages);
        let request = ReasoningRequest::new(SYSTEM_PROMPT, transcript.clone(), self.timeout)
            .with_temperature(0.3);

        match invoke_bounded(self.provider.as_ref(), &request).await {
            Ok(raw) => match parse_payload(&raw) {
                Some(payload) => self.from_payload(payload, &transcript),
                None => {
                    tracing::debug!("Summary reply was not JSON, keeping raw text");
                    SummaryDraft {
                        text: truncate(raw.trim(), MAX_RAW_SUMMARY_CHARS),
                        topics: self.extractor.extract(&transcript, self.max_topics),
                        sentiment: self.sentiment_of(&transcript),
                    }
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, messages = messages.len(), "Summary call failed, using template");
                self.templated(messages, &transcript)
            }
        }
    }

    fn from_payload(&self, payload: SummaryPayload, transcript: &str) -> SummaryDraft {
        let mut text = payload.summary.trim().to_string();
        let insights: Vec<&str> = payload
            .insights
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !insights.is_empty() {
            text.push_str("\nKey insights: ");
            text.push_str(&insights.join("; "));
        }

        let mut topics: Vec<String> = Vec::new();
        for topic in payload.topics {
            let topic = topic.trim().to_lowercase();
            if !topic.is_empty() && !topics.contains(&topic) && topics.len() < self.max_topics {
                topics.push(topic);
            }
        }
        if topics.is_empty() {
            topics = self.extractor.extract(transcript, self.max_topics);
        }

        let sentiment = payload
            .sentiment
            .map(|s| Sentiment::parse_lenient(&s))
            .unwrap_or_else(|| self.sentiment_of(transcript));

        SummaryDraft {
            text,
            topics,
            sentiment,
        }
    }

    fn templated(&self, messages: &[Message], transcript: &str) -> SummaryDraft {
        let topics = self.extractor.extract(transcript, self.max_topics);
        let about = if topics.is_empty() {
            "general travel questions".to_string()
        } else {
            topics.join(", ")
        };
        let span = match (messages.first(), messages.last()) {
            (Some(first), Some(last)) => format!(" between {} and {}", first.created_at, last.created_at),
            _ => String::new(),
        };
        SummaryDraft {
            text: format!("Conversation of {} messages{} about {}.", messages.len(), span, about),
            topics,
            sentiment: self.sentiment_of(transcript),
        }
    }

    fn sentiment_of(&self, text: &str) -> Sentiment {
        let positive = self.positive.find_iter(text).count();
        let negative = self.negative.find_iter(text).count();
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }
}

fn build_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, truncate(&m.content, MAX_TRANSCRIPT_ENTRY_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull the outermost JSON object out of a reply that may be wrapped in
/// prose or a code fence.
fn parse_payload(raw: &str) -> Option<SummaryPayload> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<SummaryPayload>(&raw[start..=end])
        .ok()
        .filter(|p| !p.summary.trim().is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
