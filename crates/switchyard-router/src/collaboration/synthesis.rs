//! Merging several handler responses into one answer.

use serde::Serialize;
use serde_json::{Map, Value};

use switchyard_core::types::{HandlerId, HandlerResponse};

use crate::error::SynthesisError;

const ADDITIONAL_HEADER: &str = "\n\n**Additional Information:**\n";
const ERROR_MARKER: &str = "Error:";

/// One handler's answer, labelled for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub handler: HandlerId,
    pub name: String,
    pub response: HandlerResponse,
}

impl Contribution {
    pub fn new(handler: HandlerId, name: impl Into<String>, response: HandlerResponse) -> Self {
        Self {
            handler,
            name: name.into(),
            response,
        }
    }

    fn usable(&self) -> bool {
        !self.response.is_error() && !self.response.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub text: String,
    pub structured_data: Option<Value>,
    pub confidence: f64,
    /// Handlers whose answers made it into the text.
    pub sources: Vec<HandlerId>,
}

impl Synthesis {
    /// The primary response on its own.
    pub fn primary_only(primary: &Contribution) -> Self {
        Self {
            text: primary.response.text.clone(),
            structured_data: primary.response.structured_data.clone(),
            confidence: primary.response.confidence,
            sources: vec![primary.handler.clone()],
        }
    }

    pub fn is_collaborative(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Combine the primary answer with the collaborators that succeeded.
///
/// With no usable collaborator the primary is returned unchanged. Otherwise
/// each collaborator contributes an excerpt of at most `excerpt_chars`,
/// structured data is merged with the primary winning on key collisions,
/// and confidence is the mean over the primary and the collaborators that
/// made it into the text.
pub fn synthesize(primary: &Contribution, collaborators: &[Contribution], excerpt_chars: usize) -> Synthesis {
    let usable: Vec<&Contribution> = collaborators.iter().filter(|c| c.usable()).collect();
    if usable.is_empty() {
        return Synthesis::primary_only(primary);
    }

    let mut text = primary.response.text.trim_end().to_string();
    text.push_str(ADDITIONAL_HEADER);
    for c in &usable {
        text.push_str(&format!("\n• **{}**: {}", c.name, excerpt(&c.response.text, excerpt_chars)));
    }

    let sources: Vec<HandlerId> = std::iter::once(primary.handler.clone())
        .chain(usable.iter().map(|c| c.handler.clone()))
        .collect();

    let confidences: Vec<f64> = std::iter::once(primary)
        .filter(|c| !c.response.is_error())
        .chain(usable.iter().copied())
        .map(|c| c.response.confidence)
        .collect();
    let confidence = if confidences.is_empty() {
        primary.response.confidence
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    Synthesis {
        text,
        structured_data: Some(merge_data(primary, &usable, &sources)),
        confidence,
        sources,
    }
}

fn merge_data(primary: &Contribution, usable: &[&Contribution], sources: &[HandlerId]) -> Value {
    let mut merged = Map::new();
    let mut contributions = Map::new();

    for c in usable {
        match &c.response.structured_data {
            Some(Value::Object(fields)) => {
                for (k, v) in fields {
                    merged.entry(k.clone()).or_insert_with(|| v.clone());
                }
                contributions.insert(c.handler.to_string(), Value::Object(fields.clone()));
            }
            Some(other) => {
                contributions.insert(c.handler.to_string(), other.clone());
            }
            None => {}
        }
    }

    match &primary.response.structured_data {
        Some(Value::Object(fields)) => {
            for (k, v) in fields {
                merged.insert(k.clone(), v.clone());
            }
        }
        Some(other) => {
            merged.insert("primary".to_string(), other.clone());
        }
        None => {}
    }

    merged.insert("contributions".to_string(), Value::Object(contributions));
    merged.insert(
        "sources".to_string(),
        Value::Array(sources.iter().map(|s| Value::String(s.to_string())).collect()),
    );
    merged.insert("collaborative".to_string(), Value::Bool(true));
    Value::Object(merged)
}

/// Accept a synthesis only when it is long enough, carries no leaked error
/// text, and is confident enough.
pub fn validate(synthesis: &Synthesis, min_chars: usize, min_confidence: f64) -> Result<(), SynthesisError> {
    let len = synthesis.text.chars().count();
    if len <= min_chars {
        return Err(SynthesisError::TooShort(len));
    }
    if synthesis.text.contains(ERROR_MARKER) {
        return Err(SynthesisError::ErrorMarker);
    }
    if synthesis.confidence <= min_confidence {
        return Err(SynthesisError::LowConfidence(synthesis.confidence));
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contribution(id: &str, text: &str, data: Option<Value>, confidence: f64) -> Contribution {
        Contribution::new(
            HandlerId::new(id),
            id.to_lowercase(),
            HandlerResponse::answered(text, data, confidence),
        )
    }

    fn failed(id: &str) -> Contribution {
        Contribution::new(
            HandlerId::new(id),
            id.to_lowercase(),
            HandlerResponse::partial("", None, "timed out"),
        )
    }

    #[test]
    fn test_single_response_is_unchanged() {
        let primary = contribution("CIRCLE", "Good service.", Some(json!({"a": 1})), 0.95);
        let s = synthesize(&primary, &[], 200);
        assert_eq!(s.text, "Good service.");
        assert_eq!(s.structured_data, Some(json!({"a": 1})));
        assert_eq!(s.confidence, 0.95);
        assert!(!s.is_collaborative());
    }

    #[test]
    fn test_failed_collaborators_leave_primary_unchanged() {
        let primary = contribution("CIRCLE", "Good service.", None, 0.9);
        let s = synthesize(&primary, &[failed("DISTRICT")], 200);
        assert_eq!(s, Synthesis::primary_only(&primary));
    }

    #[test]
    fn test_concatenation_and_mean_confidence() {
        let primary = contribution("CENTRAL", "Take the Central line.", None, 0.9);
        let collaborators = vec![
            contribution("VICTORIA", "The Victoria line is direct.", None, 0.7),
            failed("CIRCLE"),
            contribution("DISTRICT", "District is running well.", None, 0.5),
        ];
        let s = synthesize(&primary, &collaborators, 200);
        assert!(s.text.starts_with("Take the Central line.\n\n**Additional Information:**\n"));
        assert!(s.text.contains("\n• **victoria**: The Victoria line is direct."));
        assert!(s.text.contains("\n• **district**: District is running well."));
        assert!(!s.text.contains("circle"));
        assert!((s.confidence - 0.7).abs() < 1e-9);
        assert_eq!(s.sources, vec![HandlerId::new("CENTRAL"), HandlerId::new("VICTORIA"), HandlerId::new("DISTRICT")]);
    }

    #[test]
    fn test_blank_collaborator_is_left_out_of_the_mean() {
        let primary = contribution("CENTRAL", "Take the Central line.", None, 0.9);
        let collaborators = vec![
            contribution("VICTORIA", "The Victoria line is direct.", None, 0.7),
            contribution("CIRCLE", "   ", None, 0.1),
        ];
        let s = synthesize(&primary, &collaborators, 200);
        assert!((s.confidence - 0.8).abs() < 1e-9);
        assert_eq!(s.sources, vec![HandlerId::new("CENTRAL"), HandlerId::new("VICTORIA")]);
    }

    #[test]
    fn test_excerpts_are_bounded() {
        let primary = contribution("CENTRAL", "Primary.", None, 0.9);
        let long = "x".repeat(500);
        let s = synthesize(&primary, &[contribution("CIRCLE", &long, None, 0.9)], 200);
        let expected = format!("**circle**: {}...", "x".repeat(200));
        assert!(s.text.ends_with(&expected));
    }

    #[test]
    fn test_data_merge_primary_wins() {
        let primary = contribution("CENTRAL", "p", Some(json!({"line": "Central", "status": "Good"})), 0.9);
        let collaborators = vec![contribution(
            "VICTORIA",
            "c",
            Some(json!({"line": "Victoria", "stations": ["victoria"]})),
            0.7,
        )];
        let data = synthesize(&primary, &collaborators, 200).structured_data.unwrap();
        assert_eq!(data["line"], "Central");
        assert_eq!(data["status"], "Good");
        assert_eq!(data["stations"], json!(["victoria"]));
        assert_eq!(data["contributions"]["VICTORIA"]["line"], "Victoria");
        assert_eq!(data["sources"], json!(["CENTRAL", "VICTORIA"]));
        assert_eq!(data["collaborative"], true);
    }

    #[test]
    fn test_validation() {
        let good = Synthesis {
            text: "y".repeat(60),
            structured_data: None,
            confidence: 0.8,
            sources: vec![],
        };
        assert!(validate(&good, 50, 0.3).is_ok());

        let short = Synthesis { text: "short".into(), ..good.clone() };
        assert_eq!(validate(&short, 50, 0.3), Err(SynthesisError::TooShort(5)));

        let leaked = Synthesis {
            text: format!("{} Error: upstream", "y".repeat(60)),
            ..good.clone()
        };
        assert_eq!(validate(&leaked, 50, 0.3), Err(SynthesisError::ErrorMarker));

        let unsure = Synthesis { confidence: 0.2, ..good };
        assert_eq!(validate(&unsure, 50, 0.3), Err(SynthesisError::LowConfidence(0.2)));
    }
}
