//! Multi-step journey detection, used to decide whether an answer needs the
//! user's confirmation.

use regex::Regex;

pub struct ComplexityDetector {
    indicators: Vec<Regex>,
}

impl Default for ComplexityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplexityDetector {
    pub fn new() -> Self {
        let indicators = [
            r"(?i)\binterchange\b",
            r"(?i)\bchange\s+at\b",
            r"(?i)\bmultiple\s+lines\b",
            r"(?i)\balternative\s+route\b",
            r"(?i)\bdisruptions?\b",
            r"(?i)\bdelayed\b",
            r"(?i)\bsuspended\b",
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("Invalid complexity regex"))
        .collect();
        Self { indicators }
    }

    /// Whether the query or the answer describes a multi-step journey.
    pub fn is_multi_step(&self, query: &str, answer: &str) -> bool {
        self.indicators
            .iter()
            .any(|re| re.is_match(query) || re.is_match(answer))
    }
}
