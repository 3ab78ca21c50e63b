//! Fixed-vocabulary topic extraction, used whenever the reasoning provider
//! does not supply topics.

use regex::Regex;

use switchyard_core::catalog::CatalogConfig;

/// Maps free text onto a small, stable topic vocabulary: one topic per
/// catalog line ("circle line") plus a handful of travel themes.
pub struct TopicExtractor {
    lines: Vec<(Regex, String)>,
    themes: Vec<(Regex, &'static str)>,
}

impl TopicExtractor {
    /// Build from display names such as `"Circle"` or `"Hammersmith & City"`.
    pub fn new(line_names: &[String]) -> Self {
        let lines = line_names
            .iter()
            .filter_map(|name| {
                let lower = name.to_lowercase();
                let pattern = format!(r"(?i)\b{}\b", regex::escape(&lower));
                Regex::new(&pattern).ok().map(|re| (re, format!("{} line", lower)))
            })
            .collect();

        let themes = [
            (
                r"(?i)\b(delay|delays|delayed|disruption|disruptions|suspended|closure|closures)\b",
                "service disruptions",
            ),
            (r"(?i)\b(journey|journeys|travel|route|routes|get from|get to)\b", "journey planning"),
            (r"(?i)\b(station|stations|platform|step[- ]free|accessibility)\b", "station information"),
            (r"(?i)\b(arrival|arrivals|next train|when|times?)\b", "arrival times"),
            (r"(?i)\b(status|good service)\b", "service status"),
        ]
        .into_iter()
        .map(|(pat, topic)| (Regex::new(pat).expect("Invalid topic regex"), topic))
        .collect();

        Self { lines, themes }
    }

    /// Vocabulary from the routable handlers of a catalog.
    pub fn from_catalog(catalog: &CatalogConfig) -> Self {
        let names: Vec<String> = catalog
            .handlers
            .iter()
            .filter(|p| p.routable)
            .map(|p| p.name.clone())
            .collect();
        Self::new(&names)
    }

    /// Topics mentioned in `text`, lines first, at most `max`.
    pub fn extract(&self, text: &str, max: usize) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        let labels = self
            .lines
            .iter()
            .map(|(re, label)| (re, label.as_str()))
            .chain(self.themes.iter().map(|(re, label)| (re, *label)));

        for (re, label) in labels {
            if topics.len() >= max {
                break;
            }
            if re.is_match(text) && !topics.iter().any(|t| t == label) {
                topics.push(label.to_string());
            }
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TopicExtractor {
        TopicExtractor::from_catalog(&CatalogConfig::default())
    }

    #[test]
    fn test_extracts_line_topics() {
        let topics = extractor().extract("Is the Circle line running? And the district?", 5);
        assert_eq!(topics, vec!["circle line", "district line"]);
    }

    #[test]
    fn test_extracts_themes() {
        let topics = extractor().extract("Delays at the station, when is the next train?", 5);
        assert!(topics.contains(&"service disruptions".to_string()));
        assert!(topics.contains(&"station information".to_string()));
        assert!(topics.contains(&"arrival times".to_string()));
    }

    #[test]
    fn test_multiword_line_name() {
        let topics = extractor().extract("hammersmith & city status", 5);
        assert_eq!(topics[0], "hammersmith & city line");
        assert!(topics.contains(&"service status".to_string()));
    }

    #[test]
    fn test_respects_max() {
        let text = "circle district central bakerloo jubilee northern delays journey";
        assert_eq!(extractor().extract(text, 5).len(), 5);
        assert_eq!(extractor().extract(text, 2), vec!["bakerloo line", "central line"]);
    }

    #[test]
    fn test_no_topics() {
        assert!(extractor().extract("hello there", 5).is_empty());
    }
}
