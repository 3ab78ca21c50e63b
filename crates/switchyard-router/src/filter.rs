//! Local content filter, run before any reasoning call.

use regex::Regex;

use switchyard_core::types::FilterReason;

use crate::tables::RoutingTables;

pub struct ContentFilter {
    abusive: Regex,
    other_transport: Regex,
    general_topics: Regex,
    domain_words: Regex,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFilter {
    pub fn new() -> Self {
        Self {
            abusive: Regex::new(
                r"(?i)\b(fuck\w*|shit\w*|bastard\w*|bitch\w*|cunt\w*|wanker\w*|twat\w*|dickhead\w*|arsehole\w*|asshole\w*|kill yourself|idiot\w*|moron\w*)\b",
            )
            .expect("Invalid abusive regex"),
            other_transport: Regex::new(
                r"(?i)\b(bus|buses|overground|tram|trams|national rail|dlr|taxi|taxis|uber|cab|cabs|bike|bikes|cycle hire|riverboat|river bus|coach|coaches|flight|flights|airport transfer)\b",
            )
            .expect("Invalid transport regex"),
            general_topics: Regex::new(
                r"(?i)\b(weather|restaurants?|shopping|history|sightseeing|museums?|hotels?|football|recipes?|jokes?|theatre tickets|nightlife)\b",
            )
            .expect("Invalid topic regex"),
            domain_words: Regex::new(r"(?i)\b(tube|underground|mind the gap|line|lines|station|stations|platform|train|trains)\b")
                .expect("Invalid domain regex"),
        }
    }

    /// `Some(reason)` when the query must not reach a handler.
    ///
    /// Abusive text is always rejected. Other transport modes and general
    /// London topics are rejected only when nothing in the query ties it to
    /// the network.
    pub fn check(&self, query: &str, tables: &RoutingTables) -> Option<FilterReason> {
        if self.abusive.is_match(query) {
            return Some(FilterReason::Inappropriate);
        }
        let off_domain = self.other_transport.is_match(query) || self.general_topics.is_match(query);
        if off_domain && !self.has_domain_signal(query, tables) {
            return Some(FilterReason::OffTopic);
        }
        None
    }

    fn has_domain_signal(&self, query: &str, tables: &RoutingTables) -> bool {
        self.domain_words.is_match(query)
            || !tables.explicit_mentions(query).is_empty()
            || !tables.entities_in(query).is_empty()
            || tables
                .routable_ids()
                .iter()
                .any(|id| tables.keyword_hits(id, query) > 0)
    }
}
