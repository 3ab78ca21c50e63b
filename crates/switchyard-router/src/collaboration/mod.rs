//! Multi-handler collaboration: when a query needs more than one
//! specialist, which ones, and what each is asked.

pub mod coordinator;
pub mod synthesis;

use regex::Regex;
use serde::{Deserialize, Serialize};

use switchyard_core::types::HandlerId;

use crate::tables::RoutingTables;

pub use coordinator::{CollaborationCoordinator, CollaborationOutcome};
pub use synthesis::{synthesize, validate, Contribution, Synthesis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationKind {
    /// Travel between two places, possibly changing lines.
    Journey,
    /// Status across the whole network.
    NetworkWide,
    /// Comparing routes or lines.
    Comparison,
    /// Which lines serve a station, facilities, accessibility.
    StationServices,
}

impl std::fmt::Display for CollaborationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollaborationKind::Journey => "journey",
            CollaborationKind::NetworkWide => "network_wide",
            CollaborationKind::Comparison => "comparison",
            CollaborationKind::StationServices => "station_services",
        };
        f.write_str(s)
    }
}

/// A decision to collaborate, with the handlers to consult besides the
/// primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationPlan {
    pub kind: CollaborationKind,
    pub collaborators: Vec<HandlerId>,
}

impl CollaborationPlan {
    /// The query sent to `collaborator` in place of the original.
    pub fn focused_query(&self, query: &str, collaborator: &HandlerId, tables: &RoutingTables) -> String {
        match self.kind {
            CollaborationKind::NetworkWide if collaborator == tables.status_handler() => {
                "What is the current overall status of the network?".to_string()
            }
            CollaborationKind::NetworkWide => format!(
                "What is the current status of the {} line?",
                tables.display_name(collaborator)
            ),
            CollaborationKind::Journey => format!(
                "{} - focus on {} line connectivity",
                query,
                tables.display_name(collaborator)
            ),
            CollaborationKind::Comparison | CollaborationKind::StationServices => query.to_string(),
        }
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Classifies queries by the collaboration they need. Indicators are checked
/// journey, network-wide, comparison, station services; first match wins.
pub struct CollaborationDetector {
    indicators: Vec<(CollaborationKind, Vec<Regex>)>,
}

impl Default for CollaborationDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CollaborationDetector {
    pub fn new() -> Self {
        let table: [(CollaborationKind, &[&str]); 4] = [
            (
                CollaborationKind::Journey,
                &[
                    r"(?i)\bfrom\s+.+\s+to\s+.+",
                    r"(?i)\bjourney\s+from\b",
                    r"(?i)\btravel\s+from\s+.+\s+to\b",
                    r"(?i)\broute\s+from\s+.+\s+to\b",
                    r"(?i)\b(best\s+way|how\s+(do\s+i\s+)?(to\s+)?get)\s+from\s+.+\s+to\b",
                    r"(?i)\binterchange\b",
                    r"(?i)\bchange\s+at\b",
                    r"(?i)\bconnect(s|ing|ion)?\b",
                ],
            ),
            (
                CollaborationKind::NetworkWide,
                &[
                    r"(?i)\ball\s+lines\b",
                    r"(?i)\bnetwork\s+status\b",
                    r"(?i)\boverall\s+service\b",
                    r"(?i)\bgeneral\s+status\b",
                    r"(?i)\bmultiple\s+lines\b",
                ],
            ),
            (
                CollaborationKind::Comparison,
                &[
                    r"(?i)\bcompare\b",
                    r"(?i)\bbetter\s+route\b",
                    r"(?i)\balternative\b",
                    r"(?i)\bfastest\s+way\b",
                    r"(?i)\bquickest\s+route\b",
                ],
            ),
            (
                CollaborationKind::StationServices,
                &[
                    r"(?i)\bfacilities\s+at\b",
                    r"(?i)\baccessibility(\s+at)?\b",
                    r"(?i)\bstep[\s-]+free\s+access\b",
                    r"(?i)\bwhich\s+lines\s+serve\b",
                ],
            ),
        ];

        let indicators = table
            .into_iter()
            .map(|(kind, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("Invalid collaboration regex"))
                    .collect();
                (kind, compiled)
            })
            .collect();
        Self { indicators }
    }

    pub fn detect(&self, query: &str) -> Option<CollaborationKind> {
        self.indicators
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(query)))
            .map(|(kind, _)| *kind)
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Pick collaborators for `kind`: never the primary, never a handler
/// outside `available`, no duplicates, at most `max`.
pub fn select_collaborators(
    kind: CollaborationKind,
    query: &str,
    primary: &HandlerId,
    tables: &RoutingTables,
    available: &[HandlerId],
    max: usize,
) -> Vec<HandlerId> {
    let candidates: Vec<HandlerId> = match kind {
        CollaborationKind::Journey => {
            let serving = serving_ranked(query, tables);
            if serving.is_empty() {
                tables.journey_defaults().to_vec()
            } else {
                serving
            }
        }
        CollaborationKind::NetworkWide => std::iter::once(tables.status_handler().clone())
            .chain(tables.high_traffic().iter().cloned())
            .collect(),
        CollaborationKind::Comparison => {
            let named: Vec<HandlerId> = tables
                .routable_ids()
                .into_iter()
                .filter(|id| tables.mentions(id, query) || tables.names(id, query))
                .collect();
            if named.is_empty() {
                vec![tables.status_handler().clone()]
            } else {
                named
            }
        }
        CollaborationKind::StationServices => {
            let serving = serving_ranked(query, tables);
            if serving.is_empty() {
                tables.station_defaults().to_vec()
            } else {
                serving
            }
        }
    };

    let mut selected: Vec<HandlerId> = Vec::new();
    for id in candidates {
        if selected.len() >= max {
            break;
        }
        if &id != primary && available.contains(&id) && !selected.contains(&id) {
            selected.push(id);
        }
    }
    selected
}

/// Handlers serving the entities named in the query, those serving the most
/// of them first (a line that connects both ends of a journey leads).
fn serving_ranked(query: &str, tables: &RoutingTables) -> Vec<HandlerId> {
    let mut ranked: Vec<(HandlerId, usize)> = Vec::new();
    for entity in tables.entities_in(query) {
        for id in tables.handlers_serving(&entity) {
            match ranked.iter_mut().find(|(existing, _)| *existing == id) {
                Some((_, count)) => *count += 1,
                None => ranked.push((id, 1)),
            }
        }
    }
    // Stable: ties keep first-seen order.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().map(|(id, _)| id).collect()
}
