//! Deterministic confidence scoring.
//!
//! Pure and table-driven: the score depends only on the query, the chosen
//! handler and the compiled catalog, never on the reasoning output.

use serde::{Deserialize, Serialize};

use switchyard_core::types::HandlerId;

use crate::tables::RoutingTables;

pub const EXPLICIT_MENTION: f64 = 0.95;
pub const PREFERRED_FOR_ENTITY: f64 = 0.9;
pub const SERVES_ENTITY: f64 = 0.6;
pub const STRONG_KEYWORDS: f64 = 0.9;
pub const SINGLE_KEYWORD: f64 = 0.7;
pub const BASELINE: f64 = 0.5;

/// Which rule produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBasis {
    ExplicitMention,
    PreferredForEntity,
    ServesEntity,
    Keywords(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub value: f64,
    pub basis: ConfidenceBasis,
}

/// Score `chosen` for `query`.
///
/// Rules in order: explicit mention of the chosen handler, then a shared
/// entity with an urgency pattern (preferred or merely serving), then the
/// number of the handler's keywords present.
pub fn score(tables: &RoutingTables, query: &str, chosen: &HandlerId) -> Confidence {
    if tables.mentions(chosen, query) {
        return Confidence {
            value: EXPLICIT_MENTION,
            basis: ConfidenceBasis::ExplicitMention,
        };
    }

    if tables.is_urgent(query) {
        if let Some(hit) = tables.shared_entity(query) {
            if HandlerId::new(&hit.entity.preferred) == *chosen {
                return Confidence {
                    value: PREFERRED_FOR_ENTITY,
                    basis: ConfidenceBasis::PreferredForEntity,
                };
            }
            if hit.entity.served_by.iter().any(|s| HandlerId::new(s) == *chosen) {
                return Confidence {
                    value: SERVES_ENTITY,
                    basis: ConfidenceBasis::ServesEntity,
                };
            }
        }
    }

    let hits = tables.keyword_hits(chosen, query);
    let value = match hits {
        0 => BASELINE,
        1 => SINGLE_KEYWORD,
        _ => STRONG_KEYWORDS,
    };
    Confidence {
        value,
        basis: ConfidenceBasis::Keywords(hits),
    }
}
