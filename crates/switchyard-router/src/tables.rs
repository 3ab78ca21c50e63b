//! Compiled form of the handler catalog.
//!
//! Everything the deterministic routing paths need is built once from
//! [`CatalogConfig`]: mention regexes, keyword and entity matchers, and the
//! shared-entity preference table.

use std::collections::HashMap;

use regex::Regex;

use switchyard_core::catalog::{CatalogConfig, HandlerProfile, SharedEntity};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::HandlerId;

/// A lower-case phrase matched on word boundaries, so `bank` does not fire
/// inside `embankment`.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub text: String,
    re: Regex,
}

impl Phrase {
    pub fn new(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        let starts_word = text.chars().next().is_some_and(|c| c.is_alphanumeric());
        let ends_word = text.chars().last().is_some_and(|c| c.is_alphanumeric());
        let pattern = format!(
            "(?i){}{}{}",
            if starts_word { r"\b" } else { "" },
            regex::escape(&text),
            if ends_word { r"\b" } else { "" },
        );
        Regex::new(&pattern).ok().map(|re| Self { text, re })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.re.is_match(haystack)
    }

    /// Byte span of the first occurrence.
    pub fn find(&self, haystack: &str) -> Option<(usize, usize)> {
        self.re.find(haystack).map(|m| (m.start(), m.end()))
    }
}

#[derive(Debug)]
struct CompiledHandler {
    id: HandlerId,
    profile: HandlerProfile,
    mention: Regex,
    name: Option<Phrase>,
    keywords: Vec<String>,
    entities: Vec<String>,
}

/// A shared entity found in a query, with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMatch<'a> {
    pub entity: &'a SharedEntity,
    pub position: usize,
}

#[derive(Debug)]
pub struct RoutingTables {
    handlers: Vec<CompiledHandler>,
    index: HashMap<HandlerId, usize>,
    shared: Vec<(Phrase, SharedEntity)>,
    entity_phrases: Vec<Phrase>,
    urgency: Regex,
    status_handler: HandlerId,
    high_traffic: Vec<HandlerId>,
    journey_defaults: Vec<HandlerId>,
    station_defaults: Vec<HandlerId>,
}

impl RoutingTables {
    /// Compile the catalog. Fails on an invalid mention pattern.
    pub fn compile(catalog: &CatalogConfig) -> Result<Self> {
        let mut handlers = Vec::with_capacity(catalog.handlers.len());
        let mut index = HashMap::new();

        for profile in &catalog.handlers {
            let mention = Regex::new(&profile.mention_pattern).map_err(|e| {
                SwitchyardError::Config(format!(
                    "invalid mention pattern for {}: {}",
                    profile.id, e
                ))
            })?;
            let id = HandlerId::new(&profile.id);
            index.insert(id.clone(), handlers.len());
            handlers.push(CompiledHandler {
                id,
                profile: profile.clone(),
                mention,
                name: Phrase::new(&profile.name),
                keywords: profile
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                entities: profile.entities.iter().map(|e| e.to_lowercase()).collect(),
            });
        }

        let shared = catalog
            .shared_entities
            .iter()
            .filter_map(|e| Phrase::new(&e.name).map(|p| (p, e.clone())))
            .collect();

        let mut entity_names: Vec<String> = catalog
            .shared_entities
            .iter()
            .map(|e| e.name.to_lowercase())
            .chain(catalog.handlers.iter().flat_map(|p| p.entities.iter().map(|e| e.to_lowercase())))
            .collect();
        entity_names.sort();
        entity_names.dedup();
        let entity_phrases = entity_names.iter().filter_map(|n| Phrase::new(n)).collect();

        let ids = |list: &[String]| list.iter().map(HandlerId::new).collect::<Vec<_>>();

        Ok(Self {
            handlers,
            index,
            shared,
            entity_phrases,
            urgency: Regex::new(r"(?i)\b(next|when|arrival|arrivals|due|train.*times?|times?.*train)\b")
                .expect("Invalid urgency regex"),
            status_handler: HandlerId::new(&catalog.status_handler),
            high_traffic: ids(&catalog.high_traffic),
            journey_defaults: ids(&catalog.journey_defaults),
            station_defaults: ids(&catalog.station_defaults),
        })
    }

    pub fn profile(&self, id: &HandlerId) -> Option<&HandlerProfile> {
        self.index.get(id).map(|&i| &self.handlers[i].profile)
    }

    pub fn contains(&self, id: &HandlerId) -> bool {
        self.index.contains_key(id)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self, id: &HandlerId) -> String {
        self.profile(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Ids the classifier may route to, in catalog order.
    pub fn routable_ids(&self) -> Vec<HandlerId> {
        self.handlers
            .iter()
            .filter(|h| h.profile.routable)
            .map(|h| h.id.clone())
            .collect()
    }

    pub fn is_routable(&self, id: &HandlerId) -> bool {
        self.profile(id).is_some_and(|p| p.routable)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &HandlerProfile> {
        self.handlers.iter().map(|h| &h.profile)
    }

    /// Routable handlers explicitly named in the query, in catalog order.
    pub fn explicit_mentions(&self, query: &str) -> Vec<HandlerId> {
        self.handlers
            .iter()
            .filter(|h| h.profile.routable && h.mention.is_match(query))
            .map(|h| h.id.clone())
            .collect()
    }

    /// Whether `id`'s mention pattern fires on the query.
    pub fn mentions(&self, id: &HandlerId, query: &str) -> bool {
        self.index
            .get(id)
            .is_some_and(|&i| self.handlers[i].mention.is_match(query))
    }

    /// Whether the handler's display name appears as a phrase, e.g. a bare
    /// "victoria". Looser than [`mentions`](Self::mentions).
    pub fn names(&self, id: &HandlerId, query: &str) -> bool {
        self.index.get(id).is_some_and(|&i| {
            self.handlers[i]
                .name
                .as_ref()
                .is_some_and(|n| n.is_match(query))
        })
    }

    /// Number of the handler's keywords contained in the query, matched as
    /// plain substrings: "circles" counts for `circle`.
    pub fn keyword_hits(&self, id: &HandlerId, query: &str) -> usize {
        let query = query.to_lowercase();
        self.index.get(id).map_or(0, |&i| {
            self.handlers[i]
                .keywords
                .iter()
                .filter(|k| query.contains(k.as_str()))
                .count()
        })
    }

    /// The shared entity mentioned earliest in the query.
    pub fn shared_entity(&self, query: &str) -> Option<EntityMatch<'_>> {
        self.shared
            .iter()
            .filter_map(|(phrase, entity)| {
                phrase
                    .find(query)
                    .map(|(start, _)| EntityMatch { entity, position: start })
            })
            .min_by_key(|m| m.position)
    }

    pub fn is_urgent(&self, query: &str) -> bool {
        self.urgency.is_match(query)
    }

    /// Every known entity named in the query, in order of appearance.
    /// Overlapping matches keep the longest ("walthamstow central" over
    /// "central").
    pub fn entities_in(&self, query: &str) -> Vec<String> {
        let mut hits: Vec<(usize, usize, &str)> = self
            .entity_phrases
            .iter()
            .filter_map(|p| p.find(query).map(|(s, e)| (s, e, p.text.as_str())))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| (b.1 - b.0).cmp(&(a.1 - a.0))));

        let mut found: Vec<String> = Vec::new();
        let mut covered_until = 0;
        for (start, end, name) in hits {
            if start < covered_until {
                continue;
            }
            covered_until = end;
            found.push(name.to_string());
        }
        found
    }

    /// Handlers serving an entity: the shared table's list first, then any
    /// profile that lists it, deduplicated.
    pub fn handlers_serving(&self, entity: &str) -> Vec<HandlerId> {
        let entity = entity.to_lowercase();
        let mut serving: Vec<HandlerId> = self
            .shared
            .iter()
            .filter(|(_, e)| e.name.eq_ignore_ascii_case(&entity))
            .flat_map(|(_, e)| e.served_by.iter().map(HandlerId::new))
            .collect();
        for h in &self.handlers {
            if h.entities.contains(&entity) && !serving.contains(&h.id) {
                serving.push(h.id.clone());
            }
        }
        serving
    }

    pub fn status_handler(&self) -> &HandlerId {
        &self.status_handler
    }

    pub fn high_traffic(&self) -> &[HandlerId] {
        &self.high_traffic
    }

    pub fn journey_defaults(&self) -> &[HandlerId] {
        &self.journey_defaults
    }

    pub fn station_defaults(&self) -> &[HandlerId] {
        &self.station_defaults
    }
}
