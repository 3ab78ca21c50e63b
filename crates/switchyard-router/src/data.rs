//! Domain data seam.
//!
//! Handlers ask a [`DomainDataProvider`] for live data and shape it into
//! their structured response. The orchestration core never calls it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use switchyard_core::catalog::HandlerProfile;

use crate::error::DataError;
use crate::tables::Phrase;

#[async_trait]
pub trait DomainDataProvider: Send + Sync {
    /// Data relevant to `query` for the handler described by `profile`.
    async fn fetch(&self, profile: &HandlerProfile, query: &str) -> Result<Value, DataError>;
}

pub type SharedDataProvider = Arc<dyn DomainDataProvider>;

/// Offline provider backed by a fixed status table.
///
/// Every line reports "Good Service" unless overridden. Profiles with no
/// entities are treated as network-wide and receive every line's status.
#[derive(Debug, Clone, Default)]
pub struct StaticDataProvider {
    statuses: HashMap<String, String>,
    lines: Vec<(String, String)>,
    unavailable: bool,
}

impl StaticDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that knows the display names of `profiles`, used for
    /// network-wide answers.
    pub fn for_profiles(profiles: &[HandlerProfile]) -> Self {
        Self {
            lines: profiles
                .iter()
                .filter(|p| p.routable)
                .map(|p| (p.id.to_uppercase(), p.name.clone()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, handler_id: &str, status: impl Into<String>) -> Self {
        self.statuses.insert(handler_id.to_uppercase(), status.into());
        self
    }

    /// Every fetch fails, as if the upstream feed were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn status_of(&self, id: &str) -> &str {
        self.statuses
            .get(&id.to_uppercase())
            .map(String::as_str)
            .unwrap_or("Good Service")
    }
}

#[async_trait]
impl DomainDataProvider for StaticDataProvider {
    async fn fetch(&self, profile: &HandlerProfile, query: &str) -> Result<Value, DataError> {
        if self.unavailable {
            return Err(DataError::Unavailable("status feed offline".to_string()));
        }

        if profile.entities.is_empty() {
            let lines: Vec<Value> = self
                .lines
                .iter()
                .map(|(id, name)| json!({ "line": name, "status": self.status_of(id) }))
                .collect();
            let disrupted = self
                .lines
                .iter()
                .filter(|(id, _)| self.status_of(id) != "Good Service")
                .count();
            return Ok(json!({
                "scope": "network",
                "lines": lines,
                "disrupted": disrupted,
            }));
        }

        let stations: Vec<&str> = profile
            .entities
            .iter()
            .filter(|e| Phrase::new(e).is_some_and(|p| p.is_match(query)))
            .map(String::as_str)
            .collect();

        Ok(json!({
            "scope": "line",
            "line": profile.name,
            "status": self.status_of(&profile.id),
            "stations": stations,
        }))
    }
}
