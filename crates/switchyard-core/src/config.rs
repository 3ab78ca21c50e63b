use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::CatalogConfig;
use crate::error::{Result, SwitchyardError};

/// Top-level configuration for Switchyard.
///
/// Loaded from `~/.switchyard/config.toml` by default. Every section falls
/// back to its defaults when absent, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub collaboration: CollaborationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl SwitchyardConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SwitchyardConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Cross-section consistency checks.
    pub fn validate(&self) -> Result<()> {
        if self.catalog.profile(&self.routing.default_handler).is_none() {
            return Err(SwitchyardError::Config(format!(
                "routing.default_handler '{}' is not in the catalog",
                self.routing.default_handler
            )));
        }
        for entity in &self.catalog.shared_entities {
            if !entity.served_by.contains(&entity.preferred) {
                return Err(SwitchyardError::Config(format!(
                    "shared entity '{}' prefers '{}' which does not serve it",
                    entity.name, entity.preferred
                )));
            }
        }
        if self.memory.summarize_threshold == 0 {
            return Err(SwitchyardError::Config(
                "memory.summarize_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.switchyard/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Reasoning provider connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// OpenAI-compatible endpoint root.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Upper bound on every reasoning call.
    pub timeout_secs: u64,
    pub temperature: f32,
    pub classifier_max_tokens: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 10,
            temperature: 0.2,
            classifier_max_tokens: 16,
        }
    }
}

impl ReasoningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Classifier and input-sanitizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Handler used when classification output is unusable.
    pub default_handler: String,
    pub max_query_chars: usize,
    pub max_thread_id_chars: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_handler: "CENTRAL".to_string(),
            max_query_chars: 1000,
            max_thread_id_chars: 100,
        }
    }
}

/// Request state machine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Ask before answering multi-step journeys.
    pub confirmation_enabled: bool,
    /// How many times a rejected answer may be re-routed.
    pub max_confirmation_retries: u32,
    /// Upper bound on one handler invocation, data fetch included.
    pub handler_timeout_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            confirmation_enabled: false,
            max_confirmation_retries: 1,
            handler_timeout_secs: 15,
        }
    }
}

impl OrchestrationConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

/// Multi-handler collaboration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    pub enabled: bool,
    pub max_collaborators: usize,
    /// Maximum characters quoted from each collaborator.
    pub excerpt_chars: usize,
    /// Synthesized answers at or below this length are rejected.
    pub min_response_chars: usize,
    /// Synthesized answers at or below this confidence are rejected.
    pub min_confidence: f64,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_collaborators: 3,
            excerpt_chars: 200,
            min_response_chars: 50,
            min_confidence: 0.3,
        }
    }
}

/// Conversation store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub summarization_enabled: bool,
    /// Unsummarized messages that trigger a new summary.
    pub summarize_threshold: u32,
    /// Default number of recent messages returned by history.
    pub history_limit: u32,
    /// Maximum topics kept per summary and per insight report.
    pub max_topics: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            summarization_enabled: true,
            summarize_threshold: 20,
            history_limit: 50,
            max_topics: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.general.data_dir, "~/.switchyard/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.reasoning.timeout_secs, 10);
        assert_eq!(config.routing.default_handler, "CENTRAL");
        assert_eq!(config.routing.max_query_chars, 1000);
        assert!(!config.orchestration.confirmation_enabled);
        assert_eq!(config.orchestration.max_confirmation_retries, 1);
        assert_eq!(config.collaboration.max_collaborators, 3);
        assert_eq!(config.collaboration.excerpt_chars, 200);
        assert_eq!(config.memory.summarize_threshold, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[routing]
default_handler = "DISTRICT"

[memory]
summarize_threshold = 4
"#;
        let file = create_temp_config(content);
        let config = SwitchyardConfig::load(file.path()).unwrap();
        assert_eq!(config.routing.default_handler, "DISTRICT");
        assert_eq!(config.routing.max_query_chars, 1000);
        assert_eq!(config.memory.summarize_threshold, 4);
        assert_eq!(config.memory.history_limit, 50);
        assert_eq!(config.catalog.handlers.len(), 13);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = SwitchyardConfig::load(file.path()).unwrap();
        assert_eq!(config.reasoning.model, "gpt-4o-mini");
        assert!(config.collaboration.enabled);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is [not valid");
        assert!(SwitchyardConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_default_handler() {
        let file = create_temp_config("[routing]\ndefault_handler = \"MONORAIL\"\n");
        let err = SwitchyardConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("MONORAIL"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = SwitchyardConfig::load_or_default(Path::new("/nonexistent/switchyard.toml"));
        assert_eq!(config.routing.default_handler, "CENTRAL");
    }

    #[test]
    fn test_custom_catalog_replaces_builtin() {
        let content = r#"
[routing]
default_handler = "RED"

[catalog]
status_handler = "STATUS"
high_traffic = ["RED"]

[[catalog.handlers]]
id = "RED"
name = "Red"
mention_pattern = '(?i)\bred(\s+line)?\b'
keywords = ["red", "harbour"]

[[catalog.shared_entities]]
name = "harbour"
served_by = ["RED", "BLUE"]
preferred = "RED"
"#;
        let file = create_temp_config(content);
        let config = SwitchyardConfig::load(file.path()).unwrap();
        assert_eq!(config.catalog.handlers.len(), 1);
        assert!(config.catalog.handlers[0].routable);
        assert_eq!(config.catalog.shared_entities[0].preferred, "RED");
        // Unset catalog fields keep their defaults.
        assert_eq!(config.catalog.journey_defaults.len(), 3);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SwitchyardConfig::default();
        config.orchestration.confirmation_enabled = true;
        config.collaboration.min_confidence = 0.4;
        config.save(&path).unwrap();

        let loaded = SwitchyardConfig::load(&path).unwrap();
        assert!(loaded.orchestration.confirmation_enabled);
        assert_eq!(loaded.collaboration.min_confidence, 0.4);
        assert_eq!(loaded.catalog, config.catalog);
    }

    #[test]
    fn test_durations() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.reasoning.timeout(), Duration::from_secs(10));
        assert_eq!(config.orchestration.handler_timeout(), Duration::from_secs(15));
    }
}
