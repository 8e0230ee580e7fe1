//! Engine configuration.
//!
//! TOML file plus `CASEGRAPH_*` environment overrides. Everything has a
//! working default so a local Neo4j plus an unconfigured (and therefore
//! disabled) generation backend runs out of the box.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use casegraph_databases::Neo4jConfig;

use crate::llm::LlmConfig;

/// Retrieval bounds enforced per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalLimits {
    /// Entities expanded per entity-scoped query category.
    pub entity_cap: usize,
    /// Trailing turns scanned for carried-forward entities.
    pub history_window: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            entity_cap: 3,
            history_window: crate::memory::HISTORY_RECALL_WINDOW,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalLimits,
}

impl EngineConfig {
    /// Load configuration from `path`, or from the default location when
    /// `None`. A missing file yields defaults; environment overrides apply
    /// either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: EngineConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            debug!("No config file at {}, using defaults", path.display());
            EngineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| anyhow!("no config directory available"))?;
        Ok(base.join("casegraph").join("config.toml"))
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var("CASEGRAPH_NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Ok(username) = std::env::var("CASEGRAPH_NEO4J_USERNAME") {
            self.neo4j.username = username;
        }
        if let Ok(password) = std::env::var("CASEGRAPH_NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Ok(database) = std::env::var("CASEGRAPH_NEO4J_DATABASE") {
            self.neo4j.database = database;
        }
        if let Ok(api_key) = std::env::var("CASEGRAPH_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }
        if let Ok(base_url) = std::env::var("CASEGRAPH_LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Ok(model) = std::env::var("CASEGRAPH_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.neo4j.uri.trim().is_empty() {
            return Err(anyhow!("neo4j.uri must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            ));
        }
        if self.retrieval.entity_cap == 0 {
            return Err(anyhow!("retrieval.entity_cap must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.entity_cap, 3);
        assert_eq!(config.retrieval.history_window, 6);
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = EngineConfig::default();
        config.neo4j.uri = "bolt://graph.internal:7687".to_string();
        config.llm.model = "llama3".to_string();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.neo4j.uri, "bolt://graph.internal:7687");
        assert_eq!(loaded.llm.model, "llama3");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.neo4j.database, "neo4j");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\nmodel = \"mistral\"\nprovider = \"ollama\"\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let mut config = EngineConfig::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }
}
