//! Configuration loading and resolution
//!
//! Configuration is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SCRIBE_CONFIG`)
//! 3. Platform config directory (`scribe/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! The model-gateway API key is never read from the config file; it comes
//! from the environment (`OPENAI_API_KEY`).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming an alternate config file path
pub const CONFIG_ENV_VAR: &str = "SCRIBE_CONFIG";

/// Environment variable carrying the model-gateway API key
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// SQLite database file for the minutes and chat-history documents
    pub database_path: PathBuf,
    pub gateway: GatewayConfig,
    pub vector: VectorConfig,
    pub retrieval: RetrievalConfig,
}

/// Model gateway (OpenAI-compatible) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    /// Per-request timeout, seconds
    pub timeout_secs: u64,
    /// Timeout on individual streamed chunk arrival, seconds
    pub chunk_timeout_secs: u64,
    /// Retry budget for transient failures
    pub max_retries: u32,
    /// Pause between retries, milliseconds
    pub retry_pause_ms: u64,
    /// API key, populated from the environment after deserialization
    #[serde(skip)]
    pub api_key: String,
}

/// Vector store (Chroma HTTP API) settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VectorConfig {
    /// Base URL of the vector store. When absent the service runs without
    /// a vector index: edits skip embedding upkeep and document queries fail.
    pub url: Option<String>,
}

/// Retrieval-augmented query settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of nearest neighbours per similarity search
    pub k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5730,
            database_path: default_database_path(),
            gateway: GatewayConfig::default(),
            vector: VectorConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.2,
            timeout_secs: 5,
            chunk_timeout_secs: 5,
            max_retries: 3,
            retry_pause_ms: 1000,
            api_key: String::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: 3 }
    }
}

impl Config {
    /// Resolve and load configuration following the priority order above.
    pub fn load(cli_path: Option<&Path>) -> Result<Config> {
        let mut config = match resolve_config_file(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => {
                info!("No config file found, using compiled defaults");
                Config::default()
            }
        };

        config.gateway.api_key = std::env::var(API_KEY_ENV_VAR).unwrap_or_default();
        Ok(config)
    }

    /// Validate settings that cannot be defaulted sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.api_key.is_empty() {
            return Err(Error::Config(format!(
                "{} is not set; the model gateway cannot authenticate",
                API_KEY_ENV_VAR
            )));
        }
        if self.retrieval.k == 0 {
            return Err(Error::Config("retrieval.k must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Locate the config file, or None when no candidate exists.
fn resolve_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: platform config directory
    let candidate = dirs::config_dir().map(|d| d.join("scribe").join("config.toml"));
    match candidate {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scribe").join("scribe.db"))
        .unwrap_or_else(|| PathBuf::from("./scribe.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.gateway.max_retries, 3);
        assert_eq!(config.retrieval.k, 3);
        assert!(config.vector.url.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 9000

            [gateway]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.gateway.model, "gpt-4o-mini");
        assert_eq!(config.gateway.timeout_secs, 5);
        assert_eq!(config.retrieval.k, 3);
    }

    #[test]
    fn cli_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 7001\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.port, 7001);
    }

    #[test]
    fn validate_rejects_zero_k() {
        let mut config = Config::default();
        config.gateway.api_key = "sk-test".to_string();
        config.retrieval.k = 0;
        assert!(config.validate().is_err());
    }
}
