mod policy;
mod repository;

pub use policy::{MemoryConfigPatch, MemoryConfiguration, MemoryPolicy};
pub use repository::ConfigRepository;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CrewMemError, Result};

/// Engine configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the memory database lives
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding dimension and provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Background maintenance settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Policy applied to tenants when their configuration is first created
    #[serde(default)]
    pub defaults: MemoryPolicy,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists, falling back to built-in defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(path);
        }

        for path in Self::default_paths() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            CrewMemError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CrewMemError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".crewmem").join("config.toml")),
            dirs::config_dir().map(|c| c.join("crewmem").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(CrewMemError::Config(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(CrewMemError::Config(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        self.defaults
            .validate()
            .map_err(|e| CrewMemError::Config(format!("invalid [defaults]: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for the LanceDB database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".crewmem"))
        .unwrap_or_else(|| PathBuf::from(".crewmem"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Width of every stored vector; providers must produce exactly this many values
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Settings for OpenAI-compatible embedding endpoints
    #[serde(default)]
    pub openai: OpenAiConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_embedding_dimension(),
            openai: OpenAiConfig::default(),
        }
    }
}

fn default_embedding_dimension() -> usize {
    384
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_openai_timeout_secs(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run maintenance passes in the daemon
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Seconds between maintenance passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds to wait after a pass fails outright
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            interval_secs: default_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_error_backoff_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.scheduler.interval_secs, 3600);
        assert_eq!(config.scheduler.error_backoff_secs, 300);
        assert!(config.storage.data_dir.ends_with(".crewmem"));
        assert_eq!(config.defaults.short_term_max_entries, 100);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [storage]
            data_dir = "/tmp/crewmem-test"

            [defaults]
            short_term_max_entries = 25
            embedding_provider = "hash"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/crewmem-test"));
        assert_eq!(config.defaults.short_term_max_entries, 25);
        assert_eq!(config.defaults.long_term_max_entries, 1000);
        assert_eq!(config.defaults.embedding_provider, "hash");
        assert_eq!(config.embedding.openai.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn invalid_defaults_are_rejected() {
        let err = Config::from_toml(
            r#"
            [defaults]
            entity_confidence_threshold = 1.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CrewMemError::Config(_)));
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler]\ninterval_secs = 60\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scheduler.interval_secs, 60);
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/crewmem.toml"))).unwrap_err();
        assert!(matches!(err, CrewMemError::Config(_)));
    }
}
