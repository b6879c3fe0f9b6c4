//! Configuration settings for the budget report engine.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub schema: SchemaConfig,
    pub model: ModelConfig,
    pub datastore: DatastoreConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("budget-query.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("budget-query/config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".budget-query/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.model.enabled {
            if self.model.base_url.is_empty() {
                return Err(ConfigError::MissingField("model.base_url".to_string()).into());
            }
            if self.model.model.is_empty() {
                return Err(ConfigError::MissingField("model.model".to_string()).into());
            }
        }

        if self.model.timeout_secs == 0 {
            return Err(ConfigError::Invalid("model.timeout_secs must be > 0".to_string()).into());
        }

        if self.datastore.timeout_secs == 0 {
            return Err(
                ConfigError::Invalid("datastore.timeout_secs must be > 0".to_string()).into(),
            );
        }

        if !(0.0..=1.0).contains(&self.engine.confirm_threshold) {
            return Err(ConfigError::Invalid(
                "engine.confirm_threshold must be within [0, 1]".to_string(),
            )
            .into());
        }

        if self.engine.row_cap == 0 {
            return Err(ConfigError::Invalid("engine.row_cap must be > 0".to_string()).into());
        }

        Ok(())
    }

    /// Expanded schema path, if one is configured.
    pub fn schema_path(&self) -> Option<PathBuf> {
        self.schema
            .path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

/// REST server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP port
    pub http_port: u16,
    /// API prefix
    pub prefix: String,
    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            prefix: "/api/v1".to_string(),
            enable_cors: true,
        }
    }
}

/// Schema registry source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// JSON schema file. The built-in municipal registry is used when unset.
    pub path: Option<String>,
}

/// Model-assisted parsing configuration (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Enable the model-assisted parse step
    pub enabled: bool,
    /// Base URL for the chat completions API
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (loaded from OPENAI_API_KEY if not set)
    pub api_key: Option<String>,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 8,
        }
    }
}

/// Datastore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Postgres connection URL (falls back to DATABASE_URL)
    pub url: Option<String>,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Retries after a transient failure
    pub max_retries: u32,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 15,
            max_retries: 1,
            max_connections: 5,
        }
    }
}

impl DatastoreConfig {
    /// Connection URL from config or the environment.
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

/// Report engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Intents below this confidence are returned for confirmation
    pub confirm_threshold: f64,
    /// Row cap for list reports
    pub row_cap: usize,
    /// Longest accepted question, in characters
    pub max_query_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirm_threshold: 0.6,
            row_cap: 100,
            max_query_chars: 500,
        }
    }
}
