//! Configuration management for Offerdex
//!
//! TOML configuration with environment-variable overrides and validation.

use crate::error::{OfferdexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub ingest: IngestConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Attempt budget for one request; 1 means no retry
    pub max_attempts: usize,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OfferdexError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| OfferdexError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OfferdexError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| OfferdexError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load from an explicit path, or from the default location falling
    /// back to defaults when no file exists yet.
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load(&p),
            None => {
                let default = Self::default_path()?;
                if default.exists() {
                    Self::load(&default)
                } else {
                    let mut config = Self::default();
                    config.apply_env_overrides();
                    Ok(config)
                }
            }
        }
    }

    /// Apply environment variable overrides
    /// Environment variables in format: OFFERDEX_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("OFFERDEX_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__ENDPOINT" => {
                self.embedding.endpoint = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__API_KEY_ENV" => {
                self.embedding.api_key_env = value.to_string();
            }
            "EMBEDDING__TIMEOUT_SECS" => {
                self.embedding.timeout_secs =
                    value.parse().map_err(|_| OfferdexError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "INGEST__BATCH_SIZE" => {
                self.ingest.batch_size =
                    value.parse().map_err(|_| OfferdexError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Path of the live catalog database
    pub fn catalog_path(&self) -> PathBuf {
        self.storage.data_dir.join("catalog.db")
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| OfferdexError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("offerdex").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| OfferdexError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".offerdex"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir =
            Self::default_data_dir().unwrap_or_else(|_| PathBuf::from(".offerdex"));

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig { data_dir },
            embedding: EmbeddingConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                api_key_env: "OPENAI_API_KEY".to_string(),
                timeout_secs: 30,
                max_attempts: 1,
            },
            ingest: IngestConfig {
                batch_size: crate::ingest::DEFAULT_BATCH_SIZE,
            },
        }
    }
}
