//! Application configuration.
//!
//! Aggregates configuration for the orchestrator into a single Config struct
//! that can be loaded from YAML files or environment variables.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "GROCERD_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "GROCERD";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "GROCERD_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Worker population configuration.
    pub workers: WorkerConfig,
    /// Pricing collaborator configuration.
    pub pricing: PricingConfig,
}

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/grocerd.db".to_string(),
        }
    }
}

/// Worker population configuration.
///
/// The expected set is fixed per deployment; quorum requires one report per
/// name, so the list must match the workers actually subscribed to the bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Names of the expected workers.
    pub names: Vec<String>,
    /// How long to wait for the full quorum, in seconds.
    pub wait_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            names: ["bread", "dairy", "meat", "produce", "party"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            wait_secs: 10,
        }
    }
}

/// Pricing collaborator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Address of the external pricing gRPC service.
    pub address: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            address: "localhost:50053".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `GROCERD_CONFIG` environment variable (if set)
    /// 4. Environment variables with `GROCERD` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
