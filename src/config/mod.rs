//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod repository;
mod server;

pub use messaging::{AmqpConfig, MessagingConfig, MessagingType};
pub use repository::{RepositoryConfig, RepositoryType};
pub use server::{engine_options, ExecutionConfig, ServerConfig, DEFAULT_PORT};

use serde::Deserialize;

use crate::command::CreateContainerCommand;
use crate::model::{ContainerConfig, ReleaseId, ScannerResource, ScannerStatus};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "RULEHOST_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "RULEHOST";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "RULEHOST_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub execution: ExecutionConfig,
    pub repository: RepositoryConfig,
    /// Queue transport (optional; REST only when unset).
    pub messaging: Option<MessagingConfig>,
    /// Containers created at startup.
    pub containers: Vec<StartupContainer>,
}

/// A container created when the server starts.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupContainer {
    pub id: String,
    /// `group:artifact:version`.
    pub release_id: String,
    /// Starts the scanner with this poll interval when set.
    #[serde(default)]
    pub scanner_poll_interval_ms: Option<u64>,
}

impl StartupContainer {
    pub fn release_id(&self) -> Result<ReleaseId, ConfigError> {
        self.release_id.parse().map_err(|e| {
            ConfigError::Invalid(format!("container '{}': {}", self.id, e))
        })
    }

    /// The create command for this container.
    pub fn to_command(&self) -> Result<CreateContainerCommand, ConfigError> {
        Ok(CreateContainerCommand {
            container_id: self.id.clone(),
            release_id: self.release_id()?,
            config: self.scanner_poll_interval_ms.map(|interval| ContainerConfig {
                scanner: Some(ScannerResource::new(ScannerStatus::Started, Some(interval))),
            }),
        })
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `RULEHOST__SERVER__PORT`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            if path != Some(config_path.as_str()) {
                builder =
                    builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
            }
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.execution_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "execution.execution_timeout_ms must be positive".into(),
            ));
        }
        if self.execution.resolve_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "execution.resolve_timeout_ms must be positive".into(),
            ));
        }
        for container in &self.containers {
            container.release_id()?;
            if container.scanner_poll_interval_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "container '{}': scanner poll interval must be positive",
                    container.id
                )));
            }
        }
        Ok(())
    }
}
