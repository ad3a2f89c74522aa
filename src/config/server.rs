//! Server and execution configuration types.

use std::time::Duration;

use serde::Deserialize;

use crate::engine::{EngineOptions, DEFAULT_SERVER_NAME};

/// Default REST port.
pub const DEFAULT_PORT: u16 = 8230;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// REST port; 0 lets the OS choose.
    pub port: u16,
    /// Stable server id; a random one is generated when unset.
    pub server_id: Option<String>,
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            server_id: None,
            name: DEFAULT_SERVER_NAME.to_string(),
        }
    }
}

/// Timeouts and defaults applied while executing commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on resolving a release during create or upgrade.
    pub resolve_timeout_ms: u64,
    /// Upper bound on running one BatchExecution.
    pub execution_timeout_ms: u64,
    /// Format assumed when a request names none.
    pub default_format: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: 30_000,
            execution_timeout_ms: 30_000,
            default_format: "xml".to_string(),
        }
    }
}

impl ExecutionConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

/// Engine options from the server and execution sections.
pub fn engine_options(server: &ServerConfig, execution: &ExecutionConfig) -> EngineOptions {
    let mut options = EngineOptions {
        server_name: server.name.clone(),
        execution_timeout: execution.execution_timeout(),
        default_format: execution.default_format.clone(),
        ..EngineOptions::default()
    };
    if let Some(id) = &server.server_id {
        options.server_id = id.clone();
    }
    options
}
