//! Built-in rule engines.
//!
//! Releases loaded from a file repository name one of these instead of shipping
//! compiled rules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{EngineFault, RuleEngine, WorkingMemory};
use crate::model::Value;

/// Prefixes a text field of every fact that does not carry the prefix yet.
///
/// Each rewritten fact counts as one rule firing, so a second evaluation pass
/// over unchanged memory fires nothing.
#[derive(Debug, Clone)]
pub struct EchoEngine {
    prefix: String,
    field: String,
    delay: Option<Duration>,
}

impl EchoEngine {
    pub fn new(prefix: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            field: field.into(),
            delay: None,
        }
    }

    /// Sleep before each evaluation pass.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new("echo:", "text")
    }
}

#[async_trait]
impl RuleEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    async fn fire_all_rules(
        &self,
        session: &str,
        memory: &mut WorkingMemory,
        max: Option<u32>,
    ) -> Result<u32, EngineFault> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut fired = 0u32;
        for (_, fact) in memory.facts_mut() {
            if max.is_some_and(|m| fired >= m) {
                break;
            }
            let Some(object) = fact.as_object_mut() else {
                continue;
            };
            let Some(Value::Text(text)) = object.fields.get_mut(&self.field) else {
                continue;
            };
            if text.starts_with(&self.prefix) {
                continue;
            }
            *text = format!("{}{}", self.prefix, text);
            fired += 1;
        }

        debug!(session = %session, fired, "echo rules fired");
        Ok(fired)
    }
}

/// Fires nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEngine;

#[async_trait]
impl RuleEngine for NoopEngine {
    fn name(&self) -> &str {
        "noop"
    }

    async fn fire_all_rules(
        &self,
        _session: &str,
        _memory: &mut WorkingMemory,
        _max: Option<u32>,
    ) -> Result<u32, EngineFault> {
        Ok(0)
    }
}

fn default_prefix() -> String {
    "echo:".to_string()
}

fn default_field() -> String {
    "text".to_string()
}

/// Engine selection as written in a release descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineSpec {
    Echo {
        #[serde(default = "default_prefix")]
        prefix: String,
        #[serde(default = "default_field")]
        field: String,
    },
    Noop,
}

impl Default for EngineSpec {
    fn default() -> Self {
        EngineSpec::Noop
    }
}

impl EngineSpec {
    pub fn build(&self) -> Arc<dyn RuleEngine> {
        match self {
            EngineSpec::Echo { prefix, field } => Arc::new(EchoEngine::new(prefix, field)),
            EngineSpec::Noop => Arc::new(NoopEngine),
        }
    }
}
