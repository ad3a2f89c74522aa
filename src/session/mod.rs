//! Sessions and working memory.
//!
//! A session is a named, stateful execution context inside a container. Its
//! working memory holds inserted facts and globals; rule evaluation is delegated
//! to an opaque [`RuleEngine`] supplied by the deployed release. Working memory
//! sits behind a mutex so only one execution runs against a session at a time.

pub mod engines;
mod router;

pub use engines::{EchoEngine, EngineSpec, NoopEngine};
pub use router::{ContainerLease, SessionLease, SessionRouter};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::command::FactHandle;
use crate::model::Value;

/// Fault raised by a rule engine during evaluation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EngineFault(pub String);

/// Opaque rule evaluation over a session's working memory.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Evaluate rules against `memory`, firing at most `max` rules when set.
    ///
    /// Returns the number of rules fired.
    async fn fire_all_rules(
        &self,
        session: &str,
        memory: &mut WorkingMemory,
        max: Option<u32>,
    ) -> Result<u32, EngineFault>;
}

/// Facts and globals of one session.
#[derive(Debug, Default)]
pub struct WorkingMemory {
    facts: BTreeMap<u64, Value>,
    next_id: u64,
    globals: HashMap<String, Value>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fact and return its handle.
    pub fn insert(&mut self, value: Value) -> FactHandle {
        self.next_id += 1;
        let handle = FactHandle::new(self.next_id, value.type_label());
        self.facts.insert(self.next_id, value);
        handle
    }

    /// Current value of a fact, reflecting any engine mutation.
    pub fn get(&self, handle: &FactHandle) -> Option<&Value> {
        self.facts.get(&handle.id)
    }

    pub fn retract(&mut self, handle: &FactHandle) -> Option<Value> {
        self.facts.remove(&handle.id)
    }

    /// All facts in insertion order.
    pub fn objects(&self) -> Vec<Value> {
        self.facts.values().cloned().collect()
    }

    /// Mutable access to facts for rule engines.
    pub fn facts_mut(&mut self) -> impl Iterator<Item = (u64, &mut Value)> {
        self.facts.iter_mut().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn set_global(&mut self, identifier: impl Into<String>, value: Value) {
        self.globals.insert(identifier.into(), value);
    }

    pub fn global(&self, identifier: &str) -> Option<&Value> {
        self.globals.get(identifier)
    }
}

/// A session declared by a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionDeclaration {
    pub name: String,
    #[serde(default)]
    pub default: bool,
}

impl SessionDeclaration {
    pub fn new(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// A live session.
pub struct Session {
    name: String,
    memory: Mutex<WorkingMemory>,
    engine: Arc<dyn RuleEngine>,
}

impl Session {
    pub fn new(name: impl Into<String>, engine: Arc<dyn RuleEngine>) -> Self {
        Self {
            name: name.into(),
            memory: Mutex::new(WorkingMemory::new()),
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &Arc<dyn RuleEngine> {
        &self.engine
    }

    /// Exclusive access to working memory; serializes executions on this session.
    pub async fn lock(&self) -> MutexGuard<'_, WorkingMemory> {
        self.memory.lock().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("engine", &self.engine.name())
            .finish()
    }
}
