//! BatchExecution sub-protocol.
//!
//! A batch is a small script of its own: ordered sub-commands run against one
//! named session, and identifiers bound along the way are collected into
//! [`ExecutionResults`] once every sub-command has run.

use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, ServerError};
use crate::model::Value;

/// One sub-command of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchCommand {
    /// Insert a fact into working memory.
    Insert {
        object: Value,
        out_identifier: Option<String>,
        /// When false only the fact handle is reported for `out_identifier`.
        return_object: bool,
    },
    /// Run the session's rule evaluation pass.
    FireAllRules {
        max: Option<u32>,
        /// Binds the number of rules fired.
        out_identifier: Option<String>,
    },
    /// Bind every fact currently in working memory.
    GetObjects { out_identifier: String },
    SetGlobal {
        identifier: String,
        object: Value,
        out_identifier: Option<String>,
    },
    /// Bind a global; the identifier defaults to the global's name.
    GetGlobal {
        identifier: String,
        out_identifier: Option<String>,
    },
}

impl BatchCommand {
    pub fn insert(object: impl Into<Value>, out_identifier: Option<&str>) -> Self {
        BatchCommand::Insert {
            object: object.into(),
            out_identifier: out_identifier.map(str::to_string),
            return_object: true,
        }
    }

    pub fn fire_all_rules() -> Self {
        BatchCommand::FireAllRules {
            max: None,
            out_identifier: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BatchCommand::Insert { .. } => "insert",
            BatchCommand::FireAllRules { .. } => "fire-all-rules",
            BatchCommand::GetObjects { .. } => "get-objects",
            BatchCommand::SetGlobal { .. } => "set-global",
            BatchCommand::GetGlobal { .. } => "get-global",
        }
    }

    /// Identifier this sub-command binds in the execution results.
    pub fn out_identifier(&self) -> Option<&str> {
        match self {
            BatchCommand::Insert { out_identifier, .. }
            | BatchCommand::FireAllRules { out_identifier, .. }
            | BatchCommand::SetGlobal { out_identifier, .. } => out_identifier.as_deref(),
            BatchCommand::GetObjects { out_identifier } => Some(out_identifier),
            BatchCommand::GetGlobal {
                identifier,
                out_identifier,
            } => Some(out_identifier.as_deref().unwrap_or(identifier)),
        }
    }
}

/// Ordered sub-commands addressed to one session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchExecution {
    /// Session name; `None` targets the container's default session.
    pub lookup: Option<String>,
    pub commands: Vec<BatchCommand>,
}

impl BatchExecution {
    pub fn new(lookup: Option<&str>, commands: Vec<BatchCommand>) -> Self {
        Self {
            lookup: lookup.map(str::to_string),
            commands,
        }
    }

    /// Check that out-identifiers are unique within the batch.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for command in &self.commands {
            if let Some(id) = command.out_identifier() {
                if id.is_empty() {
                    return Err(ServerError::malformed(format!(
                        "empty out-identifier on {}",
                        command.name()
                    )));
                }
                if !seen.insert(id) {
                    return Err(ServerError::malformed(format!(
                        "duplicate out-identifier '{}'",
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Handle of a fact in a session's working memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactHandle {
    pub id: u64,
    pub type_name: String,
}

impl FactHandle {
    pub fn new(id: u64, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
        }
    }

    /// Stable textual form, `0:<id>:<type>`.
    pub fn external_form(&self) -> String {
        format!("0:{}:{}", self.id, self.type_name)
    }

    pub fn from_external_form(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("0"), Some(id), Some(type_name)) if !type_name.is_empty() => {
                id.parse().ok().map(|id| FactHandle::new(id, type_name))
            }
            _ => None,
        }
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external_form())
    }
}

/// Values bound by a batch, keyed by out-identifier.
///
/// Entries keep binding order for display; lookups are by identifier.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionResults {
    results: Vec<(String, Value)>,
    fact_handles: Vec<(String, FactHandle)>,
}

impl ExecutionResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value, replacing any previous binding of the identifier.
    pub fn set_value(&mut self, identifier: impl Into<String>, value: Value) {
        let identifier = identifier.into();
        match self.results.iter_mut().find(|(id, _)| *id == identifier) {
            Some(entry) => entry.1 = value,
            None => self.results.push((identifier, value)),
        }
    }

    pub fn set_fact_handle(&mut self, identifier: impl Into<String>, handle: FactHandle) {
        let identifier = identifier.into();
        match self.fact_handles.iter_mut().find(|(id, _)| *id == identifier) {
            Some(entry) => entry.1 = handle,
            None => self.fact_handles.push((identifier, handle)),
        }
    }

    pub fn value(&self, identifier: &str) -> Option<&Value> {
        self.results
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, v)| v)
    }

    pub fn fact_handle(&self, identifier: &str) -> Option<&FactHandle> {
        self.fact_handles
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, h)| h)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|(id, _)| id.as_str())
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.results
    }

    pub fn fact_handles(&self) -> &[(String, FactHandle)] {
        &self.fact_handles
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.fact_handles.is_empty()
    }
}
