//! Server commands and command scripts.
//!
//! `ServerCommand` is a closed sum type; each variant carries everything its
//! handler needs so commands can be marshalled independently of each other.

mod batch;

pub use batch::{BatchCommand, BatchExecution, ExecutionResults, FactHandle};

use serde::{Deserialize, Serialize};

use crate::model::{ContainerConfig, ReleaseId, ScannerResource};

/// Create a container for a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateContainerCommand {
    pub container_id: String,
    pub release_id: ReleaseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,
}

/// Dispose a container and its sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DisposeContainerCommand {
    pub container_id: String,
}

/// Execute a marshalled batch against a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CallContainerCommand {
    pub container_id: String,
    /// Marshalled [`BatchExecution`].
    pub payload: String,
    /// Format of `payload`; defaults to the format of the enclosing request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Read a container snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GetContainerInfoCommand {
    pub container_id: String,
}

/// Read a container's scanner state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GetScannerInfoCommand {
    pub container_id: String,
}

/// Move a container's scanner to a new state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateScannerCommand {
    pub container_id: String,
    pub scanner: ScannerResource,
}

/// Redeploy a container with another release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateReleaseIdCommand {
    pub container_id: String,
    pub release_id: ReleaseId,
}

/// A single server command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerCommand {
    CreateContainer(CreateContainerCommand),
    DisposeContainer(DisposeContainerCommand),
    CallContainer(CallContainerCommand),
    GetServerInfo,
    ListContainers,
    GetContainerInfo(GetContainerInfoCommand),
    GetScannerInfo(GetScannerInfoCommand),
    UpdateScanner(UpdateScannerCommand),
    UpdateReleaseId(UpdateReleaseIdCommand),
}

impl ServerCommand {
    /// Wire name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            ServerCommand::CreateContainer(_) => "create-container",
            ServerCommand::DisposeContainer(_) => "dispose-container",
            ServerCommand::CallContainer(_) => "call-container",
            ServerCommand::GetServerInfo => "get-server-info",
            ServerCommand::ListContainers => "list-containers",
            ServerCommand::GetContainerInfo(_) => "get-container-info",
            ServerCommand::GetScannerInfo(_) => "get-scanner-info",
            ServerCommand::UpdateScanner(_) => "update-scanner",
            ServerCommand::UpdateReleaseId(_) => "update-release-id",
        }
    }

    /// Container addressed by this command, if any.
    pub fn container_id(&self) -> Option<&str> {
        match self {
            ServerCommand::CreateContainer(c) => Some(&c.container_id),
            ServerCommand::DisposeContainer(c) => Some(&c.container_id),
            ServerCommand::CallContainer(c) => Some(&c.container_id),
            ServerCommand::GetContainerInfo(c) => Some(&c.container_id),
            ServerCommand::GetScannerInfo(c) => Some(&c.container_id),
            ServerCommand::UpdateScanner(c) => Some(&c.container_id),
            ServerCommand::UpdateReleaseId(c) => Some(&c.container_id),
            ServerCommand::GetServerInfo | ServerCommand::ListContainers => None,
        }
    }

    pub fn create_container(container_id: impl Into<String>, release_id: ReleaseId) -> Self {
        ServerCommand::CreateContainer(CreateContainerCommand {
            container_id: container_id.into(),
            release_id,
            config: None,
        })
    }

    pub fn dispose_container(container_id: impl Into<String>) -> Self {
        ServerCommand::DisposeContainer(DisposeContainerCommand {
            container_id: container_id.into(),
        })
    }

    pub fn call_container(container_id: impl Into<String>, payload: impl Into<String>) -> Self {
        ServerCommand::CallContainer(CallContainerCommand {
            container_id: container_id.into(),
            payload: payload.into(),
            format: None,
        })
    }
}

/// Point at which a script stopped decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTruncation {
    /// Index of the first command descriptor that could not be decoded.
    pub index: usize,
    pub reason: String,
}

/// Ordered commands submitted as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandScript {
    pub commands: Vec<ServerCommand>,
    /// Set by decoders when a command descriptor was unreadable; commands from
    /// that index on are not part of the script.
    #[serde(skip)]
    pub truncation: Option<ScriptTruncation>,
}

impl CommandScript {
    pub fn new(commands: Vec<ServerCommand>) -> Self {
        Self {
            commands,
            truncation: None,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Give every container call without an explicit format the request's format.
    pub fn apply_default_format(&mut self, format: &str) {
        for command in &mut self.commands {
            if let ServerCommand::CallContainer(call) = command {
                if call.format.is_none() {
                    call.format = Some(format.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_tagging() {
        let script = CommandScript::new(vec![
            ServerCommand::create_container("c1", ReleaseId::new("g", "a", "1")),
            ServerCommand::GetServerInfo,
        ]);
        let json = serde_json::to_value(&script).unwrap();
        assert_eq!(json["commands"][0]["create-container"]["container-id"], "c1");
        assert_eq!(json["commands"][1], "get-server-info");
        assert!(json.get("truncation").is_none());
    }

    #[test]
    fn test_apply_default_format_keeps_explicit() {
        let mut script = CommandScript::new(vec![
            ServerCommand::call_container("c1", "<batch-execution/>"),
            ServerCommand::CallContainer(CallContainerCommand {
                container_id: "c2".into(),
                payload: "{}".into(),
                format: Some("json".into()),
            }),
        ]);
        script.apply_default_format("xml");

        let formats: Vec<_> = script
            .commands
            .iter()
            .map(|c| match c {
                ServerCommand::CallContainer(call) => call.format.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(formats, vec![Some("xml".into()), Some("json".into())]);
    }

    #[test]
    fn test_container_id() {
        assert_eq!(
            ServerCommand::dispose_container("c9").container_id(),
            Some("c9")
        );
        assert_eq!(ServerCommand::ListContainers.container_id(), None);
    }
}
