//! Server data model.
//!
//! Plain value types shared by the registry, the marshallers and the transports.
//! Everything here is serde-serializable; the JSON marshaller relies on these
//! derives directly while the XML marshaller maps them by hand.

mod response;
mod value;

pub use response::{ResponsePayload, ResponseType, ServiceResponse, ServiceResponsesList};
pub use value::{DomainObject, Value};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a deployable release: `group:artifact:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseId {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ReleaseId {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// Same group and artifact as `other`, any version.
    pub fn same_artifact(&self, other: &ReleaseId) -> bool {
        self.group_id == other.group_id && self.artifact_id == other.artifact_id
    }

    /// Copy of this id pointing at another version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl FromStr for ReleaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, artifact, version]
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Ok(ReleaseId::new(*group, *artifact, *version))
            }
            _ => Err(format!(
                "invalid release id '{}', expected group:artifact:version",
                s
            )),
        }
    }
}

/// Container lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    #[default]
    Creating,
    Started,
    Stopped,
    Disposing,
    Disposed,
    Failed,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Creating => "CREATING",
            ContainerStatus::Started => "STARTED",
            ContainerStatus::Stopped => "STOPPED",
            ContainerStatus::Disposing => "DISPOSING",
            ContainerStatus::Disposed => "DISPOSED",
            ContainerStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATING" => Ok(ContainerStatus::Creating),
            "STARTED" => Ok(ContainerStatus::Started),
            "STOPPED" => Ok(ContainerStatus::Stopped),
            "DISPOSING" => Ok(ContainerStatus::Disposing),
            "DISPOSED" => Ok(ContainerStatus::Disposed),
            "FAILED" => Ok(ContainerStatus::Failed),
            other => Err(format!("unknown container status '{}'", other)),
        }
    }
}

/// Scanner lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScannerStatus {
    #[default]
    Stopped,
    Started,
    Scanning,
    Disposed,
}

impl ScannerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerStatus::Stopped => "STOPPED",
            ScannerStatus::Started => "STARTED",
            ScannerStatus::Scanning => "SCANNING",
            ScannerStatus::Disposed => "DISPOSED",
        }
    }
}

impl fmt::Display for ScannerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScannerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOPPED" => Ok(ScannerStatus::Stopped),
            "STARTED" => Ok(ScannerStatus::Started),
            "SCANNING" => Ok(ScannerStatus::Scanning),
            "DISPOSED" => Ok(ScannerStatus::Disposed),
            other => Err(format!("unknown scanner status '{}'", other)),
        }
    }
}

/// Scanner state as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScannerResource {
    pub status: ScannerStatus,
    /// Poll interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

impl ScannerResource {
    pub fn new(status: ScannerStatus, poll_interval: Option<u64>) -> Self {
        Self {
            status,
            poll_interval,
        }
    }
}

/// Optional configuration supplied when creating a container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerConfig {
    /// Initial scanner state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner: Option<ScannerResource>,
}

/// Snapshot of a container as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerResource {
    pub container_id: String,
    pub release_id: ReleaseId,
    /// Release actually deployed; differs from `release_id` after a scanner upgrade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_release_id: Option<ReleaseId>,
    #[serde(default)]
    pub status: ContainerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner: Option<ScannerResource>,
}

impl ContainerResource {
    /// Resource describing a container that is yet to be created.
    pub fn new(container_id: impl Into<String>, release_id: ReleaseId) -> Self {
        Self {
            container_id: container_id.into(),
            release_id,
            resolved_release_id: None,
            status: ContainerStatus::Creating,
            scanner: None,
        }
    }
}

/// Information about the running server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerInfo {
    pub server_id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// RFC 3339 start timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_id_display_and_parse() {
        let id = ReleaseId::new("foo.bar", "baz", "2.1.0.GA");
        assert_eq!(id.to_string(), "foo.bar:baz:2.1.0.GA");
        assert_eq!("foo.bar:baz:2.1.0.GA".parse::<ReleaseId>().unwrap(), id);
    }

    #[test]
    fn test_release_id_parse_rejects_partial() {
        assert!("foo.bar:baz".parse::<ReleaseId>().is_err());
        assert!("foo.bar::1.0".parse::<ReleaseId>().is_err());
    }

    #[test]
    fn test_release_id_equality_uses_all_fields() {
        let a = ReleaseId::new("foo.bar", "baz", "2.1.0.GA");
        let b = ReleaseId::new("foo.bar", "baz", "2.1.1.GA");
        assert_ne!(a, b);
        assert!(a.same_artifact(&b));
        assert_eq!(a.with_version("2.1.1.GA"), b);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            ContainerStatus::Creating,
            ContainerStatus::Started,
            ContainerStatus::Disposed,
        ] {
            assert_eq!(status.as_str().parse::<ContainerStatus>().unwrap(), status);
        }
        assert_eq!(
            "SCANNING".parse::<ScannerStatus>().unwrap(),
            ScannerStatus::Scanning
        );
    }

    #[test]
    fn test_container_resource_json_field_names() {
        let resource = ContainerResource::new("kie1", ReleaseId::new("g", "a", "1"));
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["container-id"], "kie1");
        assert_eq!(json["release-id"]["group-id"], "g");
        assert_eq!(json["status"], "CREATING");
        assert!(json.get("scanner").is_none());
    }
}
