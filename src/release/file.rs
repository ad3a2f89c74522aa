//! File-system release repository.
//!
//! Releases live under `<root>/<group path>/<artifact>/<version>/release.yaml`,
//! where the group path is the group id with dots turned into directories. The
//! descriptor lists the release's types, sessions and built-in engine:
//!
//! ```yaml
//! sessions:
//!   - name: defaultKieSession
//!     default: true
//! engine:
//!   type: echo
//!   prefix: "echo:"
//! types:
//!   - name: org.pkg1.Message
//!     fields:
//!       - name: text
//!         kind: text
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{compare_versions, ReleaseArtifact, ReleaseResolver, ResolveError, Result};
use crate::model::ReleaseId;
use crate::session::{EngineSpec, SessionDeclaration};
use crate::types::{FieldKind, TypeDescriptor};

const DESCRIPTOR_FILE: &str = "release.yaml";

#[derive(Debug, Deserialize)]
struct FieldEntry {
    name: String,
    kind: FieldKind,
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    name: String,
    #[serde(default)]
    fields: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDescriptor {
    #[serde(default)]
    types: Vec<TypeEntry>,
    #[serde(default)]
    sessions: Vec<SessionDeclaration>,
    #[serde(default)]
    engine: EngineSpec,
}

/// Releases read from a directory tree.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_dir(&self, group_id: &str, artifact_id: &str) -> PathBuf {
        let mut dir = self.root.clone();
        for part in group_id.split('.') {
            dir.push(part);
        }
        dir.push(artifact_id);
        dir
    }

    fn descriptor_path(&self, release: &ReleaseId) -> Result<PathBuf> {
        let segments = release
            .group_id
            .split('.')
            .chain([release.artifact_id.as_str(), release.version.as_str()]);
        for segment in segments {
            let separator = |c: char| c == '/' || c == '\\';
            if segment.is_empty() || segment == ".." || segment.contains(separator) {
                return Err(ResolveError::Invalid {
                    release: release.clone(),
                    message: format!("illegal path segment '{}'", segment),
                });
            }
        }
        Ok(self
            .artifact_dir(&release.group_id, &release.artifact_id)
            .join(&release.version)
            .join(DESCRIPTOR_FILE))
    }
}

fn build_artifact(release: &ReleaseId, descriptor: ReleaseDescriptor) -> Result<ReleaseArtifact> {
    let mut builder =
        ReleaseArtifact::builder(release.clone()).with_engine(descriptor.engine.build());
    for entry in descriptor.types {
        let mut type_descriptor = TypeDescriptor::new(entry.name);
        for field in entry.fields {
            type_descriptor = type_descriptor.with_field(field.name, field.kind);
        }
        builder = builder.with_type(type_descriptor);
    }
    for session in descriptor.sessions {
        builder = builder.with_session(session.name, session.default);
    }
    builder.build()
}

#[async_trait]
impl ReleaseResolver for FileRepository {
    async fn resolve(&self, release: &ReleaseId) -> Result<Arc<ReleaseArtifact>> {
        let path = self.descriptor_path(release)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResolveError::NotFound(release.clone()));
            }
            Err(source) => {
                return Err(ResolveError::Io {
                    release: release.clone(),
                    source,
                })
            }
        };

        let descriptor: ReleaseDescriptor =
            serde_yaml::from_str(&text).map_err(|e| ResolveError::Invalid {
                release: release.clone(),
                message: e.to_string(),
            })?;

        let artifact = build_artifact(release, descriptor)?;
        debug!(
            release = %release,
            path = %path.display(),
            sessions = artifact.sessions().len(),
            "release loaded from file"
        );
        Ok(Arc::new(artifact))
    }

    async fn latest(&self, group_id: &str, artifact_id: &str) -> Result<Option<ReleaseId>> {
        let dir = self.artifact_dir(group_id, artifact_id);
        let release = ReleaseId::new(group_id, artifact_id, "*");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ResolveError::Io { release, source }),
        };

        let mut newest: Option<String> = None;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(ResolveError::Io { release, source }),
            };
            if !entry.path().join(DESCRIPTOR_FILE).is_file() {
                continue;
            }
            let Some(version) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 version directory");
                continue;
            };
            let newer = newest
                .as_deref()
                .map_or(true, |current| compare_versions(&version, current).is_gt());
            if newer {
                newest = Some(version);
            }
        }

        Ok(newest.map(|version| ReleaseId::new(group_id, artifact_id, version)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeResolver;

    const DESCRIPTOR: &str = r#"
sessions:
  - name: defaultKieSession
    default: true
  - name: audit
engine:
  type: echo
types:
  - name: org.pkg1.Message
    fields:
      - name: text
        kind: text
"#;

    fn write_release(root: &Path, version: &str, body: &str) {
        let dir = root.join("foo").join("bar").join("baz").join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DESCRIPTOR_FILE), body).unwrap();
    }

    #[tokio::test]
    async fn test_resolve_reads_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        write_release(tmp.path(), "2.1.0.GA", DESCRIPTOR);
        let repo = FileRepository::new(tmp.path());

        let artifact = repo
            .resolve(&ReleaseId::new("foo.bar", "baz", "2.1.0.GA"))
            .await
            .unwrap();

        assert_eq!(artifact.default_session(), Some("defaultKieSession"));
        assert_eq!(artifact.sessions().len(), 2);
        assert_eq!(artifact.engine().name(), "echo");
        assert!(artifact.types().resolve("org.pkg1.Message").is_some());
    }

    #[tokio::test]
    async fn test_resolve_missing_release() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(tmp.path());
        let err = repo
            .resolve(&ReleaseId::new("foo.bar", "baz", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_invalid_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        write_release(tmp.path(), "1", "sessions: 12");
        let repo = FileRepository::new(tmp.path());
        let err = repo
            .resolve(&ReleaseId::new("foo.bar", "baz", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_resolve_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(tmp.path());
        let err = repo
            .resolve(&ReleaseId::new("foo", "baz", ".."))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_latest_picks_newest_version_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_release(tmp.path(), "2.1.0.GA", DESCRIPTOR);
        write_release(tmp.path(), "2.1.1.GA", DESCRIPTOR);
        std::fs::create_dir_all(tmp.path().join("foo/bar/baz/9.9.9")).unwrap();
        let repo = FileRepository::new(tmp.path());

        let latest = repo.latest("foo.bar", "baz").await.unwrap();
        assert_eq!(latest, Some(ReleaseId::new("foo.bar", "baz", "2.1.1.GA")));
        assert_eq!(repo.latest("foo.bar", "nothing").await.unwrap(), None);
    }
}
