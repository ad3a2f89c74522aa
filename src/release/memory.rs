//! In-memory release repository.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{compare_versions, ReleaseArtifact, ReleaseResolver, ResolveError, Result};
use crate::model::ReleaseId;

/// Releases held in memory, deployed programmatically.
#[derive(Default)]
pub struct InMemoryRepository {
    releases: RwLock<HashMap<ReleaseId, Arc<ReleaseArtifact>>>,
    resolve_delay: RwLock<Option<Duration>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a release resolvable, replacing any artifact with the same id.
    pub async fn deploy(&self, artifact: ReleaseArtifact) -> Arc<ReleaseArtifact> {
        let artifact = Arc::new(artifact);
        debug!(release = %artifact.release_id(), "release deployed");
        self.releases
            .write()
            .await
            .insert(artifact.release_id().clone(), artifact.clone());
        artifact
    }

    pub async fn remove(&self, release: &ReleaseId) -> bool {
        self.releases.write().await.remove(release).is_some()
    }

    pub async fn len(&self) -> usize {
        self.releases.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.releases.read().await.is_empty()
    }

    /// Delay every resolution, simulating a slow repository.
    pub async fn set_resolve_delay(&self, delay: Option<Duration>) {
        *self.resolve_delay.write().await = delay;
    }
}

#[async_trait]
impl ReleaseResolver for InMemoryRepository {
    async fn resolve(&self, release: &ReleaseId) -> Result<Arc<ReleaseArtifact>> {
        let delay = *self.resolve_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.releases
            .read()
            .await
            .get(release)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(release.clone()))
    }

    async fn latest(&self, group_id: &str, artifact_id: &str) -> Result<Option<ReleaseId>> {
        let releases = self.releases.read().await;
        Ok(releases
            .keys()
            .filter(|id| id.group_id == group_id && id.artifact_id == artifact_id)
            .max_by(|a, b| compare_versions(&a.version, &b.version))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(version: &str) -> ReleaseArtifact {
        ReleaseArtifact::builder(ReleaseId::new("foo.bar", "baz", version))
            .with_session("defaultKieSession", true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_deployed_release() {
        let repo = InMemoryRepository::new();
        repo.deploy(artifact("2.1.0.GA")).await;

        let resolved = repo
            .resolve(&ReleaseId::new("foo.bar", "baz", "2.1.0.GA"))
            .await
            .unwrap();
        assert_eq!(resolved.release_id().version, "2.1.0.GA");
    }

    #[tokio::test]
    async fn test_resolve_unknown_release() {
        let repo = InMemoryRepository::new();
        let err = repo
            .resolve(&ReleaseId::new("foo.bar", "baz", "9"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_uses_version_order() {
        let repo = InMemoryRepository::new();
        repo.deploy(artifact("2.1.0.GA")).await;
        repo.deploy(artifact("2.1.1.GA")).await;
        repo.deploy(artifact("2.1.10.GA")).await;
        repo.deploy(artifact("2.1.10-SNAPSHOT")).await;

        let latest = repo.latest("foo.bar", "baz").await.unwrap().unwrap();
        assert_eq!(latest.version, "2.1.10.GA");
        assert!(repo.latest("foo.bar", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let repo = InMemoryRepository::new();
        repo.deploy(artifact("1")).await;
        assert!(repo.remove(&ReleaseId::new("foo.bar", "baz", "1")).await);
        assert!(repo.is_empty().await);
    }
}
