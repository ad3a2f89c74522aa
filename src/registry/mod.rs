//! Container registry.
//!
//! Owns the lifecycle of named containers. Each container keeps two locks:
//! a small state lock (status, release ids, scanner) and a runtime lock
//! guarding the deployed release and its sessions. Executions hold the runtime
//! lock for reading for their whole duration; disposal and redeployment take
//! it for writing, so in-flight executions finish against the runtime they
//! started with and no new ones are admitted once teardown begins.
//!
//! The state lock is never held while waiting for the runtime lock.

mod scanner;

pub(crate) use scanner::Scanner;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Result, ServerError};
use crate::model::{
    ContainerConfig, ContainerResource, ContainerStatus, ReleaseId, ScannerResource,
    ScannerStatus,
};
use crate::release::{ReleaseArtifact, ReleaseResolver};
use crate::session::Session;
use crate::types::{TypeNamespace, TypeResolver};

/// Deployed release and the sessions built from it.
pub struct ContainerRuntime {
    artifact: Arc<ReleaseArtifact>,
    sessions: HashMap<String, Arc<Session>>,
}

impl ContainerRuntime {
    fn new(artifact: Arc<ReleaseArtifact>) -> Self {
        let sessions = artifact
            .sessions()
            .iter()
            .map(|declared| {
                let session = Session::new(declared.name.clone(), artifact.engine().clone());
                (declared.name.clone(), Arc::new(session))
            })
            .collect();
        Self { artifact, sessions }
    }

    pub fn artifact(&self) -> &Arc<ReleaseArtifact> {
        &self.artifact
    }

    pub fn types(&self) -> &Arc<TypeNamespace> {
        self.artifact.types()
    }

    pub fn session(&self, name: &str) -> Option<&Arc<Session>> {
        self.sessions.get(name)
    }

    pub fn default_session(&self) -> Option<&Arc<Session>> {
        self.artifact
            .default_session()
            .and_then(|name| self.sessions.get(name))
    }

    pub fn session_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sessions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub(crate) struct ContainerState {
    pub(crate) status: ContainerStatus,
    pub(crate) release_id: ReleaseId,
    pub(crate) resolved_release_id: Option<ReleaseId>,
    pub(crate) scanner: Option<Scanner>,
}

/// A named runtime unit backed by one deployed release.
pub struct Container {
    id: String,
    state: RwLock<ContainerState>,
    runtime: Arc<RwLock<Option<ContainerRuntime>>>,
}

impl Container {
    fn new(id: &str, release_id: ReleaseId) -> Self {
        Self {
            id: id.to_string(),
            state: RwLock::new(ContainerState {
                status: ContainerStatus::Creating,
                release_id,
                resolved_release_id: None,
                scanner: None,
            }),
            runtime: Arc::new(RwLock::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn status(&self) -> ContainerStatus {
        self.state.read().await.status
    }

    pub(crate) fn state(&self) -> &RwLock<ContainerState> {
        &self.state
    }

    pub(crate) fn runtime(&self) -> &Arc<RwLock<Option<ContainerRuntime>>> {
        &self.runtime
    }

    /// Point-in-time view for clients.
    pub async fn snapshot(&self) -> ContainerResource {
        let state = self.state.read().await;
        ContainerResource {
            container_id: self.id.clone(),
            release_id: state.release_id.clone(),
            resolved_release_id: state.resolved_release_id.clone(),
            status: state.status,
            scanner: state.scanner.as_ref().map(Scanner::resource),
        }
    }

    async fn not_started(&self) -> ServerError {
        ServerError::ContainerNotStarted {
            id: self.id.clone(),
            status: self.status().await,
        }
    }
}

/// Concurrency-safe map of containers.
pub struct ContainerRegistry {
    containers: RwLock<HashMap<String, Arc<Container>>>,
    resolver: Arc<dyn ReleaseResolver>,
    resolve_timeout: Duration,
    self_ref: Weak<ContainerRegistry>,
}

impl ContainerRegistry {
    pub fn new(resolver: Arc<dyn ReleaseResolver>, resolve_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            containers: RwLock::new(HashMap::new()),
            resolver,
            resolve_timeout,
            self_ref: self_ref.clone(),
        })
    }

    pub fn resolver(&self) -> &Arc<dyn ReleaseResolver> {
        &self.resolver
    }

    pub(crate) fn weak(&self) -> Weak<ContainerRegistry> {
        self.self_ref.clone()
    }

    /// Resolve a release, bounded by the resolve timeout.
    async fn resolve(&self, release_id: &ReleaseId) -> Result<Arc<ReleaseArtifact>> {
        match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(release_id)).await
        {
            Ok(resolved) => Ok(resolved?),
            Err(_) => Err(ServerError::timeout(
                format!("Resolving release {}", release_id),
                self.resolve_timeout,
            )),
        }
    }

    /// Create a container and deploy its release.
    ///
    /// The id is reserved with status CREATING before resolution starts, so a
    /// concurrent create with the same id fails with `AlreadyExists`. If
    /// resolution fails the reservation is dropped and the id stays free.
    #[tracing::instrument(name = "container.create", skip_all, fields(container_id = %id, release_id = %release_id))]
    pub async fn create(
        &self,
        id: &str,
        release_id: ReleaseId,
        config: Option<ContainerConfig>,
    ) -> Result<ContainerResource> {
        if id.trim().is_empty() {
            return Err(ServerError::malformed("container id must not be empty"));
        }
        let scanner = config
            .and_then(|c| c.scanner)
            .filter(|s| s.status != ScannerStatus::Stopped);
        if let Some(scanner) = &scanner {
            validate_scanner(scanner)?;
        }

        let container = Arc::new(Container::new(id, release_id.clone()));
        {
            let mut containers = self.containers.write().await;
            if containers.contains_key(id) {
                return Err(ServerError::AlreadyExists(id.to_string()));
            }
            containers.insert(id.to_string(), container.clone());
        }

        info!("Creating container");
        let artifact = match self.resolve(&release_id).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "Release resolution failed, container not registered");
                self.remove_entry(&container).await;
                return Err(e);
            }
        };

        {
            let mut runtime = container.runtime.write().await;
            *runtime = Some(ContainerRuntime::new(artifact.clone()));
            let mut state = container.state.write().await;
            state.resolved_release_id = Some(artifact.release_id().clone());
            state.status = ContainerStatus::Started;
        }
        info!(
            sessions = artifact.sessions().len(),
            "Container started"
        );

        if let Some(scanner) = scanner {
            if let Err(e) = self.update_scanner(id, scanner).await {
                warn!(error = %e, "Initial scanner configuration failed, container not registered");
                {
                    let mut runtime = container.runtime.write().await;
                    let mut state = container.state.write().await;
                    if let Some(scanner) = state.scanner.as_mut() {
                        scanner.dispose();
                    }
                    state.status = ContainerStatus::Disposed;
                    *runtime = None;
                }
                self.remove_entry(&container).await;
                return Err(e);
            }
        }

        Ok(container.snapshot().await)
    }

    /// Look up a container handle.
    pub async fn container(&self, id: &str) -> Result<Arc<Container>> {
        self.containers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::ContainerNotFound(id.to_string()))
    }

    /// Snapshot of one container.
    pub async fn get(&self, id: &str) -> Result<ContainerResource> {
        Ok(self.container(id).await?.snapshot().await)
    }

    /// Snapshots of all containers, ordered by id.
    pub async fn list(&self) -> Vec<ContainerResource> {
        let containers: Vec<Arc<Container>> =
            self.containers.read().await.values().cloned().collect();
        let mut resources = Vec::with_capacity(containers.len());
        for container in containers {
            resources.push(container.snapshot().await);
        }
        resources.sort_by(|a, b| a.container_id.cmp(&b.container_id));
        resources
    }

    /// Type namespace of a started container's release.
    pub async fn type_resolver(&self, id: &str) -> Result<Arc<dyn TypeResolver>> {
        let container = self.container(id).await?;
        let runtime = container.runtime.read().await;
        match runtime.as_ref() {
            Some(runtime) => Ok(runtime.types().clone()),
            None => Err(container.not_started().await),
        }
    }

    /// Dispose a container.
    ///
    /// Marks it DISPOSING at once, waits for in-flight executions, drops the
    /// runtime and removes the container. The final snapshot reports DISPOSED.
    #[tracing::instrument(name = "container.dispose", skip_all, fields(container_id = %id))]
    pub async fn dispose(&self, id: &str) -> Result<ContainerResource> {
        let container = self.container(id).await?;
        {
            let mut state = container.state.write().await;
            match state.status {
                ContainerStatus::Disposing => {
                    return Err(ServerError::DisposeInProgress(id.to_string()));
                }
                ContainerStatus::Disposed => {
                    return Err(ServerError::ContainerNotFound(id.to_string()));
                }
                ContainerStatus::Creating => {
                    return Err(ServerError::ContainerNotStarted {
                        id: id.to_string(),
                        status: ContainerStatus::Creating,
                    });
                }
                _ => {}
            }
            state.status = ContainerStatus::Disposing;
            if let Some(scanner) = state.scanner.as_mut() {
                scanner.dispose();
            }
        }
        info!("Disposing container");

        let released = container.runtime.write().await.take();
        drop(released);

        container.state.write().await.status = ContainerStatus::Disposed;
        self.remove_entry(&container).await;
        info!("Container disposed");

        Ok(container.snapshot().await)
    }

    /// Redeploy a started container with another release.
    ///
    /// Sessions are rebuilt from the new release; working memory is not
    /// carried over. On failure the previous release stays deployed.
    #[tracing::instrument(name = "container.update_release", skip_all, fields(container_id = %id, release_id = %release_id))]
    pub async fn update_release_id(&self, id: &str, release_id: ReleaseId) -> Result<ReleaseId> {
        let container = self.container(id).await?;
        if container.status().await != ContainerStatus::Started {
            return Err(container.not_started().await);
        }
        self.redeploy(&container, release_id.clone(), true).await?;
        info!("Container release updated");
        Ok(release_id)
    }

    /// Swap a container's runtime for a newly resolved release.
    ///
    /// `pin` also moves the requested release id; scanner upgrades only move
    /// the resolved one.
    pub(crate) async fn redeploy(
        &self,
        container: &Container,
        release_id: ReleaseId,
        pin: bool,
    ) -> Result<()> {
        let artifact = self.resolve(&release_id).await?;

        let mut runtime = container.runtime.write().await;
        let mut state = container.state.write().await;
        if state.status != ContainerStatus::Started || runtime.is_none() {
            return Err(ServerError::ContainerNotStarted {
                id: container.id.clone(),
                status: state.status,
            });
        }
        *runtime = Some(ContainerRuntime::new(artifact));
        if pin {
            state.release_id = release_id.clone();
        }
        state.resolved_release_id = Some(release_id);
        Ok(())
    }

    /// Remove `container` from the map if the entry is still that instance.
    async fn remove_entry(&self, container: &Arc<Container>) {
        let mut containers = self.containers.write().await;
        if containers
            .get(&container.id)
            .is_some_and(|current| Arc::ptr_eq(current, container))
        {
            containers.remove(&container.id);
        }
    }
}

/// Reject an initial scanner state that `update_scanner` could never accept.
fn validate_scanner(scanner: &ScannerResource) -> Result<()> {
    if scanner.status == ScannerStatus::Started && !scanner.poll_interval.is_some_and(|ms| ms > 0) {
        return Err(ServerError::malformed(
            "scanner poll interval must be a positive number",
        ));
    }
    Ok(())
}
