//! Session routing.
//!
//! Resolves `(container, session name)` to a live session. A lease keeps the
//! container's runtime read-locked until it is dropped, which is what lets
//! disposal wait for in-flight executions without admitting new ones.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OwnedRwLockReadGuard;
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::model::{ContainerStatus, ReleaseId};
use crate::registry::{ContainerRegistry, ContainerRuntime};
use crate::session::Session;
use crate::types::TypeResolver;

/// Read access to a started container's runtime.
pub struct ContainerLease {
    container_id: String,
    runtime: OwnedRwLockReadGuard<Option<ContainerRuntime>, ContainerRuntime>,
}

impl fmt::Debug for ContainerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerLease")
            .field("container_id", &self.container_id)
            .field("release_id", self.release_id())
            .finish()
    }
}

impl ContainerLease {
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn release_id(&self) -> &ReleaseId {
        self.runtime.artifact().release_id()
    }

    /// Type resolver of the deployed release.
    pub fn types(&self) -> Arc<dyn TypeResolver> {
        self.runtime.types().clone()
    }

    /// Named session, or the default one when `name` is `None`.
    pub fn session(&self, name: Option<&str>) -> Result<Arc<Session>> {
        match name {
            Some(name) => {
                self.runtime
                    .session(name)
                    .cloned()
                    .ok_or_else(|| ServerError::SessionNotFound {
                        container: self.container_id.clone(),
                        session: name.to_string(),
                    })
            }
            None => self
                .runtime
                .default_session()
                .cloned()
                .ok_or_else(|| ServerError::NoDefaultSession(self.container_id.clone())),
        }
    }

    /// Narrow the lease to one session.
    pub fn into_session(self, name: Option<&str>) -> Result<SessionLease> {
        let session = self.session(name)?;
        Ok(SessionLease {
            container: self,
            session,
        })
    }
}

/// A resolved session together with the runtime lease that keeps it alive.
pub struct SessionLease {
    container: ContainerLease,
    session: Arc<Session>,
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("container_id", &self.container.container_id())
            .field("session", &self.session.name())
            .finish()
    }
}

impl SessionLease {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn container(&self) -> &ContainerLease {
        &self.container
    }
}

/// Read-only view over the registry that hands out leases.
#[derive(Clone)]
pub struct SessionRouter {
    registry: Arc<ContainerRegistry>,
}

impl SessionRouter {
    pub fn new(registry: Arc<ContainerRegistry>) -> Self {
        Self { registry }
    }

    /// Lease a started container's runtime.
    ///
    /// Fails with `ContainerNotStarted` unless the container is STARTED. A
    /// container whose disposal began while this call waited for the lock is
    /// reported with its current status.
    pub async fn acquire(&self, container_id: &str) -> Result<ContainerLease> {
        let container = self.registry.container(container_id).await?;
        let status = container.status().await;
        if status != ContainerStatus::Started {
            return Err(ServerError::ContainerNotStarted {
                id: container_id.to_string(),
                status,
            });
        }

        let guard = container.runtime().clone().read_owned().await;
        let runtime = match OwnedRwLockReadGuard::try_map(guard, Option::as_ref) {
            Ok(runtime) => runtime,
            Err(_) => {
                let status = container.status().await;
                debug!(container_id = %container_id, status = %status, "Runtime released before lease");
                return Err(ServerError::ContainerNotStarted {
                    id: container_id.to_string(),
                    status,
                });
            }
        };

        Ok(ContainerLease {
            container_id: container_id.to_string(),
            runtime,
        })
    }

    /// Resolve a session; `None` selects the container's default session.
    pub async fn resolve(
        &self,
        container_id: &str,
        session: Option<&str>,
    ) -> Result<SessionLease> {
        self.acquire(container_id).await?.into_session(session)
    }
}
