//! Release scanners.
//!
//! A started scanner polls the release resolver for the newest version of its
//! container's artifact and redeploys the container when a strictly newer
//! version appears. The polling task holds only a weak registry reference and
//! stops on its own once the container is gone.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::ContainerRegistry;
use crate::error::{ErrorKind, Result, ServerError};
use crate::model::{ContainerStatus, ReleaseId, ScannerResource, ScannerStatus};
use crate::release::compare_versions;

/// Scanner attached to a container.
pub(crate) struct Scanner {
    resource: ScannerResource,
    task: Option<JoinHandle<()>>,
}

impl Scanner {
    fn new(resource: ScannerResource) -> Self {
        Self {
            resource,
            task: None,
        }
    }

    pub(crate) fn resource(&self) -> ScannerResource {
        self.resource.clone()
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub(crate) fn dispose(&mut self) {
        self.stop_task();
        self.resource = ScannerResource::new(ScannerStatus::Disposed, None);
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop_task();
    }
}

impl ContainerRegistry {
    /// Current scanner state; a container without a scanner reports STOPPED.
    pub async fn scanner_info(&self, id: &str) -> Result<ScannerResource> {
        let container = self.container(id).await?;
        let state = container.state().read().await;
        Ok(state
            .scanner
            .as_ref()
            .map(Scanner::resource)
            .unwrap_or_default())
    }

    /// Move a container's scanner to the requested state.
    #[tracing::instrument(name = "scanner.update", skip_all, fields(container_id = %id, status = %requested.status))]
    pub async fn update_scanner(
        &self,
        id: &str,
        requested: ScannerResource,
    ) -> Result<ScannerResource> {
        let container = self.container(id).await?;

        if requested.status == ScannerStatus::Scanning {
            let previous = {
                let mut state = container.state().write().await;
                if state.status != ContainerStatus::Started {
                    return Err(ServerError::ContainerNotStarted {
                        id: id.to_string(),
                        status: state.status,
                    });
                }
                let scanner = state
                    .scanner
                    .get_or_insert_with(|| Scanner::new(ScannerResource::default()));
                let previous = scanner.resource.status;
                scanner.resource.status = ScannerStatus::Scanning;
                previous
            };

            let outcome = self.scan(id).await;

            {
                let mut state = container.state().write().await;
                if let Some(scanner) = state.scanner.as_mut() {
                    if scanner.resource.status == ScannerStatus::Scanning {
                        scanner.resource.status = previous;
                    }
                }
            }
            outcome?;
            return self.scanner_info(id).await;
        }

        let mut state = container.state().write().await;
        if state.status != ContainerStatus::Started {
            return Err(ServerError::ContainerNotStarted {
                id: id.to_string(),
                status: state.status,
            });
        }

        let scanner = state
            .scanner
            .get_or_insert_with(|| Scanner::new(ScannerResource::default()));
        match requested.status {
            ScannerStatus::Started => {
                let interval = requested
                    .poll_interval
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        ServerError::malformed("scanner poll interval must be a positive number")
                    })?;
                scanner.stop_task();
                scanner.task = Some(self.spawn_scanner(id, Duration::from_millis(interval)));
                scanner.resource = ScannerResource::new(ScannerStatus::Started, Some(interval));
                info!(poll_interval_ms = interval, "Scanner started");
            }
            ScannerStatus::Stopped => {
                scanner.stop_task();
                scanner.resource.status = ScannerStatus::Stopped;
                info!("Scanner stopped");
            }
            ScannerStatus::Disposed => {
                scanner.dispose();
                info!("Scanner disposed");
            }
            ScannerStatus::Scanning => {}
        }
        Ok(scanner.resource())
    }

    /// Upgrade the container when the resolver knows a strictly newer version.
    ///
    /// Returns the release the container moved to, if any.
    pub async fn scan(&self, id: &str) -> Result<Option<ReleaseId>> {
        let container = self.container(id).await?;
        let current = {
            let state = container.state().read().await;
            state
                .resolved_release_id
                .clone()
                .unwrap_or_else(|| state.release_id.clone())
        };

        let lookup = self
            .resolver()
            .latest(&current.group_id, &current.artifact_id);
        let latest = tokio::time::timeout(self.resolve_timeout, lookup)
            .await
            .map_err(|_| {
                ServerError::timeout(
                    format!("Scanning for releases of {}", current),
                    self.resolve_timeout,
                )
            })??;

        match latest {
            Some(latest) if compare_versions(&latest.version, &current.version).is_gt() => {
                self.redeploy(&container, latest.clone(), false).await?;
                info!(
                    container_id = %id,
                    from = %current,
                    to = %latest,
                    "Scanner upgraded container"
                );
                Ok(Some(latest))
            }
            _ => {
                debug!(container_id = %id, release_id = %current, "No newer release found");
                Ok(None)
            }
        }
    }

    fn spawn_scanner(&self, id: &str, poll_interval: Duration) -> JoinHandle<()> {
        let registry = self.weak();
        let id = id.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if let Err(e) = registry.scan(&id).await {
                    if e.kind() == ErrorKind::NotFound && registry.get(&id).await.is_err() {
                        debug!(container_id = %id, "Container gone, scanner exiting");
                        break;
                    }
                    warn!(container_id = %id, error = %e, "Scan failed");
                }
            }
        })
    }
}
