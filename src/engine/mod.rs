//! Execution engine.
//!
//! Dispatches server commands to the container registry and the BatchExecution
//! interpreter. Every command yields exactly one [`ServiceResponse`]; a failure
//! is attached to the command that caused it and the script moves on.

mod aggregator;
mod batch;

pub use aggregator::ResponseAggregator;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::{CommandScript, ServerCommand};
use crate::error::{Result, ServerError};
use crate::marshal::{MarshallerExt, MarshallerRegistry, Payload};
use crate::model::{ResponsePayload, ServerInfo, ServiceResponse, ServiceResponsesList};
use crate::registry::ContainerRegistry;
use crate::session::SessionRouter;

/// Server name reported when none is configured.
pub const DEFAULT_SERVER_NAME: &str = "rulehost";

/// Tunables of the execution engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub server_id: String,
    pub server_name: String,
    /// Upper bound on one batch execution, including the wait for its session.
    pub execution_timeout: Duration,
    /// Format of container calls that do not name one.
    pub default_format: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            server_id: uuid::Uuid::new_v4().to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            execution_timeout: Duration::from_secs(30),
            default_format: "xml".to_string(),
        }
    }
}

/// Executes command scripts and container calls.
pub struct ExecutionEngine {
    registry: Arc<ContainerRegistry>,
    router: SessionRouter,
    marshallers: Arc<MarshallerRegistry>,
    options: EngineOptions,
    server_info: ServerInfo,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<ContainerRegistry>,
        marshallers: Arc<MarshallerRegistry>,
        options: EngineOptions,
    ) -> Self {
        let mut capabilities = vec!["rules".to_string(), "scanner".to_string()];
        capabilities.extend(marshallers.formats().into_iter().map(|f| format!("format:{}", f)));
        let server_info = ServerInfo {
            server_id: options.server_id.clone(),
            name: options.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities,
            started_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        info!(
            server_id = %server_info.server_id,
            formats = ?marshallers.formats(),
            "Execution engine ready"
        );

        Self {
            router: SessionRouter::new(registry.clone()),
            registry,
            marshallers,
            options,
            server_info,
        }
    }

    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    pub fn marshallers(&self) -> &Arc<MarshallerRegistry> {
        &self.marshallers
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn default_format(&self) -> &str {
        &self.options.default_format
    }

    /// Execute a script in order, one response per executed command.
    ///
    /// Commands past a decoding truncation are not part of the script and get
    /// no response.
    #[tracing::instrument(name = "engine.script", skip_all, fields(commands = script.len()))]
    pub async fn execute_script(&self, script: CommandScript) -> ServiceResponsesList {
        let mut aggregator = ResponseAggregator::with_capacity(script.len());
        for command in &script.commands {
            let response = self.execute_command(command).await;
            aggregator.record(command, response);
        }

        if let Some(truncation) = &script.truncation {
            warn!(
                index = truncation.index,
                reason = %truncation.reason,
                "Command script truncated at undecodable command"
            );
        }
        debug!(
            executed = aggregator.len(),
            failures = aggregator.failures(),
            "Command script finished"
        );
        aggregator.finish()
    }

    /// Execute one command.
    pub async fn execute_command(&self, command: &ServerCommand) -> ServiceResponse {
        debug!(
            command = command.name(),
            container_id = command.container_id().unwrap_or("-"),
            "Dispatching command"
        );
        match command {
            ServerCommand::CreateContainer(c) => respond(
                self.registry
                    .create(&c.container_id, c.release_id.clone(), c.config.clone())
                    .await,
                || format!("Failed to create container {}", c.container_id),
                |container| {
                    ServiceResponse::success(
                        format!(
                            "Container {} successfully deployed with module {}.",
                            c.container_id, c.release_id
                        ),
                        Some(ResponsePayload::Container(container)),
                    )
                },
            ),
            ServerCommand::DisposeContainer(c) => respond(
                self.registry.dispose(&c.container_id).await,
                || format!("Error disposing container {}", c.container_id),
                |container| {
                    ServiceResponse::success(
                        format!("Container {} successfully disposed.", c.container_id),
                        Some(ResponsePayload::Container(container)),
                    )
                },
            ),
            ServerCommand::CallContainer(c) => {
                let format = c.format.as_deref().unwrap_or(&self.options.default_format);
                self.execute_commands(&c.container_id, c.payload.as_bytes(), format)
                    .await
                    .into_payload()
            }
            ServerCommand::GetServerInfo => ServiceResponse::success(
                "Server info",
                Some(ResponsePayload::ServerInfo(self.server_info.clone())),
            ),
            ServerCommand::ListContainers => ServiceResponse::success(
                "List of created containers",
                Some(ResponsePayload::Containers(self.registry.list().await)),
            ),
            ServerCommand::GetContainerInfo(c) => respond(
                self.registry.get(&c.container_id).await,
                || format!("Error retrieving container {}", c.container_id),
                |container| {
                    ServiceResponse::success(
                        format!("Info for container {}", c.container_id),
                        Some(ResponsePayload::Container(container)),
                    )
                },
            ),
            ServerCommand::GetScannerInfo(c) => respond(
                self.registry.scanner_info(&c.container_id).await,
                || format!("Error retrieving scanner of container {}", c.container_id),
                |scanner| {
                    ServiceResponse::success(
                        "Scanner info successfully retrieved",
                        Some(ResponsePayload::Scanner(scanner)),
                    )
                },
            ),
            ServerCommand::UpdateScanner(c) => respond(
                self.registry
                    .update_scanner(&c.container_id, c.scanner.clone())
                    .await,
                || format!("Error updating scanner of container {}", c.container_id),
                |scanner| {
                    ServiceResponse::success(
                        format!("Scanner of container {} is {}", c.container_id, scanner.status),
                        Some(ResponsePayload::Scanner(scanner)),
                    )
                },
            ),
            ServerCommand::UpdateReleaseId(c) => respond(
                self.registry
                    .update_release_id(&c.container_id, c.release_id.clone())
                    .await,
                || format!("Error updating release of container {}", c.container_id),
                |release| {
                    ServiceResponse::success(
                        format!(
                            "Release id successfully updated to {} for container {}",
                            release, c.container_id
                        ),
                        Some(ResponsePayload::ReleaseId(release)),
                    )
                },
            ),
        }
    }

    /// Execute a marshalled BatchExecution against a container.
    ///
    /// The batch is decoded with the container's own types. A lookup naming an
    /// unknown session fails the call before any sub-command runs.
    #[tracing::instrument(name = "engine.call_container", skip_all, fields(container_id = %container_id, format = %format))]
    pub async fn execute_commands(
        &self,
        container_id: &str,
        payload: &[u8],
        format: &str,
    ) -> ServiceResponse<String> {
        match self.call_container(container_id, payload, format).await {
            Ok(results) => ServiceResponse::success(
                format!("Container {} successfully called.", container_id),
                Some(results),
            ),
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "Container call failed");
                ServiceResponse::failure_from(format!("Error calling container {}", container_id), &e)
            }
        }
    }

    async fn call_container(&self, container_id: &str, payload: &[u8], format: &str) -> Result<String> {
        let marshaller = self.marshallers.get(format)?;
        let lease = self.router.acquire(container_id).await?;
        let batch = marshaller.decode_batch(payload, lease.types().as_ref())?;
        batch.validate()?;

        let lease = lease.into_session(batch.lookup.as_deref())?;
        let session = lease.session();
        debug!(
            session = %session.name(),
            release_id = %lease.container().release_id(),
            commands = batch.commands.len(),
            "Executing batch"
        );

        let timeout = self.options.execution_timeout;
        let results = tokio::time::timeout(timeout, batch::execute(session, &batch.commands))
            .await
            .map_err(|_| {
                ServerError::timeout(
                    format!("Batch execution in session '{}'", session.name()),
                    timeout,
                )
            })??;

        marshaller.encode_to_string(&Payload::Results(results))
    }
}

/// Turn a handler outcome into the command's response.
fn respond<T>(
    outcome: Result<T>,
    context: impl FnOnce() -> String,
    success: impl FnOnce(T) -> ServiceResponse,
) -> ServiceResponse {
    match outcome {
        Ok(value) => success(value),
        Err(e) => ServiceResponse::failure_from(context(), &e),
    }
}
